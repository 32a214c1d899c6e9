//! Analysis service coordinating scratch storage and the pipeline engine.

use crate::{
    config::Config,
    llm::{LlmClient, LlmError, OpenAiClient},
    pipeline::{PipelineEngine, PipelineError, PipelineRequest, financial_pipeline},
    scratch::ScratchDir,
    tools::{FileReadTool, ToolBox, ToolError, WebSearchTool},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Query used when the caller omits one or sends only whitespace.
pub const DEFAULT_QUERY: &str = "Provide a detailed analysis of this financial document, \
    including key metrics, trends, and a final investment recommendation based on the findings.";

/// Errors surfaced to the HTTP boundary.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Upload was missing or unusable.
    #[error("Invalid upload: {0}")]
    Validation(String),
    /// Scratch file could not be written.
    #[error("Failed to store uploaded document: {0}")]
    Io(#[from] std::io::Error),
    /// Pipeline run failed or the document was rejected.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Errors raised while wiring the service at start-up.
#[derive(Debug, Error)]
pub enum InitError {
    /// Completion client could not be built.
    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[from] LlmError),
    /// A tool adapter could not be built.
    #[error("Failed to initialize tools: {0}")]
    Tool(#[from] ToolError),
}

/// Uploaded document plus the caller's question.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpload {
    /// Raw query field; normalized by the service.
    pub query: Option<String>,
    /// Client-side file name, if sent.
    pub file_name: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Result of a successful analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// Query the pipeline actually ran with.
    pub query: String,
    /// Markdown report produced by the final step.
    pub analysis: String,
    /// Client-side file name, if sent.
    pub file_processed: Option<String>,
}

/// Abstraction over the analysis pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Persist the upload, run the pipeline, and clean up.
    async fn analyze(&self, upload: DocumentUpload) -> Result<AnalysisOutcome, AnalysisError>;
}

/// Owns the scratch directory and the pipeline engine.
///
/// Build once near process start and share through an `Arc`; the engine inside holds the only
/// backend and tool handles.
pub struct AnalysisService {
    scratch: ScratchDir,
    engine: PipelineEngine,
}

impl AnalysisService {
    /// Assemble a service from pre-built parts.
    pub fn new(scratch: ScratchDir, engine: PipelineEngine) -> Self {
        Self { scratch, engine }
    }

    /// Build the production wiring: chat-completions backend, file reader, and web search.
    pub fn from_config(config: &Config) -> Result<Self, InitError> {
        tracing::info!(model = %config.llm.model, "Initializing analysis service");
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(&config.llm)?);
        let tools = ToolBox::new(
            Arc::new(FileReadTool::new(config.scratch_dir.clone())),
            Arc::new(WebSearchTool::new(&config.search)?),
        );
        let engine = PipelineEngine::new(
            financial_pipeline(),
            llm,
            tools,
            config.verification_gate,
        );
        Ok(Self::new(ScratchDir::new(config.scratch_dir.clone()), engine))
    }

    /// Persist the upload, run the pipeline, and return the final report.
    ///
    /// The scratch file is removed on every exit path, including errors and panics.
    pub async fn analyze(&self, upload: DocumentUpload) -> Result<AnalysisOutcome, AnalysisError> {
        if upload.bytes.is_empty() {
            return Err(AnalysisError::Validation("uploaded file is empty".into()));
        }
        let query = normalize_query(upload.query.as_deref());

        let document = self
            .scratch
            .persist(upload.file_name.as_deref(), &upload.bytes)
            .await?;
        tracing::info!(
            document_id = %document.id(),
            file_name = upload.file_name.as_deref().unwrap_or("<unnamed>"),
            bytes = upload.bytes.len(),
            "Document received"
        );

        let request = PipelineRequest {
            query: query.clone(),
            file_path: document.path().to_path_buf(),
        };
        let run = self.engine.run(&request).await?;
        let analysis = run.final_output().unwrap_or_default().to_string();
        drop(document);

        Ok(AnalysisOutcome {
            query,
            analysis,
            file_processed: upload.file_name,
        })
    }
}

#[async_trait]
impl AnalysisApi for AnalysisService {
    async fn analyze(&self, upload: DocumentUpload) -> Result<AnalysisOutcome, AnalysisError> {
        AnalysisService::analyze(self, upload).await
    }
}

/// Trim the caller's query, falling back to [`DEFAULT_QUERY`] when nothing is left.
pub fn normalize_query(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|query| !query.is_empty())
        .unwrap_or(DEFAULT_QUERY)
        .to_string()
}
