use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use fin_analyzer::{
    api::create_router,
    config::{GateMode, SearchSettings},
    llm::{ChatRole, Completion, CompletionRequest, FunctionCall, LlmClient, LlmError, ToolCall},
    pipeline::{PipelineEngine, financial_pipeline},
    scratch::ScratchDir,
    service::AnalysisService,
    tools::{FileReadTool, ToolBox, WebSearchTool},
};
use httpmock::prelude::*;
use regex::Regex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::ServiceExt;

const BOUNDARY: &str = "scenario-boundary";
const SEARCH_KEY: &str = "test-search-key";

/// Plays every role the way a cooperative model would: the verifier reads the document before
/// ruling on it, the risk assessor searches once before answering, everyone else answers at once.
#[derive(Default)]
struct ScriptedLlm {
    calls: Mutex<Vec<String>>,
    document_paths: Mutex<Vec<String>>,
    /// Role whose requests the backend refuses with a 503.
    failing_role: Option<&'static str>,
}

impl ScriptedLlm {
    async fn roles_called(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

fn tool_call(id: &str, name: &str, arguments: Value) -> Completion {
    Completion::ToolCalls {
        content: None,
        calls: vec![ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }],
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let system = request.messages[0].content.clone().unwrap_or_default();
        let task = request.messages[1].content.clone().unwrap_or_default();
        let tool_output = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::Tool)
            .and_then(|message| message.content.clone());

        let role = system
            .strip_prefix("You are ")
            .and_then(|rest| rest.split('.').next())
            .unwrap_or_default()
            .to_string();
        self.calls.lock().await.push(role.clone());
        if self.failing_role == Some(role.as_str()) {
            return Err(LlmError::Api {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "overloaded".into(),
            });
        }

        let completion = match (role.as_str(), tool_output) {
            ("Financial Document Verifier", None) => {
                let path = task
                    .split('\'')
                    .find(|part| part.contains("financial_document_"))
                    .unwrap_or_default()
                    .to_string();
                self.document_paths.lock().await.push(path.clone());
                tool_call("call_read", "read_file", json!({ "path": path }))
            }
            ("Financial Document Verifier", Some(content)) => {
                if content.contains("Income Statement") || content.contains("Balance Sheet") {
                    Completion::Message(
                        "VERDICT: VALID - quarterly statements present\n\
                         Contains an income statement."
                            .into(),
                    )
                } else {
                    Completion::Message(
                        "VERDICT: INVALID - no financial statements found".into(),
                    )
                }
            }
            ("Financial Risk Assessment Specialist", None) => tool_call(
                "call_search",
                "web_search",
                json!({ "query": "interest rate outlook" }),
            ),
            ("Financial Risk Assessment Specialist", Some(results)) => {
                Completion::Message(format!("## Market Risk\nBased on search:\n{results}"))
            }
            ("Senior Financial Analyst", _) => {
                Completion::Message("## Key Metrics\nRevenue grew 12% year over year.".into())
            }
            _ => Completion::Message(
                "## Recommendation\nHold. Revenue growth is offset by rising rates.".into(),
            ),
        };
        Ok(completion)
    }
}

struct Harness {
    app: Router,
    llm: Arc<ScriptedLlm>,
    scratch: TempDir,
}

fn harness(search_url: String, gate: GateMode) -> Harness {
    harness_with(search_url, gate, ScriptedLlm::default())
}

fn harness_with(search_url: String, gate: GateMode, llm: ScriptedLlm) -> Harness {
    let scratch = tempfile::tempdir().expect("scratch dir");
    let llm = Arc::new(llm);
    let search = WebSearchTool::new(&SearchSettings {
        api_url: search_url,
        api_key: Some(SEARCH_KEY.to_string()),
        result_limit: 2,
        timeout_secs: 5,
    })
    .expect("search tool");
    let tools = ToolBox::new(
        Arc::new(FileReadTool::new(scratch.path())),
        Arc::new(search),
    );
    let engine = PipelineEngine::new(financial_pipeline(), llm.clone(), tools, gate);
    let service = AnalysisService::new(ScratchDir::new(scratch.path()), engine);
    Harness {
        app: create_router(Arc::new(service), 1024 * 1024),
        llm,
        scratch,
    }
}

fn upload(file_name: &str, contents: &[u8], query: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(b"\r\n");
    if let Some(query) = query {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"query\"\r\n\r\n{query}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/analyze")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).expect("scratch dir").next().is_none()
}

async fn healthy_search(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .header("X-API-KEY", SEARCH_KEY);
            then.status(200).json_body(json!({
                "organic": [
                    {
                        "title": "Fed signals higher-for-longer rates",
                        "link": "https://news.example/fed",
                        "snippet": "Policy makers expect rates to stay elevated."
                    },
                    {
                        "title": "Credit spreads widen",
                        "link": "https://news.example/credit",
                        "snippet": "Corporate borrowing costs climb."
                    },
                    {
                        "title": "Third result beyond the limit",
                        "link": "https://news.example/extra",
                        "snippet": "Should be dropped."
                    }
                ]
            }));
        })
        .await
}

#[tokio::test]
async fn financial_report_produces_recommendation() {
    let server = MockServer::start_async().await;
    let search = healthy_search(&server).await;
    let harness = harness(server.url("/search"), GateMode::Enforce);

    let (status, body) = send(
        &harness.app,
        upload(
            "q3-results.pdf",
            b"%PDF-1.4 Income Statement Q3 2024 Revenue 1,200",
            Some("Should I invest?"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["query"], "Should I invest?");
    assert_eq!(body["file_processed"], "q3-results.pdf");
    let analysis = body["analysis"].as_str().expect("analysis");
    assert!(analysis.contains("Hold"));

    assert_eq!(
        harness.llm.roles_called().await,
        vec![
            "Financial Document Verifier",
            "Financial Document Verifier",
            "Senior Financial Analyst",
            "Financial Risk Assessment Specialist",
            "Financial Risk Assessment Specialist",
            "Prudent Investment Advisor",
        ]
    );
    assert_eq!(search.hits_async().await, 1);

    let paths = harness.llm.document_paths.lock().await;
    let pattern = Regex::new(concat!(
        r"financial_document_",
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\.pdf$"
    ))
    .expect("regex");
    assert_eq!(paths.len(), 1);
    assert!(pattern.is_match(&paths[0]), "unexpected scratch path {}", paths[0]);
    assert!(scratch_is_empty(harness.scratch.path()));
}

#[tokio::test]
async fn non_financial_document_is_rejected_in_enforce_mode() {
    let server = MockServer::start_async().await;
    let search = healthy_search(&server).await;
    let harness = harness(server.url("/search"), GateMode::Enforce);

    let (status, body) = send(
        &harness.app,
        upload("groceries.txt", b"eggs, milk, bread", None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().expect("detail");
    assert!(detail.starts_with("An error occurred: "));
    assert!(detail.contains("no financial statements found"));
    assert_eq!(
        harness.llm.roles_called().await,
        vec!["Financial Document Verifier", "Financial Document Verifier"]
    );
    assert_eq!(search.hits_async().await, 0);
    assert!(scratch_is_empty(harness.scratch.path()));
}

#[tokio::test]
async fn advisory_mode_runs_every_step_for_rejected_document() {
    let server = MockServer::start_async().await;
    let search = healthy_search(&server).await;
    let harness = harness(server.url("/search"), GateMode::Advisory);

    let (status, body) = send(
        &harness.app,
        upload("groceries.txt", b"eggs, milk, bread", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["query"], fin_analyzer::service::DEFAULT_QUERY);
    assert_eq!(harness.llm.roles_called().await.len(), 6);
    assert_eq!(search.hits_async().await, 1);
    assert!(scratch_is_empty(harness.scratch.path()));
}

#[tokio::test]
async fn search_outage_fails_request_and_cleans_up() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(503).body("maintenance");
        })
        .await;
    let harness = harness(server.url("/search"), GateMode::Enforce);

    let (status, body) = send(
        &harness.app,
        upload("q3-results.pdf", b"Balance Sheet FY2024", Some("Risks?")),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().expect("detail");
    assert!(detail.contains("risk_assessment"), "unexpected detail: {detail}");
    assert!(detail.contains("503"), "unexpected detail: {detail}");
    search.assert_async().await;
    assert!(
        !harness
            .llm
            .roles_called()
            .await
            .contains(&"Prudent Investment Advisor".to_string())
    );
    assert!(scratch_is_empty(harness.scratch.path()));
}

#[tokio::test]
async fn backend_outage_during_analysis_aborts_remaining_steps() {
    let server = MockServer::start_async().await;
    let search = healthy_search(&server).await;
    let harness = harness_with(
        server.url("/search"),
        GateMode::Enforce,
        ScriptedLlm {
            failing_role: Some("Senior Financial Analyst"),
            ..ScriptedLlm::default()
        },
    );

    let (status, body) = send(
        &harness.app,
        upload("q3-results.pdf", b"Income Statement FY2024", None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().expect("detail");
    assert!(
        detail.contains("analyze_financial_document"),
        "unexpected detail: {detail}"
    );
    assert!(detail.contains("overloaded"), "unexpected detail: {detail}");
    assert_eq!(
        harness.llm.roles_called().await,
        vec![
            "Financial Document Verifier",
            "Financial Document Verifier",
            "Senior Financial Analyst",
        ]
    );
    assert_eq!(search.hits_async().await, 0);
    assert!(scratch_is_empty(harness.scratch.path()));
}

#[tokio::test]
async fn missing_file_part_never_reaches_backend() {
    let server = MockServer::start_async().await;
    let harness = harness(server.url("/search"), GateMode::Enforce);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/analyze")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"query\"\r\n\r\n\
             Hello\r\n--{BOUNDARY}--\r\n"
        )))
        .expect("request");
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().expect("detail").contains("'file'"));
    assert!(harness.llm.roles_called().await.is_empty());
    assert!(scratch_is_empty(harness.scratch.path()));
}
