//! HTTP surface for the analyzer.
//!
//! - `GET /` – Constant health message.
//! - `POST /analyze` – Multipart upload with a required `file` part and an optional `query`
//!   part. Runs the verify → analyze → assess risk → recommend pipeline and returns
//!   `{ status, query, analysis, file_processed }`.
//!
//! Every failure, whether a missing file, a backend outage, or a rejected document, is reported
//! as `500` with a `{ "detail": ... }` body.

use crate::service::{AnalysisApi, AnalysisError, DocumentUpload};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const HEALTH_MESSAGE: &str = "Financial Document Analyzer API is running";

/// Build the HTTP router exposing the analysis endpoints.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: AnalysisApi + 'static,
{
    Router::new()
        .route("/", get(health))
        .route("/analyze", post(analyze_document::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Success response for `POST /analyze`.
#[derive(Serialize)]
struct AnalyzeResponse {
    /// Always `"success"`; failures use the `detail` body instead.
    status: &'static str,
    /// Query the pipeline answered, after trimming and defaulting.
    query: String,
    /// Final recommendation report.
    analysis: String,
    /// Client-supplied file name, when the upload carried one.
    file_processed: Option<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "message": HEALTH_MESSAGE }))
}

/// Analyze an uploaded financial document.
///
/// The `file` part is required; the `query` part defaults to a generic full-analysis request.
/// Unknown parts are ignored.
async fn analyze_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, AppError>
where
    S: AnalysisApi,
{
    let multipart = multipart
        .map_err(|rejection| AnalysisError::Validation(rejection.body_text()))?;
    let upload = read_upload(multipart).await?;
    let file_name = upload.file_name.clone();

    let outcome = service.analyze(upload).await?;
    tracing::info!(
        file = file_name.as_deref().unwrap_or("<unnamed>"),
        chars = outcome.analysis.len(),
        "Analysis request completed"
    );
    Ok(Json(AnalyzeResponse {
        status: "success",
        query: outcome.query,
        analysis: outcome.analysis,
        file_processed: outcome.file_processed,
    }))
}

async fn read_upload(mut multipart: Multipart) -> Result<DocumentUpload, AnalysisError> {
    let malformed = |error: axum::extract::multipart::MultipartError| {
        AnalysisError::Validation(format!("malformed multipart body: {error}"))
    };

    let mut query = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("query") => {
                query = Some(field.text().await.map_err(malformed)?);
            }
            other => {
                tracing::debug!(part = ?other, "Ignoring unexpected multipart part");
            }
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| AnalysisError::Validation("missing required 'file' part".into()))?;
    Ok(DocumentUpload {
        query,
        file_name,
        bytes,
    })
}

struct AppError(AnalysisError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Analysis request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": format!("An error occurred: {}", self.0) })),
        )
            .into_response()
    }
}

impl From<AnalysisError> for AppError {
    fn from(inner: AnalysisError) -> Self {
        Self(inner)
    }
}
