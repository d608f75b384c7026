//! HTTP surface for docbrief.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /summarize` – Upload a document as multipart field `file`; returns the final
//!   structured summary, page summaries keyed by page number, and the skipped pages.
//! - `POST /answer` – Answer `{ "question": ... }` from the corpus indexed at startup; returns the
//!   answer with the retrieved chunks and their similarity scores.
//! - `GET /metrics` – Observe summarization and answering counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Failures always come back as `{ "success": false, "error": ... }` with a status derived from
//! the error kind.

use crate::metrics::MetricsSnapshot;
use crate::processing::{DocumentUpload, ErrorKind, ProcessingApi, ProcessingError};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the summarization and answering API.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/summarize", post(summarize_document::<S>))
        .route("/answer", post(answer_question::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Success response for `POST /summarize`.
#[derive(Serialize)]
struct SummarizeResponse {
    success: bool,
    job_id: String,
    final_summary: String,
    page_summaries: BTreeMap<u32, String>,
    skipped_pages: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_file: Option<PathBuf>,
    error: Option<String>,
}

/// Summarize the document uploaded in multipart field `file`.
async fn summarize_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SummarizeResponse>, AppError>
where
    S: ProcessingApi,
{
    let mut multipart = multipart
        .map_err(|rejection| ProcessingError::InvalidInput(rejection.body_text()))?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ProcessingError::InvalidInput(format!("malformed upload: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ProcessingError::InvalidInput(format!("failed to read upload: {err}")))?;
        upload = Some(DocumentUpload {
            file_name,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload
        .ok_or_else(|| ProcessingError::InvalidInput("multipart field 'file' is required".into()))?;
    let outcome = service.summarize(upload).await?;
    tracing::info!(
        job_id = %outcome.job_id,
        pages = outcome.page_summaries.len(),
        "Summarize request completed"
    );
    Ok(Json(SummarizeResponse {
        success: true,
        job_id: outcome.job_id,
        final_summary: outcome.final_summary,
        page_summaries: outcome.page_summaries,
        skipped_pages: outcome.skipped_pages,
        summary_file: outcome.summary_file,
        error: None,
    }))
}

/// Request body for `POST /answer`.
#[derive(Deserialize)]
struct AnswerRequest {
    question: String,
}

/// Retrieved chunk echoed back with an answer.
#[derive(Serialize)]
struct SimilarChunk {
    text: String,
    similarity: f32,
}

/// Success response for `POST /answer`.
#[derive(Serialize)]
struct AnswerResponse {
    question: String,
    answer: String,
    similar_chunks: Vec<SimilarChunk>,
}

/// Answer a question against the corpus.
async fn answer_question<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError>
where
    S: ProcessingApi,
{
    let Json(request) =
        request.map_err(|rejection| ProcessingError::InvalidInput(rejection.body_text()))?;
    let outcome = service.answer(request.question).await?;
    Ok(Json(AnswerResponse {
        question: outcome.question,
        answer: outcome.answer,
        similar_chunks: outcome
            .evidence
            .into_iter()
            .map(|hit| SimilarChunk {
                text: hit.text,
                similarity: hit.score,
            })
            .collect(),
    }))
}

/// Return the current service counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Upload a PDF as multipart field 'file'. Relevant pages are summarized under the token budget and folded into a structured overview.",
                request_example: None,
            },
            CommandDescriptor {
                name: "answer",
                method: "POST",
                path: "/answer",
                description: "Answer a question from the indexed corpus. Response returns the answer and the similar chunks with their scores.",
                request_example: Some(json!({
                    "question": "What is the submission deadline?"
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return summarization and answering counters.",
                request_example: None,
            },
        ],
    })
}

struct AppError(ProcessingError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Input => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamService => StatusCode::BAD_GATEWAY,
            ErrorKind::Resource => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "success": false,
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::completion::CompletionClientError;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        AnswerOutcome, DocumentUpload, ProcessingApi, ProcessingError, SimilarityResult,
        SummarizeOutcome,
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docbrief-test-boundary";

    #[tokio::test]
    async fn commands_catalog_exposes_summarize_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let summarize = commands
            .iter()
            .find(|cmd| cmd.name == "summarize")
            .expect("summarize command present");

        assert_eq!(summarize.method, "POST");
        assert_eq!(summarize.path, "/summarize");
        assert!(commands.iter().any(|cmd| cmd.path == "/answer"));
    }

    #[tokio::test]
    async fn summarize_route_reads_multipart_file() {
        let service = Arc::new(StubProcessingService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request("tender.pdf", b"%PDF-1.4 body"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["final_summary"], "overview");
        assert_eq!(json["page_summaries"]["3"], "third page");
        assert_eq!(json["skipped_pages"], json!([2]));

        let uploads = service.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].file_name, "tender.pdf");
        assert_eq!(uploads[0].bytes, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn summarize_errors_map_to_status_and_body() {
        let service = Arc::new(StubProcessingService {
            fail_with_upstream: true,
            ..StubProcessingService::default()
        });
        let response = create_router(service)
            .oneshot(multipart_request("tender.pdf", b"%PDF"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().expect("error").contains("quota"));
    }

    #[tokio::test]
    async fn summarize_without_file_field_is_bad_request() {
        let body = format!("--{BOUNDARY}--\r\n");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/summarize")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");

        let response = create_router(Arc::new(StubProcessingService::default()))
            .oneshot(request)
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn summarize_without_multipart_content_type_returns_json_error() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/summarize")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .expect("request");

        let response = create_router(Arc::new(StubProcessingService::default()))
            .oneshot(request)
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["kind"], "input");
    }

    #[tokio::test]
    async fn answer_with_malformed_body_returns_json_error() {
        let response = create_router(Arc::new(StubProcessingService::default()))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/answer")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "q": 1 }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().expect("error").contains("question"));
    }

    #[tokio::test]
    async fn answer_route_returns_similar_chunks() {
        let app = create_router(Arc::new(StubProcessingService::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/answer")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "question": "Budget?" }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["question"], "Budget?");
        assert_eq!(json["answer"], "Ten million.");
        assert_eq!(json["similar_chunks"][0]["text"], "the budget is ten million");
        assert_eq!(json["similar_chunks"][0]["similarity"], 0.5);
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let response = create_router(Arc::new(StubProcessingService::default()))
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        let json = body_json(response).await;
        assert_eq!(json["documents_summarized"], 4);
        assert_eq!(json["questions_answered"], 0);
    }

    fn multipart_request(file_name: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/summarize")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[derive(Default)]
    struct StubProcessingService {
        uploads: Mutex<Vec<DocumentUpload>>,
        fail_with_upstream: bool,
    }

    #[async_trait]
    impl ProcessingApi for StubProcessingService {
        async fn summarize(
            &self,
            upload: DocumentUpload,
        ) -> Result<SummarizeOutcome, ProcessingError> {
            if self.fail_with_upstream {
                return Err(ProcessingError::Completion(
                    CompletionClientError::RateLimited("quota exceeded".into()),
                ));
            }
            self.uploads.lock().await.push(upload);
            Ok(SummarizeOutcome {
                job_id: "job-1".into(),
                final_summary: "overview".into(),
                page_summaries: BTreeMap::from([
                    (1, "first page".to_string()),
                    (3, "third page".to_string()),
                ]),
                skipped_pages: vec![2],
                summary_file: None,
            })
        }

        async fn answer(&self, question: String) -> Result<AnswerOutcome, ProcessingError> {
            Ok(AnswerOutcome {
                question,
                answer: "Ten million.".into(),
                evidence: vec![SimilarityResult {
                    chunk_index: 0,
                    text: "the budget is ten million".into(),
                    score: 0.5,
                }],
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_summarized: 4,
                ..MetricsSnapshot::default()
            }
        }
    }
}
