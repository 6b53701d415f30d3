//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner |
//! | `GET`  | `/health` | Liveness plus generation backend probe |
//! | `POST` | `/search-logs` | Resolve a block of log text |
//! | `POST` | `/upload-logs` | Resolve an uploaded `.log` / `.txt` file (multipart field `file`) |
//! | `POST` | `/analyze-github` | Resolve every recent failed run of a repository |
//! | `POST` | `/mark-solution` | Store a confirmed (error, solution) pair |
//! | `GET`  | `/rag-stats` | Knowledge-base statistics |
//! | `GET`  | `/dashboard-data` | Statistics, index freshness, routing counters |
//! | `GET`  | `/records/{id}` | One stored record |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "log_content must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Malformed JSON and missing fields are reported as 400. Generation and
//! pipeline failures are never errors here; they produce degraded 200
//! responses.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use remedy_core::models::SOURCE_USER_VERIFIED;
use remedy_core::{NewRecord, PipelineFailure, Record, RecordId, Strategy};

use crate::app::Services;
use crate::config::Config;
use crate::extract::{extract_error_excerpt, has_allowed_extension, preview, PREVIEW_CHARS};
use crate::generation::GenerationBackend;
use crate::pipeline::parse_repo_url;
use crate::router::{BatchItem, BatchOutcome, Resolution, Solution};
use crate::stats::{self, DashboardData, RagStats};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    run_server_with_services(Arc::new(services)).await
}

/// Like [`run_server`], but serves pre-built services (custom backends,
/// pre-seeded stores).
pub async fn run_server_with_services(services: Arc<Services>) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        bind = %bind_addr,
        backend = services.router.backend().name(),
        inspector = services.inspector.name(),
        "remedy listening on http://{}",
        bind_addr
    );
    axum::serve(listener, app(services)).await?;
    Ok(())
}

/// Builds the route table.
pub fn app(services: Arc<Services>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/search-logs", post(handle_search_logs))
        .route("/upload-logs", post(handle_upload_logs))
        .route("/analyze-github", post(handle_analyze_github))
        .route("/mark-solution", post(handle_mark_solution))
        .route("/rag-stats", get(handle_rag_stats))
        .route("/dashboard-data", get(handle_dashboard))
        .route("/records/{id}", get(handle_get_record))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(AppState { services })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<remedy_core::Error> for AppError {
    fn from(e: remedy_core::Error) -> Self {
        use remedy_core::Error;
        match e {
            Error::InvalidInput(msg) => bad_request(msg),
            Error::NotFound(id) => not_found(format!("record not found: {}", id)),
            other => {
                warn!(error = %other, "request failed");
                internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

async fn handle_not_found() -> AppError {
    not_found("no such route")
}

// ============ GET / and /health ============

async fn handle_root() -> Json<Value> {
    Json(serde_json::json!({
        "message": "Remedy error-resolution API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Deadline for the backend probe behind `/health`.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `backend.validate()`, reporting `false` when it misses `deadline`.
async fn probe_backend(backend: &dyn GenerationBackend, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, backend.validate()).await {
        Ok(valid) => valid,
        Err(_) => {
            warn!(backend = backend.name(), ?deadline, "health probe timed out");
            false
        }
    }
}

/// `{"status": "healthy", "version": ..., "<backend>_api_valid": bool}`
async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    let backend = state.services.router.backend();
    let valid = probe_backend(backend.as_ref(), HEALTH_PROBE_TIMEOUT).await;
    let mut body = Map::new();
    body.insert("status".into(), Value::from("healthy"));
    body.insert("version".into(), Value::from(env!("CARGO_PKG_VERSION")));
    body.insert(format!("{}_api_valid", backend.name()), Value::from(valid));
    Json(Value::Object(body))
}

// ============ Resolution responses ============

#[derive(Serialize)]
struct Sources {
    rag: usize,
    claude: usize,
}

#[derive(Serialize)]
struct SearchResponse {
    solutions: Vec<Solution>,
    search_strategy: &'static str,
    strategy: Strategy,
    sources: Sources,
    total_count: usize,
    degraded: bool,
    similarity_score: f64,
    term_overlap_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_record_id: Option<RecordId>,
}

/// Wire label for a strategy, as the dashboard expects it.
fn search_strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::HighConfidenceRetrieval => "high_confidence_rag",
        Strategy::LowConfidenceRetrieval => "low_confidence_rag",
        Strategy::GenerationFallback => "claude_fallback",
    }
}

/// Dominant provenance of a resolution.
fn source_label(resolution: &Resolution) -> &'static str {
    if !resolution.matched_records.is_empty() {
        "rag"
    } else if resolution.degraded {
        "fallback"
    } else {
        "claude"
    }
}

impl From<&Resolution> for SearchResponse {
    fn from(r: &Resolution) -> Self {
        Self {
            solutions: r.solutions(),
            search_strategy: search_strategy_label(r.strategy),
            strategy: r.strategy,
            sources: Sources {
                rag: r.provenance_counts.retrieval,
                claude: r.provenance_counts.generation,
            },
            total_count: r.solution_count(),
            degraded: r.degraded,
            similarity_score: r.query_result.similarity_score,
            term_overlap_score: r.query_result.term_overlap_score,
            matched_record_id: r.query_result.matched_record_id,
        }
    }
}

// ============ POST /search-logs ============

#[derive(Deserialize)]
struct SearchRequest {
    log_content: String,
}

async fn handle_search_logs(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = payload?;
    if req.log_content.trim().is_empty() {
        return Err(bad_request("log_content must not be empty"));
    }
    let resolution = state.services.router.resolve(&req.log_content).await?;
    Ok(Json(SearchResponse::from(&resolution)))
}

// ============ POST /upload-logs ============

#[derive(Serialize)]
struct UploadResponse {
    filename: String,
    #[serde(flatten)]
    search: SearchResponse,
    parsed_content_preview: String,
}

async fn handle_upload_logs(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        if !has_allowed_extension(&filename) {
            return Err(bad_request(
                "Invalid file type. Please upload .log or .txt files.",
            ));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("could not read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing multipart field 'file'"))?;
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| bad_request("uploaded file is not valid UTF-8"))?;

    let excerpt = extract_error_excerpt(content);
    if excerpt.is_empty() {
        return Err(bad_request("uploaded file is empty"));
    }

    let resolution = state.services.router.resolve(&excerpt).await?;
    Ok(Json(UploadResponse {
        filename,
        search: SearchResponse::from(&resolution),
        parsed_content_preview: preview(&excerpt, PREVIEW_CHARS).to_string(),
    }))
}

// ============ POST /analyze-github ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    github_url: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PipelineResult {
    Resolved {
        pipeline: PipelineFailure,
        solutions: Vec<Solution>,
        solution_count: usize,
        source: &'static str,
        search_strategy: &'static str,
    },
    Failed {
        pipeline: PipelineFailure,
        error: String,
        solutions: Vec<Solution>,
        solution_count: usize,
    },
}

#[derive(Serialize)]
struct AnalyzeResponse {
    repository: String,
    results: Vec<PipelineResult>,
    total: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_analyze_github(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(req) = payload?;
    let (owner, repo) = parse_repo_url(&req.github_url)?;

    let listing = state.services.inspector.list_failures(&owner, &repo).await;
    let items = listing
        .failures
        .iter()
        .map(|f| BatchItem {
            label: f.workflow_name.clone(),
            text: f.error_text(),
        })
        .collect();
    let batch = state.services.router.resolve_batch(items).await;

    let results = listing
        .failures
        .into_iter()
        .zip(batch.results)
        .map(|(pipeline, outcome)| match outcome {
            BatchOutcome::Resolved { resolution, .. } => PipelineResult::Resolved {
                solutions: resolution.solutions(),
                solution_count: resolution.solution_count(),
                source: source_label(&resolution),
                search_strategy: search_strategy_label(resolution.strategy),
                pipeline,
            },
            BatchOutcome::Failed { error, .. } => PipelineResult::Failed {
                pipeline,
                error,
                solutions: Vec::new(),
                solution_count: 0,
            },
        })
        .collect();

    Ok(Json(AnalyzeResponse {
        repository: format!("{}/{}", owner, repo),
        results,
        total: batch.total,
        failed: batch.failed,
        error: listing.error,
    }))
}

// ============ POST /mark-solution ============

#[derive(Deserialize)]
struct MarkSolutionRequest {
    error_text: String,
    solution_text: String,
    #[serde(default = "default_mark_confidence")]
    confidence: f64,
    #[serde(default = "default_mark_source")]
    source: String,
}

fn default_mark_confidence() -> f64 {
    0.95
}

fn default_mark_source() -> String {
    SOURCE_USER_VERIFIED.to_string()
}

#[derive(Serialize)]
struct MarkSolutionResponse {
    message: String,
    entry_id: RecordId,
}

async fn handle_mark_solution(
    State(state): State<AppState>,
    payload: Result<Json<MarkSolutionRequest>, JsonRejection>,
) -> Result<Json<MarkSolutionResponse>, AppError> {
    let Json(req) = payload?;
    let id = state
        .services
        .knowledge_base()
        .ingest(NewRecord::new(
            req.error_text,
            req.solution_text,
            req.confidence,
            req.source,
        ))
        .await?;

    Ok(Json(MarkSolutionResponse {
        message: "Solution marked as correct and stored in database".to_string(),
        entry_id: id,
    }))
}

// ============ Statistics and records ============

async fn handle_rag_stats(State(state): State<AppState>) -> Result<Json<RagStats>, AppError> {
    Ok(Json(stats::rag_stats(&state.services).await?))
}

async fn handle_dashboard(State(state): State<AppState>) -> Result<Json<DashboardData>, AppError> {
    Ok(Json(stats::dashboard(&state.services).await?))
}

async fn handle_get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    let id: RecordId = id
        .parse()
        .map_err(|_| bad_request(format!("invalid record id: {}", id)))?;
    Ok(Json(state.services.knowledge_base().get(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remedy_core::GeneratedSolution;

    struct Hanging;

    #[async_trait]
    impl GenerationBackend for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }
        async fn generate(&self, _error_text: &str) -> remedy_core::Result<Vec<GeneratedSolution>> {
            Ok(vec![])
        }
        async fn validate(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(30)).await;
            true
        }
    }

    #[tokio::test]
    async fn test_health_probe_times_out() {
        let started = std::time::Instant::now();
        assert!(!probe_backend(&Hanging, Duration::from_millis(50)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_health_probe_passes_through_result() {
        let disabled = crate::generation::DisabledBackend;
        assert!(!probe_backend(&disabled, HEALTH_PROBE_TIMEOUT).await);
    }

    #[test]
    fn test_strategy_labels() {
        assert_eq!(
            search_strategy_label(Strategy::HighConfidenceRetrieval),
            "high_confidence_rag"
        );
        assert_eq!(
            search_strategy_label(Strategy::GenerationFallback),
            "claude_fallback"
        );
    }

    #[test]
    fn test_core_errors_map_to_status() {
        use remedy_core::Error;
        assert_eq!(
            AppError::from(Error::invalid("x")).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::from(Error::NotFound(3)).status, StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(Error::Storage("disk".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
