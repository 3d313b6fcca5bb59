use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use course_advisor::llm::ChatCompletionsClient;
use course_advisor::models::{EvaluateQuery, IndexStatusResponse, QueryRequest, QueryResponse};
use course_advisor::rag::evaluator::EvaluationReport;
use course_advisor::{init_tracing, CourseAdvisor, RagError, Settings};

struct AppState {
    advisor: CourseAdvisor,
    llm: ChatCompletionsClient,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let settings = Settings::load().context("failed to load settings")?;
    tracing::info!("Index directory: {}", settings.index.database_path.display());
    tracing::info!("LLM endpoint: {} ({})", settings.llm.base_url, settings.llm.model);

    let bind = settings.server.bind.clone();
    let timeout = Duration::from_secs(settings.server.request_timeout_secs);
    let llm = ChatCompletionsClient::new(settings.llm.clone());
    let advisor = CourseAdvisor::from_settings(settings)
        .await
        .context("failed to initialize course advisor")?;

    let state = Arc::new(AppState { advisor, llm });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/evaluate", get(evaluate_handler))
        .route("/api/index/rebuild", post(rebuild_handler))
        .route("/api/health", get(health_check))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("Course advisor listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

fn status_for(error: &RagError) -> StatusCode {
    match error {
        e if e.is_upstream() => StatusCode::BAD_GATEWAY,
        RagError::MissingLabeledSet(_) => StatusCode::NOT_FOUND,
        RagError::LabeledSet { .. } => StatusCode::BAD_REQUEST,
        RagError::PathNotAllowed(_) => StatusCode::FORBIDDEN,
        RagError::IndexBusy => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(context: &str, error: RagError) -> ApiError {
    tracing::error!("{}: {}", context, error);
    (status_for(&error), format!("{context}: {error}"))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request_id = Uuid::new_v4();

    if request.question.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "question must not be empty".to_string()));
    }

    let answer = state
        .advisor
        .answer_query(&request.question, request.body_search.as_deref())
        .await
        .map_err(|e| api_error("Error processing query", e))?;

    let retrieved_courses = request.filters.apply(answer.retrieved_courses);
    tracing::info!(%request_id, courses = retrieved_courses.len(), "query answered");

    Ok(Json(QueryResponse {
        request_id,
        answer: answer.answer,
        retrieved_courses,
        elapsed_secs: answer.elapsed_secs,
    }))
}

async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EvaluateQuery>,
) -> Result<Json<EvaluationReport>, ApiError> {
    let file = query
        .labeled_set_file
        .filter(|f| !f.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "labeled_set_file is required".to_string()))?;

    let report = state
        .advisor
        .evaluate_labeled_set(&file)
        .await
        .map_err(|e| api_error("Evaluation failed", e))?;

    Ok(Json(report))
}

async fn rebuild_handler(State(state): State<Arc<AppState>>) -> Result<Json<IndexStatusResponse>, ApiError> {
    let status = state
        .advisor
        .rebuild_index()
        .await
        .map_err(|e| api_error("Index rebuild failed", e))?;

    Ok(Json(IndexStatusResponse {
        entries: status.total_entries,
        dimension: status.dimension,
        built_at: status.last_indexed_at.unwrap_or_else(Utc::now),
        is_rebuilding: status.is_indexing,
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let llm_healthy = state.llm.health_check().await.unwrap_or(false);
    let index = state.advisor.index_status().await;

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "llm": llm_healthy,
            "index": {
                "entries": index.total_entries,
                "is_indexing": index.is_indexing,
                "last_indexed_at": index.last_indexed_at,
                "last_error": index.last_error,
            }
        }
    }))
}
