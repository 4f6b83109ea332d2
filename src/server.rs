//! HTTP API for question generation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/topics` | The 10 topic areas with stored question counts |
//! | `POST` | `/questions/generate` | Run one generation batch |
//!
//! # Status codes
//!
//! `POST /questions/generate` answers 200 for any batch that ran, even if
//! some or all attempts failed (the per-attempt `errors` list explains
//! why). It answers 400 for malformed requests (unknown topic or
//! difficulty, bad count) and 422 when the topic has no source material
//! and nothing was generated. A batch that aborts after accepting some
//! questions still answers 200, with the abort reason in `error`.
//!
//! Error bodies follow one shape:
//!
//! ```json
//! { "error": { "code": "invalid_topic", "message": "..." } }
//! ```
//!
//! If the client disconnects mid-batch, axum drops the handler future and
//! no further attempts are scheduled.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::batch::BatchGenerator;
use crate::config::Config;
use crate::db;
use crate::error::PipelineError;
use crate::models::{BatchResult, Difficulty, GeneratedQuestion, RetrievalQuery, TopicArea};
use crate::pipeline::build_generator;
use crate::store::{QuestionStore, SqliteQuestionStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<BatchGenerator>,
    pub store: Arc<dyn QuestionStore>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;

    let state = AppState {
        generator: Arc::new(build_generator(config, &pool)?),
        store: Arc::new(SqliteQuestionStore::new(pool)),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "question API listening");
    println!("Question API listening on http://{}", config.server.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/topics", get(handle_topics))
        .route("/questions/generate", post(handle_generate))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: message.into(),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::InvalidTopic(_) | PipelineError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::TopicNotFound(_) | PipelineError::NoSourceMaterial(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /topics ============

#[derive(Debug, Serialize)]
pub struct TopicSummary {
    pub topic_area: TopicArea,
    pub question_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<TopicSummary>,
}

pub async fn handle_topics(State(state): State<AppState>) -> Result<Json<TopicsResponse>, AppError> {
    let mut topics = Vec::with_capacity(TopicArea::ALL.len());
    for topic in TopicArea::ALL {
        let question_count = state
            .store
            .count_questions(Some(topic))
            .await
            .map_err(|e| AppError::internal(format!("{:#}", e)))?;
        topics.push(TopicSummary {
            topic_area: topic,
            question_count,
        });
    }
    Ok(Json(TopicsResponse { topics }))
}

// ============ POST /questions/generate ============

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub topic_area: String,
    pub difficulty: String,
    #[serde(default)]
    pub subtopic: Option<String>,
    #[serde(default)]
    pub learning_objective_id: Option<String>,
    #[serde(default)]
    pub learning_objective_text: Option<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub save_to_database: bool,
}

fn default_count() -> usize {
    1
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub questions: Vec<GeneratedQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_count: Option<usize>,
    pub errors: Vec<String>,
    pub source_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateRequest {
    /// Validates the request before any I/O happens.
    pub fn to_query(&self) -> Result<RetrievalQuery, PipelineError> {
        let topic: TopicArea = self.topic_area.parse()?;
        let difficulty: Difficulty = self.difficulty.parse()?;
        let mut query = RetrievalQuery::new(topic, difficulty).with_learning_objective(
            self.learning_objective_id.clone(),
            self.learning_objective_text.clone(),
        );
        query.subtopic = self.subtopic.clone();
        Ok(query)
    }
}

pub async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let query = req.to_query()?;
    let result = state.generator.generate_batch(&query, req.count).await?;
    respond(&state, req.save_to_database, result).await
}

/// Turns a finished batch into the response, saving accepted questions
/// when asked.
async fn respond(
    state: &AppState,
    save: bool,
    result: BatchResult,
) -> Result<Json<GenerateResponse>, AppError> {
    let mut error = match &result.aborted {
        Some(reason) if result.accepted.is_empty() => {
            return Err(AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "no_source_material".to_string(),
                message: reason.clone(),
            });
        }
        Some(reason) => Some(reason.clone()),
        None if result.errors.is_empty() => None,
        None => Some(format!(
            "{} of {} attempts failed",
            result.errors.len(),
            result.requested
        )),
    };

    let saved_count = if save {
        match state.store.insert_questions(&result.accepted).await {
            Ok(n) => Some(n),
            Err(e) => {
                error!(error = %e, "failed to save generated questions");
                error = Some(format!("saving questions failed: {:#}", e));
                Some(0)
            }
        }
    } else {
        None
    };

    Ok(Json(GenerateResponse {
        questions: result.accepted,
        saved_count,
        errors: result.errors,
        source_files: result.source_files,
        error,
    }))
}
