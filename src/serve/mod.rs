use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::answer;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::nlp::{AnswerEngine, OpenAiConfig, OpenAiEngine};
use crate::store::{KnowledgeStore, PgStore, SummaryRecord};
use crate::telemetry::{self};
use crate::telemetry::ops::serve::Phase as ServePhase;

#[derive(Args)]
pub struct ServeCmd {
    /// Override the configured bind address.
    #[arg(long)]
    pub addr: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KnowledgeStore>,
    pub engine: Arc<dyn AnswerEngine>,
    pub question_max_chars: usize,
    pub cancel: CancellationToken,
}

pub async fn run(
    pool: &PgPool,
    config: &AppConfig,
    cancel: &CancellationToken,
    args: ServeCmd,
) -> Result<()> {
    let log = telemetry::serve();
    let addr = args.addr.as_deref().unwrap_or(&config.server_addr);

    let state = AppState {
        store: Arc::new(PgStore::new(pool.clone())),
        engine: Arc::new(OpenAiEngine::new(OpenAiConfig::from_app(config))?),
        question_max_chars: config.question_max_chars,
        cancel: cancel.clone(),
    };

    let listener = {
        let _s = log.span_kv(&ServePhase::Bind, [("addr", addr.to_string())]).entered();
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?
    };
    log.info(format!("🌐 Listening on {addr}"));

    let shutdown = cancel.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("serve")?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(get_summaries).post(post_question).fallback(method_not_allowed),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// JSON error envelope: `{"error": message}` with the mapped status code.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Deserialize)]
struct QuestionPayload {
    question: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct AnswerPayload {
    message: &'static str,
    answer: String,
}

async fn get_summaries(
    State(state): State<AppState>,
) -> Result<Json<Vec<SummaryRecord>>, ApiError> {
    let summaries = state.store.get_summaries().await?;
    Ok(Json(summaries))
}

async fn post_question(
    State(state): State<AppState>,
    payload: Result<Json<QuestionPayload>, JsonRejection>,
) -> Result<Json<AnswerPayload>, ApiError> {
    let Json(payload) =
        payload.map_err(|rejection| ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    let answer = answer::respond(
        state.store.as_ref(),
        state.engine.as_ref(),
        &state.cancel,
        state.question_max_chars,
        &payload.question,
        payload.user_id.as_deref(),
    )
    .await?;

    Ok(Json(AnswerPayload { message: "success", answer }))
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}
