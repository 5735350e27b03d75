use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::analysis;
use crate::api::{Client, InferenceEngine};
use crate::envconfig::{EnvConfig, Host};
use crate::error::Error;
use crate::models::{AnalyzeRequest, ChatRequest};
use crate::relay::Relay;

const ANALYZE_FAILED: &str = "Failed to analyze symptoms";
const CHAT_FAILED: &str = "Failed to process chat message";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn InferenceEngine>,
    pub relay_buffer: usize,
    pub stream_idle_timeout: Duration,
}

impl AppState {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            relay_buffer: 32,
            stream_idle_timeout: Duration::from_secs(120),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze-symptoms", post(analyze_symptoms))
        .route("/analyze", post(analyze_symptoms))
        .route("/api/chat", post(chat))
        .route("/chat", post(chat))
        .route("/api/health", get(health))
        .layer(axum::middleware::from_fn(crate::middleware::trace_requests))
        .with_state(state)
}

pub async fn serve(config: EnvConfig) -> Result<()> {
    let stream_idle_timeout = config.engine.stream_idle_timeout;
    let client = Client::new(config.engine).context("building engine client")?;
    tracing::info!(
        engine = %client.config().base_url,
        analysis_model = %client.config().analysis_model,
        chat_model = %client.config().chat_model,
        "inference engine configured"
    );

    let state = AppState {
        engine: Arc::new(client),
        relay_buffer: config.relay_buffer,
        stream_idle_timeout,
    };

    run(&config.listen, router(state)).await
}

async fn run(listen: &Host, app: Router) -> Result<()> {
    let addr = listen.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!("Dhanvantri listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn error_response(err: Error, server_message: &str) -> Response {
    let status = err.status();
    let message = if err.is_client_error() {
        err.to_string()
    } else {
        tracing::error!(error = %err, "request failed");
        server_message.to_string()
    };
    (status, Json(json!({ "error": message }))).into_response()
}

async fn analyze_symptoms(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return error_response(Error::MalformedRequest(rejection.body_text()), ANALYZE_FAILED)
        }
    };

    match analysis::analyze(state.engine.as_ref(), req.symptoms.as_deref()).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(e) => error_response(e, ANALYZE_FAILED),
    }
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return error_response(Error::MalformedRequest(rejection.body_text()), CHAT_FAILED)
        }
    };

    let upstream = match state.engine.stream_generate(req.prompt()).await {
        Ok(stream) => stream,
        Err(e) => return error_response(e, CHAT_FAILED),
    };

    let body = Relay::new(upstream)
        .idle_timeout(state.stream_idle_timeout)
        .spawn(state.relay_buffer);

    (
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    match state.engine.version().await {
        Ok(version) => Json(json!({ "status": "ok", "engine": version })).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        )
            .into_response(),
    }
}
