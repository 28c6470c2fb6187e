// SPDX-License-Identifier: MIT

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::composite::{CompositeEngine, CompositeRunRequest, RunEvent};
use crate::core::error::{CompositeError, Result};
use crate::strategies::{LocalStrategyRunner, StrategyInstance};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    engine: CompositeEngine,
    runner: LocalStrategyRunner,
}

impl AppState {
    pub fn new(engine: CompositeEngine, runner: LocalStrategyRunner) -> Self {
        Self { engine, runner }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/strategies", get(list_strategies))
        .route("/api/composites/validate", post(validate_composite))
        .route("/api/composites/run", post(run_composite))
        .route("/api/composites/run/stream", post(stream_composite))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn error_response(err: &CompositeError) -> Response {
    let status = match err {
        CompositeError::UnsupportedCombineMode(_)
        | CompositeError::StrategyNotFound(_)
        | CompositeError::PromptNotFound(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_strategies(State(state): State<AppState>) -> Json<Value> {
    let mut instances: Vec<&StrategyInstance> = state.runner.instances().collect();
    instances.sort_by(|a, b| a.id.cmp(&b.id));
    let items = state.runner.registry().list().await;
    Json(json!({ "items": items, "instances": instances }))
}

/// Body is a raw graph document; never fails, problems come back as codes
async fn validate_composite(State(state): State<AppState>, Json(raw): Json<Value>) -> Response {
    Json(state.engine.validate(&raw).await).into_response()
}

async fn run_composite(
    State(state): State<AppState>,
    Json(request): Json<CompositeRunRequest>,
) -> Response {
    match state.engine.run(&request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            log::error!("Composite {} failed: {}", request.composite_id, e);
            error_response(&e)
        }
    }
}

async fn stream_composite(
    State(state): State<AppState>,
    Json(request): Json<CompositeRunRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming run for composite: {}", request.composite_id);
        // Failures are already delivered to the client as an `error` event
        if let Err(e) = state.engine.run_stream(&request, tx).await {
            log::error!("Composite {} failed: {}", request.composite_id, e);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event: RunEvent| {
        let name = event.name();
        Ok(Event::default()
            .event(name)
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}
