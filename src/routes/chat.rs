use axum::{
    extract::State,
    routing::post,
    Router,
    Json,
    http::Method,
};
use serde::Deserialize;
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    models::{AgentTurnResult, ChatTurn},
    services::agent::{TurnInput, TurnOrchestrator},
};
use tower_http::cors::{CorsLayer, Any};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/chat", post(chat))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    message: String,
    file_path: Option<String>,
    system_prompt: Option<String>,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[axum::debug_handler]
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<AgentTurnResult>, AppError> {
    let start = std::time::Instant::now();
    tracing::info!(
        "Starting chat turn, file attached: {}, history turns: {}",
        request.file_path.is_some(),
        request.history.len()
    );

    if request.message.trim().is_empty() {
        return Err(AppError::InvalidInput("Message must not be empty".to_string()));
    }

    let orchestrator = TurnOrchestrator::new(
        state.model.clone(),
        state.store.clone(),
        std::time::Duration::from_secs(state.config.agent_timeout_secs),
        state.config.history_limit,
    );

    let result = orchestrator
        .run_turn(TurnInput {
            message: request.message,
            file_path: request.file_path,
            system_prompt: request.system_prompt,
            history: request.history,
        })
        .await;

    tracing::info!(
        "Turn completed in {:?}, strategy: {:?}, charts: {}",
        start.elapsed(),
        result.strategy,
        result.charts.len()
    );

    Ok(Json(result))
}
