use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

use services::agent::{ChatModel, OpenAiChat};
use services::search::DocumentStore;

mod config;
mod error;
mod logging;
mod prompts;
mod routes;
mod services;
pub mod models;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::Config::new()?;

    // Build our application state
    let state = Arc::new(AppState::new(config));

    // Build our application with a route
    let app = Router::new()
        .merge(routes::routes())
        .merge(routes::chat::routes())
        .with_state(state);

    // Run it
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Application state
pub struct AppState {
    pub config: config::Config,
    pub model: Arc<dyn ChatModel>,
    pub store: Arc<DocumentStore>,
}

impl AppState {
    fn new(config: config::Config) -> Self {
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAiChat::new(&config.openai_key, &config.model));
        Self {
            config,
            model,
            store: Arc::new(DocumentStore::new()),
        }
    }
}
