use serde::Deserialize;
use anyhow::Result;
use dotenvy::dotenv;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
// Wall-clock budget for one agent execution, sized for serverless-style limits.
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 9;
const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub openai_key: String,
    pub model: String,
    pub agent_timeout_secs: u64,
    pub history_limit: usize,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let openai_key = std::env::var("OPENAI_API_KEY")
            .map_err(|e| anyhow::anyhow!("Failed to load OPENAI_API_KEY: {}", e))?;

        let model = std::env::var("EDA_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let agent_timeout_secs = std::env::var("AGENT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_AGENT_TIMEOUT_SECS);

        let history_limit = std::env::var("HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        Ok(Config {
            openai_key,
            model,
            agent_timeout_secs,
            history_limit,
        })
    }
}
