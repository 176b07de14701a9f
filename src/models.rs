use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which response path a turn took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Direct,
    Vector,
    EdaAgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

/// Chart-ready dataset plus the metadata the frontend needs to render it.
/// This exact structure is serialized as the chart tool's output string and
/// parsed back out of the agent's intermediate steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPayload {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub data: Vec<Value>,
    #[serde(rename = "xKey")]
    pub x_key: String,
    #[serde(rename = "seriesKeys")]
    pub series_keys: Vec<String>,
    pub title: String,
    pub description: String,
}

/// One user message and its complete agent-mediated response, handed to the
/// persistence layer for storage and replayed verbatim to the client.
#[derive(Debug, Clone, Serialize)]
pub struct AgentTurnResult {
    pub response: String,
    pub strategy: Strategy,
    pub sources: Vec<Source>,
    pub charts: Vec<ChartPayload>,
}

/// A prior user/assistant exchange, supplied by the caller in chronological
/// order since conversation storage lives outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}
