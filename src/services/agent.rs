use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestToolMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, ChatCompletionTool, ChatCompletionToolType,
        CreateChatCompletionRequest, FunctionCall, FunctionObject, Role,
    },
    Client,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::error::AppError;
use crate::models::{AgentTurnResult, ChartPayload, ChatTurn, Source, Strategy};
use crate::prompts;
use crate::services::profiler;
use crate::services::row_source;
use crate::services::search::DocumentStore;
use crate::services::tools;

/// Upper bound on model calls inside one agent execution, so a misbehaving
/// model cannot spin inside the deadline.
const MAX_AGENT_STEPS: usize = 6;

/// Passages injected as context on the no-file path.
const SEARCH_PASSAGES: usize = 2;

const TIMEOUT_MESSAGE: &str = "Analysis timed out. Please try a simpler request.";
const RATE_LIMIT_MESSAGE: &str =
    "⚠️ **Daily Limit Reached**: The AI provider has hit its rate limit. Please try again later.";

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One model response: final text, or a batch of tool calls to satisfy.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
}

#[derive(Debug, Clone)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant {
        content: String,
        tool_calls: Vec<ToolInvocation>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The language-model provider, treated as an opaque function from prompt
/// plus declared tools to either text or tool invocations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, AppError>;
}

pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

fn to_openai_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
    match message {
        ChatMessage::System(content) => {
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: content.clone(),
                name: None,
                role: Role::System,
            })
        }
        ChatMessage::User(content) => {
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(content.clone()),
                name: None,
                role: Role::User,
            })
        }
        ChatMessage::Assistant { content, tool_calls } => {
            let calls: Vec<ChatCompletionMessageToolCall> = tool_calls
                .iter()
                .map(|call| ChatCompletionMessageToolCall {
                    id: call.id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();

            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: if content.is_empty() {
                    None
                } else {
                    Some(content.clone())
                },
                name: None,
                role: Role::Assistant,
                tool_calls: if calls.is_empty() { None } else { Some(calls) },
                function_call: None,
            })
        }
        ChatMessage::Tool { call_id, content } => {
            ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: content.clone(),
                role: Role::Tool,
                tool_call_id: call_id.clone(),
            })
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, AppError> {
        let messages: Vec<ChatCompletionRequestMessage> =
            messages.iter().map(to_openai_message).collect();

        let declared_tools: Vec<ChatCompletionTool> = tools
            .iter()
            .map(|tool| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: FunctionObject {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    parameters: Some(tool.parameters.clone()),
                },
            })
            .collect();

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.1),
            tools: if declared_tools.is_empty() {
                None
            } else {
                Some(declared_tools)
            },
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AppError::LlmError("Model returned no choices".to_string()))?;

        let content = choice.message.content.clone().unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolInvocation {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ModelTurn { content, tool_calls })
    }
}

/// One executed tool call: the tool's name and what it returned, recorded in
/// invocation order so charts can be extracted after the run.
#[derive(Debug, Clone)]
pub struct ToolStep {
    pub tool: String,
    pub observation: String,
}

pub struct TurnInput {
    pub message: String,
    pub file_path: Option<String>,
    pub system_prompt: Option<String>,
    pub history: Vec<ChatTurn>,
}

pub struct TurnOrchestrator {
    model: Arc<dyn ChatModel>,
    store: Arc<DocumentStore>,
    agent_timeout: Duration,
    history_limit: usize,
}

impl TurnOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        store: Arc<DocumentStore>,
        agent_timeout: Duration,
        history_limit: usize,
    ) -> Self {
        Self {
            model,
            store,
            agent_timeout,
            history_limit,
        }
    }

    /// Process one user turn. Always returns a well-formed result: every
    /// failure mode is translated into response text, never an escaping
    /// error.
    pub async fn run_turn(&self, input: TurnInput) -> AgentTurnResult {
        match &input.file_path {
            Some(path) => self.run_file_turn(path.clone(), &input).await,
            None => self.run_chat_turn(&input).await,
        }
    }

    async fn run_file_turn(&self, path: String, input: &TurnInput) -> AgentTurnResult {
        let executed = tokio::time::timeout(
            self.agent_timeout,
            self.execute_file_agent(&path, input),
        )
        .await;

        match executed {
            Ok(Ok((response, charts))) => AgentTurnResult {
                response,
                strategy: Strategy::EdaAgent,
                sources: Vec::new(),
                charts,
            },
            Ok(Err(err)) => {
                tracing::error!("EDA agent error: {}", err);
                AgentTurnResult {
                    response: error_message(&err),
                    strategy: Strategy::EdaAgent,
                    sources: Vec::new(),
                    charts: Vec::new(),
                }
            }
            Err(_) => {
                // Deadline won the race; the agent call is abandoned and no
                // partial tool results are used.
                tracing::warn!("Agent execution exceeded {:?} deadline", self.agent_timeout);
                AgentTurnResult {
                    response: TIMEOUT_MESSAGE.to_string(),
                    strategy: Strategy::EdaAgent,
                    sources: Vec::new(),
                    charts: Vec::new(),
                }
            }
        }
    }

    async fn execute_file_agent(
        &self,
        path: &str,
        input: &TurnInput,
    ) -> Result<(String, Vec<ChartPayload>), AppError> {
        let start = std::time::Instant::now();
        let rows = row_source::load_rows(path).await?;
        let profile = profiler::profile_table(&rows);
        tracing::info!(
            "Profiled {} rows x {} columns in {:?}",
            profile.row_count,
            profile.column_names.len(),
            start.elapsed()
        );

        let system = prompts::fill_eda_prompt(
            &profiler::summary_for_prompt(&profile).to_string(),
            &profiler::sample_for_prompt(&profile).to_string(),
            &input.message,
            path,
        );

        let mut messages = vec![ChatMessage::System(system)];
        for turn in recent_history(&input.history, self.history_limit) {
            messages.push(ChatMessage::User(turn.user.clone()));
            messages.push(ChatMessage::Assistant {
                content: turn.assistant.clone(),
                tool_calls: Vec::new(),
            });
        }
        messages.push(ChatMessage::User(input.message.clone()));

        let declared_tools = vec![ToolSpec {
            name: tools::CHART_TOOL_NAME.to_string(),
            description: tools::CHART_TOOL_DESCRIPTION.to_string(),
            parameters: tools::chart_tool_parameters(),
        }];

        let mut steps: Vec<ToolStep> = Vec::new();
        let mut response = String::new();

        for _ in 0..MAX_AGENT_STEPS {
            let turn = self.model.complete(&messages, &declared_tools).await?;
            response = turn.content.clone();

            if turn.tool_calls.is_empty() {
                break;
            }

            messages.push(ChatMessage::Assistant {
                content: turn.content.clone(),
                tool_calls: turn.tool_calls.clone(),
            });

            // Tool calls are executed sequentially, as issued by the agent.
            for call in &turn.tool_calls {
                let observation = if call.name == tools::CHART_TOOL_NAME {
                    let args: Value =
                        serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
                    tools::generate_chart(&args).await
                } else {
                    format!("Error: Unknown tool '{}'", call.name)
                };

                steps.push(ToolStep {
                    tool: call.name.clone(),
                    observation: observation.clone(),
                });
                messages.push(ChatMessage::Tool {
                    call_id: call.id.clone(),
                    content: observation,
                });
            }
        }

        Ok((response, collect_charts(&steps)))
    }

    async fn run_chat_turn(&self, input: &TurnInput) -> AgentTurnResult {
        let mut context = String::new();
        let mut sources = Vec::new();
        let mut strategy = Strategy::Direct;

        let docs = self
            .store
            .similarity_search(&input.message, SEARCH_PASSAGES)
            .await;
        if !docs.is_empty() {
            let passages: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
            context = format!(
                "Context from uploaded documents:\n{}",
                passages.join("\n\n")
            );
            sources.push(Source {
                title: "Document Context".to_string(),
                url: "#".to_string(),
            });
            strategy = Strategy::Vector;
        }

        let base = input
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::DEFAULT_SYSTEM_PROMPT.to_string());
        let current_date = Utc::now().format("%Y-%m-%d").to_string();
        let system = format!(
            "{}\n\nThe current date is {}.\n\n[INSTRUCTIONS]: {}\n\n{}",
            base,
            current_date,
            prompts::REASONING_INSTRUCTION,
            context
        );

        let mut messages = vec![ChatMessage::System(system)];
        for turn in recent_history(&input.history, self.history_limit) {
            messages.push(ChatMessage::User(turn.user.clone()));
            messages.push(ChatMessage::Assistant {
                content: turn.assistant.clone(),
                tool_calls: Vec::new(),
            });
        }
        messages.push(ChatMessage::User(input.message.clone()));

        // No chart capability on this path.
        match self.model.complete(&messages, &[]).await {
            Ok(turn) => AgentTurnResult {
                response: turn.content,
                strategy,
                sources,
                charts: Vec::new(),
            },
            Err(err) => {
                tracing::error!("Chat turn error: {}", err);
                AgentTurnResult {
                    response: error_message(&err),
                    strategy,
                    sources,
                    charts: Vec::new(),
                }
            }
        }
    }
}

/// Most recent `limit` exchanges, kept in chronological order.
fn recent_history(history: &[ChatTurn], limit: usize) -> &[ChatTurn] {
    let skip = history.len().saturating_sub(limit);
    &history[skip..]
}

/// Walk executed tool steps in invocation order and recover every chart
/// payload the agent produced. Error objects and unparseable observations
/// are skipped; an agent may legitimately produce several charts per turn.
pub fn collect_charts(steps: &[ToolStep]) -> Vec<ChartPayload> {
    steps
        .iter()
        .filter(|step| step.tool == tools::CHART_TOOL_NAME)
        .filter_map(|step| serde_json::from_str::<Value>(&step.observation).ok())
        .filter(|value| value.get("error").is_none())
        .filter_map(|value| serde_json::from_value::<ChartPayload>(value).ok())
        .collect()
}

fn error_message(err: &AppError) -> String {
    let text = err.to_string();
    if text.contains("429") || text.to_lowercase().contains("rate limit") {
        RATE_LIMIT_MESSAGE.to_string()
    } else {
        format!("Failed to analyze data: {}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search::StoredDocument;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::io::Write;
    use tokio::sync::Mutex;

    struct ScriptedModel {
        turns: Mutex<VecDeque<Result<ModelTurn, AppError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<Result<ModelTurn, AppError>>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ModelTurn, AppError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.turns.lock().await.pop_front().unwrap_or(Ok(ModelTurn {
                content: "Done.".to_string(),
                tool_calls: Vec::new(),
            }))
        }
    }

    fn orchestrator(model: ScriptedModel, timeout: Duration) -> TurnOrchestrator {
        TurnOrchestrator::new(
            Arc::new(model),
            Arc::new(DocumentStore::new()),
            timeout,
            10,
        )
    }

    fn text_turn(content: &str) -> Result<ModelTurn, AppError> {
        Ok(ModelTurn {
            content: content.to_string(),
            tool_calls: Vec::new(),
        })
    }

    fn tool_turn(arguments: Value) -> Result<ModelTurn, AppError> {
        Ok(ModelTurn {
            content: String::new(),
            tool_calls: vec![ToolInvocation {
                id: "call_1".to_string(),
                name: tools::CHART_TOOL_NAME.to_string(),
                arguments: arguments.to_string(),
            }],
        })
    }

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn file_input(path: &str, message: &str) -> TurnInput {
        TurnInput {
            message: message.to_string(),
            file_path: Some(path.to_string()),
            system_prompt: None,
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn file_turn_runs_agent_and_collects_histogram_chart() {
        let file = write_csv("Age\n20\n25\n30\n35\n40\n45\n50\n");
        let path = file.path().to_str().unwrap().to_string();

        let model = ScriptedModel::new(vec![
            tool_turn(json!({
                "file_path": path.clone(),
                "chart_type": "histogram",
                "x_column": "Age",
                "title": "Age distribution"
            })),
            text_turn("Here is the age distribution."),
        ]);
        let orch = orchestrator(model, Duration::from_secs(9));

        let result = orch
            .run_turn(file_input(&path, "show distribution of Age"))
            .await;

        assert_eq!(result.strategy, Strategy::EdaAgent);
        assert_eq!(result.response, "Here is the age distribution.");
        assert_eq!(result.charts.len(), 1);
        assert_eq!(result.charts[0].x_key, "Age");
        assert_eq!(result.charts[0].series_keys, vec!["Frequency"]);
    }

    #[tokio::test]
    async fn multiple_tool_calls_yield_multiple_charts() {
        let file = write_csv("City,Sales\nLisbon,10\nPorto,20\nLisbon,30\n");
        let path = file.path().to_str().unwrap().to_string();

        let model = ScriptedModel::new(vec![
            tool_turn(json!({
                "file_path": path.clone(),
                "chart_type": "bar",
                "x_column": "City"
            })),
            tool_turn(json!({
                "file_path": path.clone(),
                "chart_type": "line",
                "x_column": "City",
                "series_columns": ["Sales"]
            })),
            text_turn("Two views of the data."),
        ]);
        let orch = orchestrator(model, Duration::from_secs(9));

        let result = orch.run_turn(file_input(&path, "show me charts")).await;

        assert_eq!(result.charts.len(), 2);
        assert_eq!(result.charts[0].series_keys, vec!["Count"]);
        assert_eq!(result.charts[1].series_keys, vec!["Sales"]);
    }

    #[tokio::test]
    async fn failed_tool_call_is_visible_to_agent_but_yields_no_chart() {
        let file = write_csv("City\nLisbon\n");
        let path = file.path().to_str().unwrap().to_string();

        let model = ScriptedModel::new(vec![
            tool_turn(json!({ "chart_type": "bar" })), // missing fields
            text_turn("I could not chart that."),
        ]);
        let orch = orchestrator(model, Duration::from_secs(9));

        let result = orch.run_turn(file_input(&path, "chart please")).await;

        assert_eq!(result.response, "I could not chart that.");
        assert!(result.charts.is_empty());
    }

    #[tokio::test]
    async fn deadline_expiry_returns_timeout_message() {
        let file = write_csv("Age\n20\n");
        let path = file.path().to_str().unwrap().to_string();

        let model = ScriptedModel::new(vec![text_turn("too late")])
            .with_delay(Duration::from_millis(200));
        let orch = orchestrator(model, Duration::from_millis(20));

        let result = orch.run_turn(file_input(&path, "analyze")).await;

        assert_eq!(result.response, TIMEOUT_MESSAGE);
        assert!(result.charts.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_errors_map_to_fixed_message() {
        let file = write_csv("Age\n20\n");
        let path = file.path().to_str().unwrap().to_string();

        let model = ScriptedModel::new(vec![Err(AppError::LlmError(
            "status 429 Too Many Requests".to_string(),
        ))]);
        let orch = orchestrator(model, Duration::from_secs(9));

        let result = orch.run_turn(file_input(&path, "analyze")).await;
        assert_eq!(result.response, RATE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn missing_source_file_is_reported_not_thrown() {
        let model = ScriptedModel::new(vec![]);
        let orch = orchestrator(model, Duration::from_secs(9));

        let result = orch
            .run_turn(file_input("/nonexistent/data.csv", "analyze"))
            .await;

        assert!(result.response.starts_with("Failed to analyze data:"));
        assert_eq!(result.strategy, Strategy::EdaAgent);
    }

    #[tokio::test]
    async fn chat_turn_with_matching_documents_uses_vector_strategy() {
        let store = Arc::new(DocumentStore::new());
        store
            .add_documents(vec![StoredDocument {
                content: "Quarterly sales grew 12 percent".to_string(),
                source: "report.txt".to_string(),
            }])
            .await;

        let model = ScriptedModel::new(vec![text_turn("Sales grew 12 percent.")]);
        let orch = TurnOrchestrator::new(
            Arc::new(model),
            store,
            Duration::from_secs(9),
            10,
        );

        let result = orch
            .run_turn(TurnInput {
                message: "how did sales do this quarter".to_string(),
                file_path: None,
                system_prompt: None,
                history: Vec::new(),
            })
            .await;

        assert_eq!(result.strategy, Strategy::Vector);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].title, "Document Context");
        assert!(result.charts.is_empty());
    }

    #[tokio::test]
    async fn chat_turn_without_documents_falls_back_to_direct() {
        let model = ScriptedModel::new(vec![text_turn("Hello!")]);
        let orch = orchestrator(model, Duration::from_secs(9));

        let result = orch
            .run_turn(TurnInput {
                message: "hi there".to_string(),
                file_path: None,
                system_prompt: None,
                history: Vec::new(),
            })
            .await;

        assert_eq!(result.strategy, Strategy::Direct);
        assert!(result.sources.is_empty());
        assert_eq!(result.response, "Hello!");
    }

    #[test]
    fn recent_history_keeps_the_newest_turns() {
        let history: Vec<ChatTurn> = (0..12)
            .map(|i| ChatTurn {
                user: format!("q{}", i),
                assistant: format!("a{}", i),
            })
            .collect();

        let recent = recent_history(&history, 10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].user, "q2");
        assert_eq!(recent[9].user, "q11");
    }

    #[test]
    fn collect_charts_skips_errors_and_keeps_order() {
        let payload_a = json!({
            "type": "bar", "data": [{"City": "Lisbon", "Count": 2}],
            "xKey": "City", "seriesKeys": ["Count"], "title": "A", "description": ""
        });
        let payload_b = json!({
            "type": "histogram", "data": [{"Age": "20-30", "Frequency": 3}],
            "xKey": "Age", "seriesKeys": ["Frequency"], "title": "B", "description": ""
        });

        let steps = vec![
            ToolStep {
                tool: tools::CHART_TOOL_NAME.to_string(),
                observation: payload_a.to_string(),
            },
            ToolStep {
                tool: tools::CHART_TOOL_NAME.to_string(),
                observation: json!({ "error": "No data generated." }).to_string(),
            },
            ToolStep {
                tool: tools::CHART_TOOL_NAME.to_string(),
                observation: "Error: Missing required fields".to_string(),
            },
            ToolStep {
                tool: "other_tool".to_string(),
                observation: payload_b.to_string(),
            },
            ToolStep {
                tool: tools::CHART_TOOL_NAME.to_string(),
                observation: payload_b.to_string(),
            },
        ];

        let charts = collect_charts(&steps);
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].title, "A");
        assert_eq!(charts[1].title, "B");
    }
}
