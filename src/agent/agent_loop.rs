//! Agent loop for tool-based production analysis.
//!
//! One invocation drives the model through repeated rounds: each round asks
//! the model for a reply, and if the reply requests tools, dispatches every
//! call in order and appends one tool-result message per call. The loop ends
//! on the first reply without tool calls, or after `max_rounds` rounds.

use crate::agent::errors::AgentError;
use crate::agent::llm::{AssistantReply, ChatClient, ChatMessage, Role, ToolCallMessage};
use crate::agent::prompts::{initial_analysis_message, SYSTEM_PROMPT};
use crate::agent::session::{Session, SessionStore};
use crate::agent::tools::{get_tool_definitions, ToolDefinition, ToolDispatcher};
use crate::analysis::DEFAULT_HIGH_RISK_THRESHOLD;
use crate::charts::ChartRenderer;
use crate::data::Dataset;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Rounds allowed per invocation unless configured otherwise.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_rounds: usize,
    /// Failure rate above which a machine counts as high risk.
    pub high_risk_threshold: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            high_risk_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LoopState {
    AwaitingModel,
    DispatchingTools(Vec<ToolCallMessage>),
    Done(StopReason),
}

/// Why an invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model replied without requesting tools.
    Answered,
    /// The round limit was reached while tools were still being requested.
    RoundLimit,
}

/// Result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub response: String,
    /// Charts produced during this invocation only.
    pub charts: Vec<String>,
    pub session_id: String,
    pub rounds: usize,
    pub stop_reason: StopReason,
}

/// The production analyst agent.
pub struct AnalystAgent {
    client: Arc<dyn ChatClient>,
    dispatcher: ToolDispatcher,
    tools: Vec<ToolDefinition>,
    config: AgentConfig,
}

impl AnalystAgent {
    pub fn new(
        client: Arc<dyn ChatClient>,
        renderer: Arc<dyn ChartRenderer>,
        config: AgentConfig,
    ) -> Self {
        info!(
            "Initializing agent with model {} (max {} rounds)",
            client.model_name(),
            config.max_rounds
        );

        Self {
            dispatcher: ToolDispatcher::new(renderer, config.high_risk_threshold),
            tools: get_tool_definitions(),
            client,
            config: AgentConfig {
                max_rounds: config.max_rounds.max(1),
                ..config
            },
        }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Check whether the LLM endpoint is reachable.
    pub async fn check_connection(&self) -> bool {
        match self.client.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!("Ollama connection failed: {}", e);
                false
            }
        }
    }

    /// Start a fresh conversation asking for a full health report.
    pub async fn run_initial_analysis(
        &self,
        store: &SessionStore,
        key: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let handle = store.get_or_create(key);
        let mut guard = handle.lock().await;
        let session: &mut Session = &mut guard;
        let dataset = Self::require_dataset(session)?;

        info!("Running initial analysis for session {}", key);
        session.history = vec![ChatMessage::user(initial_analysis_message(&dataset))];
        self.run_loop(session, &dataset).await
    }

    /// Answer a follow-up question in an existing conversation.
    pub async fn chat(
        &self,
        store: &SessionStore,
        key: &str,
        message: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let handle = store.get_or_create(key);
        let mut guard = handle.lock().await;
        let session: &mut Session = &mut guard;
        let dataset = Self::require_dataset(session)?;

        session.history.push(ChatMessage::user(message));
        self.run_loop(session, &dataset).await
    }

    fn require_dataset(session: &Session) -> Result<Arc<Dataset>, AgentError> {
        session.dataset().ok_or_else(|| AgentError::NoDataset {
            session_id: session.key().to_string(),
        })
    }

    async fn run_loop(
        &self,
        session: &mut Session,
        dataset: &Dataset,
    ) -> Result<TurnOutcome, AgentError> {
        let mut produced = Vec::new();
        let mut rounds = 0;
        let mut state = LoopState::AwaitingModel;

        let stop_reason = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    rounds += 1;
                    debug!("Agent round {} ({} messages)", rounds, session.history.len());

                    let AssistantReply {
                        content,
                        tool_calls,
                    } = self
                        .client
                        .chat(SYSTEM_PROMPT, &session.history, &self.tools)
                        .await?;

                    session
                        .history
                        .push(ChatMessage::assistant(content, tool_calls.clone()));

                    if tool_calls.is_empty() {
                        LoopState::Done(StopReason::Answered)
                    } else {
                        LoopState::DispatchingTools(tool_calls)
                    }
                }
                LoopState::DispatchingTools(calls) => {
                    for call in &calls {
                        let outcome =
                            self.dispatcher
                                .dispatch(&call.function, dataset, &mut session.cache);
                        if let Some(image) = outcome.chart_image() {
                            session.charts.push(image.to_string());
                            produced.push(image.to_string());
                        }
                        session.history.push(ChatMessage::tool(outcome.history_content()));
                    }

                    if rounds >= self.config.max_rounds {
                        warn!(
                            "Stopping after {} rounds with tool calls still pending",
                            rounds
                        );
                        LoopState::Done(StopReason::RoundLimit)
                    } else {
                        LoopState::AwaitingModel
                    }
                }
                LoopState::Done(reason) => break reason,
            };
        };

        let response = final_answer(&session.history);
        info!(
            "Agent finished after {} rounds ({:?}), {} new charts",
            rounds,
            stop_reason,
            produced.len()
        );

        Ok(TurnOutcome {
            response,
            charts: produced,
            session_id: session.key().to_string(),
            rounds,
            stop_reason,
        })
    }
}

/// The newest assistant message with non-empty content.
fn final_answer(history: &[ChatMessage]) -> String {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.content.is_empty())
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::errors::LlmError;
    use crate::charts::SvgChartRenderer;
    use crate::data::load_csv_from_bytes;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies; falls back to `repeat` once the script runs out.
    #[derive(Default)]
    struct ScriptedClient {
        script: Mutex<VecDeque<Result<AssistantReply, LlmError>>>,
        repeat: Option<AssistantReply>,
        seen: Mutex<Vec<usize>>,
        reachable: bool,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<AssistantReply, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                reachable: true,
                ..Self::default()
            }
        }

        fn repeating(reply: AssistantReply) -> Self {
            Self {
                repeat: Some(reply),
                ..Self::new(vec![])
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn chat(
            &self,
            system: &str,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
        ) -> Result<AssistantReply, LlmError> {
            assert_eq!(system, SYSTEM_PROMPT);
            assert_eq!(tools.len(), 2);
            self.seen.lock().unwrap().push(messages.len());

            match self.script.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => self
                    .repeat
                    .clone()
                    .ok_or_else(|| LlmError::Decode("script exhausted".to_string())),
            }
        }

        async fn ping(&self) -> Result<(), LlmError> {
            if self.reachable {
                Ok(())
            } else {
                Err(LlmError::Connection {
                    url: "http://localhost:11434".to_string(),
                })
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Requests one analysis, then answers with the conversation's question.
    struct EchoClient;

    #[async_trait]
    impl ChatClient for EchoClient {
        async fn chat(
            &self,
            _system: &str,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<AssistantReply, LlmError> {
            tokio::task::yield_now().await;
            let question = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();

            if messages.last().map(|m| &m.role) == Some(&Role::User) {
                Ok(tools("", &[("analyze_data", json!({"analysis_type": "failure_rates"}))]))
            } else {
                Ok(AssistantReply {
                    content: format!("answer to {}", question),
                    tool_calls: vec![],
                })
            }
        }

        async fn ping(&self) -> Result<(), LlmError> {
            Ok(())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn text(content: &str) -> Result<AssistantReply, LlmError> {
        Ok(AssistantReply {
            content: content.to_string(),
            tool_calls: vec![],
        })
    }

    fn tools(content: &str, calls: &[(&str, Value)]) -> AssistantReply {
        AssistantReply {
            content: content.to_string(),
            tool_calls: calls
                .iter()
                .map(|(name, args)| ToolCallMessage::new(*name, args.clone()))
                .collect(),
        }
    }

    fn agent(client: ScriptedClient, max_rounds: usize) -> (AnalystAgent, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        let agent = AnalystAgent::new(
            client.clone(),
            Arc::new(SvgChartRenderer::new()),
            AgentConfig {
                max_rounds,
                ..AgentConfig::default()
            },
        );
        (agent, client)
    }

    async fn loaded_store(key: &str) -> SessionStore {
        let dataset =
            load_csv_from_bytes(include_bytes!("../../fixtures/production_sample.csv")).unwrap();
        let store = SessionStore::new();
        store.load_dataset(key, dataset).await;
        store
    }

    async fn history(store: &SessionStore, key: &str) -> Vec<ChatMessage> {
        store.get_or_create(key).lock().await.history().to_vec()
    }

    #[tokio::test]
    async fn test_plain_answer_single_round() {
        let store = loaded_store("s").await;
        let (agent, client) = agent(ScriptedClient::new(vec![text("Line looks healthy.")]), 10);

        let outcome = agent.chat(&store, "s", "How are we doing?").await.unwrap();
        assert_eq!(outcome.response, "Line looks healthy.");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.stop_reason, StopReason::Answered);
        assert_eq!(outcome.session_id, "s");
        assert!(outcome.charts.is_empty());

        let history = history(&store, "s").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(client.calls(), vec![1]);
    }

    #[tokio::test]
    async fn test_tool_results_follow_requests_in_order() {
        let store = loaded_store("s").await;
        let first = tools(
            "",
            &[
                ("analyze_data", json!({"analysis_type": "all"})),
                ("create_chart", json!({"chart_type": "machine_comparison"})),
                ("no_such_tool", json!({})),
            ],
        );
        let (agent, client) = agent(
            ScriptedClient::new(vec![Ok(first), text("M003 needs attention.")]),
            10,
        );

        let outcome = agent.run_initial_analysis(&store, "s").await.unwrap();
        assert_eq!(outcome.response, "M003 needs attention.");
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.charts.len(), 1);

        let history = history(&store, "s").await;
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Tool, Role::Assistant]
        );
        assert_eq!(history[1].tool_calls.as_ref().unwrap().len(), 3);

        let results: Vec<Value> = history[2..5]
            .iter()
            .map(|m| serde_json::from_str(&m.content).unwrap())
            .collect();
        assert_eq!(results[0]["type"], "analysis");
        assert_eq!(results[1]["type"], "chart");
        assert_eq!(results[2]["message"], "Unknown tool: no_such_tool");

        // The model saw the user message, then the full first round.
        assert_eq!(client.calls(), vec![1, 5]);

        let handle = store.get_or_create("s");
        let session = handle.lock().await;
        assert_eq!(session.charts(), outcome.charts.as_slice());
        assert_eq!(session.cache().len(), 4);
    }

    #[tokio::test]
    async fn test_round_limit_stops_after_tool_results() {
        let store = loaded_store("s").await;
        let looping = tools("", &[("analyze_data", json!({"analysis_type": "failure_rates"}))]);
        let (agent, client) = agent(ScriptedClient::repeating(looping), 3);

        let outcome = agent.chat(&store, "s", "Dig deeper").await.unwrap();
        assert_eq!(outcome.stop_reason, StopReason::RoundLimit);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.response, "");
        assert_eq!(client.calls().len(), 3);

        let history = history(&store, "s").await;
        assert_eq!(history.len(), 1 + 3 * 2);
        assert_eq!(history.last().unwrap().role, Role::Tool);
    }

    #[tokio::test]
    async fn test_round_limit_returns_last_non_empty_content() {
        let store = loaded_store("s").await;
        let script = vec![
            Ok(tools("Checking failure rates first.", &[("analyze_data", json!({}))])),
            Ok(tools("", &[("analyze_data", json!({"analysis_type": "failure_types"}))])),
        ];
        let (agent, _) = agent(ScriptedClient::new(script), 2);

        let outcome = agent.chat(&store, "s", "Report").await.unwrap();
        assert_eq!(outcome.stop_reason, StopReason::RoundLimit);
        assert_eq!(outcome.response, "Checking failure rates first.");
    }

    #[tokio::test]
    async fn test_llm_failure_leaves_no_partial_round() {
        let store = loaded_store("s").await;
        let script = vec![
            Ok(tools("", &[("create_chart", json!({"chart_type": "failure_by_type"}))])),
            Err(LlmError::Http {
                status: 500,
                body: "boom".to_string(),
            }),
        ];
        let (agent, _) = agent(ScriptedClient::new(script), 10);

        let err = agent.chat(&store, "s", "Chart it").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::Http { status: 500, .. })));

        // user, assistant with call, tool result; nothing from the failed round.
        let history = history(&store, "s").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().role, Role::Tool);

        // The chart from the completed round is kept.
        let handle = store.get_or_create("s");
        assert_eq!(handle.lock().await.charts().len(), 1);
    }

    #[tokio::test]
    async fn test_no_dataset() {
        let store = SessionStore::new();
        let (agent, client) = agent(ScriptedClient::new(vec![text("unused")]), 10);

        let err = agent.chat(&store, "empty", "hello").await.unwrap_err();
        assert!(matches!(err, AgentError::NoDataset { ref session_id } if session_id == "empty"));
        assert!(agent.run_initial_analysis(&store, "empty").await.is_err());

        assert!(history(&store, "empty").await.is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_charts_accumulate_across_invocations() {
        let store = loaded_store("s").await;
        let chart = |kind: &str| tools("", &[("create_chart", json!({ "chart_type": kind }))]);
        let script = vec![
            Ok(chart("failure_by_type")),
            text("First chart."),
            Ok(chart("failure_distribution")),
            text("Second chart."),
        ];
        let (agent, _) = agent(ScriptedClient::new(script), 10);

        let first = agent.chat(&store, "s", "one").await.unwrap();
        let second = agent.chat(&store, "s", "two").await.unwrap();
        assert_eq!(first.charts.len(), 1);
        assert_eq!(second.charts.len(), 1);
        assert_ne!(first.charts, second.charts);

        let handle = store.get_or_create("s");
        let session = handle.lock().await;
        assert_eq!(session.charts().len(), 2);
        assert_eq!(session.charts()[1], second.charts[0]);
    }

    #[tokio::test]
    async fn test_initial_analysis_replaces_history() {
        let store = loaded_store("s").await;
        let (agent, _) = agent(ScriptedClient::new(vec![text("a"), text("b")]), 10);

        agent.chat(&store, "s", "earlier question").await.unwrap();
        agent.run_initial_analysis(&store, "s").await.unwrap();

        let history = history(&store, "s").await;
        assert_eq!(history.len(), 2);
        assert!(history[0].content.contains("- 40 records"));
        assert!(history[0].content.contains("Executive Summary"));
    }

    #[tokio::test]
    async fn test_check_connection() {
        let (agent_up, _) = agent(ScriptedClient::new(vec![]), 10);
        assert!(agent_up.check_connection().await);

        let down = ScriptedClient {
            reachable: false,
            ..ScriptedClient::new(vec![])
        };
        let (agent_down, _) = agent(down, 10);
        assert!(!agent_down.check_connection().await);
    }

    #[test]
    fn test_final_answer() {
        let history = vec![
            ChatMessage::user("q"),
            ChatMessage::assistant("first", vec![]),
            ChatMessage::assistant("", vec![ToolCallMessage::new("analyze_data", json!({}))]),
            ChatMessage::tool("{}"),
        ];
        assert_eq!(final_answer(&history), "first");
        assert_eq!(final_answer(&history[..1]), "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_chats_on_different_sessions() {
        let dataset = Arc::new(
            load_csv_from_bytes(include_bytes!("../../fixtures/production_sample.csv")).unwrap(),
        );
        let store = SessionStore::new();
        store.load_dataset("line-a", dataset.clone()).await;
        store.load_dataset("line-b", dataset).await;

        let agent = AnalystAgent::new(
            Arc::new(EchoClient),
            Arc::new(SvgChartRenderer::new()),
            AgentConfig::default(),
        );

        let (a, b) = tokio::join!(
            agent.chat(&store, "line-a", "question A"),
            agent.chat(&store, "line-b", "question B"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.session_id, "line-a");
        assert_eq!(a.response, "answer to question A");
        assert_eq!(b.session_id, "line-b");
        assert_eq!(b.response, "answer to question B");

        for (key, question) in [("line-a", "question A"), ("line-b", "question B")] {
            let history = history(&store, key).await;
            assert_eq!(history.len(), 4);
            let questions: Vec<&str> = history
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .collect();
            assert_eq!(questions, vec![question]);
            assert_eq!(history[2].role, Role::Tool);
            assert_eq!(history[3].content, format!("answer to {}", question));
        }
    }
}
