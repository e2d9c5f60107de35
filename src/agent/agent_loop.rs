//! The prompt-driven tool loop.
//!
//! Each user message runs through:
//! 1. Compile the conversation and call the model
//! 2. Parse the reply for tool invocations
//! 3. Run them in order and append one tool turn per invocation
//! 4. Repeat until the model answers without invocations, or the round cap hits

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::conversation::{Conversation, ConversationTurn};
use super::dispatcher::Dispatcher;
use super::parser::parse_invocations;
use super::prompt::{build_system_prompt, compile};
use crate::config::AgentConfig;
use crate::llm::{LlmClient, LlmError};
use crate::tools::ToolRegistry;

/// Where a session is in handling the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    AwaitingUser,
    CallingLlm,
    Parsing,
    Dispatching,
    Done,
    Aborted,
}

/// Why a message ended without a final model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// `max_tool_iterations` dispatch rounds ran without a final answer.
    IterationCap,
    /// The model call failed or timed out. Carries the error text.
    LlmFailure(String),
    Cancelled,
}

/// How a message ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Aborted(AbortReason),
}

/// Answer to one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub outcome: Outcome,
    /// Dispatch rounds run for this message.
    pub tool_rounds: usize,
}

/// One conversation with the assistant. Processes one message at a time.
pub struct ChatSession {
    llm: Arc<dyn LlmClient>,
    dispatcher: Dispatcher,
    conversation: Conversation,
    state: LoopState,
    max_tool_iterations: usize,
    llm_timeout: Duration,
}

impl ChatSession {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        let system_prompt = build_system_prompt(&registry);
        Self {
            llm,
            dispatcher: Dispatcher::new(registry, config.tool_timeout, config.tool_output_limit),
            conversation: Conversation::new(system_prompt, config.max_chat_history),
            state: LoopState::AwaitingUser,
            max_tool_iterations: config.max_tool_iterations,
            llm_timeout: config.llm_timeout,
        }
    }

    /// Loop state after the last transition.
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    /// Drop all non-system turns.
    pub fn reset(&mut self) {
        self.conversation.reset();
        self.state = LoopState::AwaitingUser;
        tracing::debug!("Conversation reset");
    }

    /// Run the loop for one user message with no way to cancel it.
    pub async fn submit(&mut self, user_text: &str) -> Reply {
        self.submit_with_cancel(user_text, &CancellationToken::new())
            .await
    }

    /// Run the loop for one user message. `cancel` aborts an in-flight
    /// model or tool call.
    pub async fn submit_with_cancel(&mut self, user_text: &str, cancel: &CancellationToken) -> Reply {
        tracing::debug!(chars = user_text.len(), "Processing user message");
        self.conversation.push(ConversationTurn::user(user_text));
        let mut rounds = 0;

        loop {
            self.transition(LoopState::CallingLlm);
            let messages = compile(&self.conversation);
            let call = tokio::time::timeout(self.llm_timeout, self.llm.complete(&messages));
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = call => Some(result.unwrap_or_else(|_| {
                    Err(LlmError::Timeout(self.llm_timeout.as_secs()))
                })),
            };
            let text = match response {
                None => return self.abort(AbortReason::Cancelled, rounds),
                Some(Err(err)) => {
                    tracing::error!(provider = self.llm.name(), "LLM call failed: {}", err);
                    return self.abort(AbortReason::LlmFailure(err.to_string()), rounds);
                }
                Some(Ok(text)) => text,
            };
            self.conversation.push(ConversationTurn::assistant(text.clone()));

            self.transition(LoopState::Parsing);
            let invocations: Vec<_> = parse_invocations(&text).collect();
            if invocations.is_empty() {
                self.transition(LoopState::Done);
                return Reply {
                    text,
                    outcome: Outcome::Done,
                    tool_rounds: rounds,
                };
            }

            self.transition(LoopState::Dispatching);
            for invocation in &invocations {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.dispatcher.dispatch(invocation) => Some(result),
                };
                let Some(result) = result else {
                    return self.abort(AbortReason::Cancelled, rounds);
                };
                self.conversation
                    .push(ConversationTurn::tool(result.to_turn_content()));
            }
            rounds += 1;

            if rounds >= self.max_tool_iterations {
                let answer = format!(
                    "I stopped after {} rounds of tool calls without reaching a final answer. \
                     The tool results so far are in our conversation; try asking a narrower question.",
                    rounds
                );
                self.conversation
                    .push(ConversationTurn::assistant(answer.clone()));
                self.transition(LoopState::Aborted);
                tracing::warn!(rounds, "Tool iteration cap reached");
                return Reply {
                    text: answer,
                    outcome: Outcome::Aborted(AbortReason::IterationCap),
                    tool_rounds: rounds,
                };
            }
        }
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "Loop state");
        self.state = next;
    }

    fn abort(&mut self, reason: AbortReason, rounds: usize) -> Reply {
        self.transition(LoopState::Aborted);
        let text = match &reason {
            AbortReason::LlmFailure(message) => {
                format!("I apologize, but I encountered an error: {}", message)
            }
            AbortReason::Cancelled => "The request was cancelled.".to_string(),
            AbortReason::IterationCap => {
                "I stopped before reaching a final answer.".to_string()
            }
        };
        Reply {
            text,
            outcome: Outcome::Aborted(reason),
            tool_rounds: rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::conversation::TurnRole;
    use crate::llm::{ChatMessage, LlmResult, Role};
    use crate::tools::testing::{issue, FakeTracker};
    use crate::tools::{jira_registry, IssueLimits, ParamSpec, Tool, ToolArgs};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Model that replays scripted replies, then repeats `fallback`.
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<LlmResult<String>>>,
        fallback: Option<String>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                ..Self::default()
            }
        }

        fn always(reply: &str) -> Self {
            Self {
                fallback: Some(reply.to_string()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().expect("seen").len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "script"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
            self.seen.lock().expect("seen").push(messages.to_vec());
            let next = self.replies.lock().expect("replies").pop_front();
            match (next, &self.fallback) {
                (Some(reply), _) => reply,
                (None, Some(fallback)) => Ok(fallback.clone()),
                (None, None) => Err(LlmError::InvalidResponse("script exhausted".to_string())),
            }
        }
    }

    /// Model that never answers.
    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        fn name(&self) -> &'static str {
            "hanging"
        }

        fn model(&self) -> &str {
            "none"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> LlmResult<String> {
            futures::future::pending().await
        }
    }

    /// Tool that outlives any test.
    struct StuckTool;

    #[async_trait]
    impl Tool for StuckTool {
        fn name(&self) -> &str {
            "stuck"
        }

        fn description(&self) -> &str {
            "Never returns"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            Vec::new()
        }

        async fn execute(&self, _args: &ToolArgs) -> anyhow::Result<String> {
            futures::future::pending().await
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let tracker = FakeTracker::with_issues(vec![
            issue("OPS-1", "To Do", "High", "Ana", "2024-05-01"),
            issue("OPS-2", "To Do", "Low", "Ben", "2024-05-02"),
        ]);
        let limits = IssueLimits {
            default: 100,
            analysis: 200,
            search: 50,
        };
        Arc::new(jira_registry(Arc::new(tracker), limits).expect("registry"))
    }

    fn config() -> AgentConfig {
        AgentConfig {
            max_tool_iterations: 3,
            tool_timeout: Duration::from_secs(5),
            max_chat_history: 20,
            tool_output_limit: 8000,
            llm_timeout: Duration::from_secs(5),
        }
    }

    fn session(llm: Arc<dyn LlmClient>) -> ChatSession {
        ChatSession::new(llm, registry(), config())
    }

    fn roles(session: &ChatSession) -> Vec<TurnRole> {
        session
            .conversation()
            .history()
            .iter()
            .map(|t| t.role)
            .collect()
    }

    #[tokio::test]
    async fn direct_answer_needs_no_tools() {
        let llm = Arc::new(ScriptedLlm::new(&["Hello! How can I help?"]));
        let mut session = session(llm.clone());

        let reply = session.submit("Hello").await;

        assert_eq!(reply.text, "Hello! How can I help?");
        assert_eq!(reply.outcome, Outcome::Done);
        assert_eq!(reply.tool_rounds, 0);
        assert_eq!(session.state(), LoopState::Done);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn to_do_scenario_produces_four_turns() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"TOOL_CALL: get_issues_by_status(status="To Do")"#,
            "There are 2 To Do issues: OPS-1 and OPS-2.",
        ]));
        let mut session = session(llm.clone());

        let reply = session.submit("Show me all To Do issues").await;

        assert_eq!(reply.outcome, Outcome::Done);
        assert_eq!(reply.tool_rounds, 1);
        assert_eq!(reply.text, "There are 2 To Do issues: OPS-1 and OPS-2.");
        assert_eq!(
            roles(&session),
            vec![
                TurnRole::User,
                TurnRole::Assistant,
                TurnRole::Tool,
                TurnRole::Assistant
            ]
        );
        let tool_turn = &session.conversation().history()[2];
        assert!(tool_turn
            .content
            .starts_with("Tool result from get_issues_by_status: "));
        assert!(tool_turn.content.contains("OPS-2"));

        // second model call saw the tool result as the last message
        let seen = llm.seen.lock().expect("seen");
        let last = seen[1].last().expect("message");
        assert_eq!(last.content, tool_turn.content);
    }

    #[tokio::test]
    async fn tool_turns_follow_invocation_order() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "Checking both.\nTOOL_CALL: get_issue_details(issue_key=\"OPS-2\")\nTOOL_CALL: get_project_summary()\nTOOL_CALL: get_issue_details(issue_key=\"OPS-1\")",
            "Done.",
        ]));
        let mut session = session(llm);

        session.submit("Compare OPS-1 and OPS-2").await;

        let history = session.conversation().history();
        let tool_turns: Vec<&str> = history
            .iter()
            .filter(|t| t.role == TurnRole::Tool)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(tool_turns.len(), 3);
        assert!(tool_turns[0].starts_with("Tool result from get_issue_details: "));
        assert!(tool_turns[0].contains("\"OPS-2\""));
        assert!(tool_turns[1].starts_with("Tool result from get_project_summary: "));
        assert!(tool_turns[2].contains("\"OPS-1\""));
        // tool turns sit directly after the assistant turn that asked for them
        assert_eq!(history[1].role, TurnRole::Assistant);
        assert!(history[1].content.contains("get_project_summary()"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_and_loop_continues() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"TOOL_CALL: delete_everything(confirm="yes")"#,
            "I can't do that.",
        ]));
        let mut session = session(llm.clone());

        let reply = session.submit("Delete all issues").await;

        assert_eq!(reply.outcome, Outcome::Done);
        assert_eq!(reply.text, "I can't do that.");
        assert_eq!(
            session.conversation().history()[2].content,
            "Tool error from delete_everything: UnknownTool:delete_everything"
        );
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn iteration_cap_aborts_with_answer() {
        let llm = Arc::new(ScriptedLlm::always("TOOL_CALL: get_all_issues()"));
        let mut session = session(llm.clone());

        let reply = session.submit("Loop forever").await;

        assert_eq!(reply.outcome, Outcome::Aborted(AbortReason::IterationCap));
        assert_eq!(reply.tool_rounds, 3);
        assert!(!reply.text.is_empty());
        assert_eq!(llm.calls(), 3);
        assert_eq!(session.state(), LoopState::Aborted);
        let last = session.conversation().history().last().expect("turn");
        assert_eq!(last.role, TurnRole::Assistant);
        assert_eq!(last.content, reply.text);
    }

    #[tokio::test]
    async fn malformed_invocation_is_final_answer() {
        let raw = r#"TOOL_CALL: get_issue_details(issue_key="unterminated)"#;
        let llm = Arc::new(ScriptedLlm::new(&[raw]));
        let mut session = session(llm.clone());

        let reply = session.submit("Details please").await;

        assert_eq!(reply.outcome, Outcome::Done);
        assert_eq!(reply.text, raw);
        assert_eq!(reply.tool_rounds, 0);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn llm_failure_aborts_turn() {
        let llm = Arc::new(ScriptedLlm::default());
        let mut session = session(llm);

        let reply = session.submit("Anything").await;

        let Outcome::Aborted(AbortReason::LlmFailure(message)) = &reply.outcome else {
            panic!("expected LLM failure, got {:?}", reply.outcome);
        };
        assert!(message.contains("script exhausted"));
        assert!(reply.text.starts_with("I apologize"));
        assert_eq!(roles(&session), vec![TurnRole::User]);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let llm = Arc::new(ScriptedLlm::always("Sure."));
        let mut session = session(llm);
        session.submit("one").await;
        session.submit("two").await;
        assert_eq!(session.conversation().len(), 4);

        session.reset();
        let once: Vec<_> = session.conversation().iter().cloned().collect();
        session.reset();
        let twice: Vec<_> = session.conversation().iter().cloned().collect();

        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
        assert_eq!(once[0].role, TurnRole::System);
        assert_eq!(session.state(), LoopState::AwaitingUser);
    }

    #[tokio::test]
    async fn conversation_persists_between_messages() {
        let llm = Arc::new(ScriptedLlm::always("Noted."));
        let mut session = session(llm.clone());
        session.submit("first").await;
        session.submit("second").await;

        let seen = llm.seen.lock().expect("seen");
        let contents: Vec<&str> = seen[1].iter().skip(1).map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "Noted.", "second"]);
    }

    #[tokio::test]
    async fn cancellation_aborts_pending_llm_call() {
        let mut session = session(Arc::new(HangingLlm));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let reply = session.submit_with_cancel("Hello?", &cancel).await;

        assert_eq!(reply.outcome, Outcome::Aborted(AbortReason::Cancelled));
        assert_eq!(session.state(), LoopState::Aborted);
    }

    #[tokio::test]
    async fn cancellation_aborts_running_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(StuckTool).expect("register");
        let llm = Arc::new(ScriptedLlm::new(&["TOOL_CALL: stuck()"]));
        let mut session = ChatSession::new(
            llm.clone(),
            Arc::new(registry),
            AgentConfig {
                tool_timeout: Duration::from_secs(60),
                ..config()
            },
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let reply = session.submit_with_cancel("Run it", &cancel).await;

        assert_eq!(reply.outcome, Outcome::Aborted(AbortReason::Cancelled));
        assert_eq!(reply.tool_rounds, 0);
        assert_eq!(session.state(), LoopState::Aborted);
        assert_eq!(llm.calls(), 1);
        assert_eq!(roles(&session), vec![TurnRole::User, TurnRole::Assistant]);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let mut session = ChatSession::new(
            Arc::new(HangingLlm),
            registry(),
            AgentConfig {
                llm_timeout: Duration::from_millis(20),
                ..config()
            },
        );

        let reply = session.submit("Hello?").await;

        let Outcome::Aborted(AbortReason::LlmFailure(message)) = &reply.outcome else {
            panic!("expected LLM failure, got {:?}", reply.outcome);
        };
        assert!(message.contains("did not answer"));
        assert_eq!(session.state(), LoopState::Aborted);
    }

    #[tokio::test]
    async fn small_history_cap_keeps_tool_results_for_the_model() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "TOOL_CALL: get_issue_details(issue_key=\"OPS-1\")\nTOOL_CALL: get_issue_details(issue_key=\"OPS-2\")\nTOOL_CALL: get_project_summary()",
            "final",
        ]));
        let mut session = ChatSession::new(
            llm.clone(),
            registry(),
            AgentConfig {
                max_chat_history: 3,
                ..config()
            },
        );

        let reply = session.submit("Compare them").await;
        assert_eq!(reply.outcome, Outcome::Done);

        let seen = llm.seen.lock().expect("seen");
        let second: Vec<Role> = seen[1].iter().map(|m| m.role).collect();
        assert_eq!(
            second,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::User,
                Role::User
            ]
        );
        assert_eq!(seen[1][1].content, "Compare them");
        assert!(seen[1][5]
            .content
            .starts_with("Tool result from get_project_summary: "));
    }
}
