//! The typed event union consumed by downstream UIs.
//!
//! One JSON object per event with a `type` discriminator; this is both the
//! SSE `data:` line format and the RPC variant selector. Events are
//! immutable after emission and self-contained: no references to mutable
//! session state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{Message, ToolCall, ToolCallResult};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supporting types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identifies the agent an event originates from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_name: String,
}

impl AgentContext {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
        }
    }
}

impl From<&str> for AgentContext {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for AgentContext {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&String> for AgentContext {
    fn from(name: &String) -> Self {
        Self::new(name.as_str())
    }
}

/// Token accounting snapshot emitted after each stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub context_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStatus {
    Started,
    Completed,
}

/// Client answer to an elicitation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    Accept,
    Decline,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitationResponse {
    pub action: ElicitationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event union
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a session run, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    UserMessage {
        agent_context: AgentContext,
        session_id: String,
        content: String,
    },
    StreamStarted {
        agent_context: AgentContext,
        session_id: String,
    },
    StreamStopped {
        agent_context: AgentContext,
        session_id: String,
    },
    /// Incremental assistant content.
    AgentChoice {
        agent_context: AgentContext,
        session_id: String,
        content: String,
    },
    /// Incremental reasoning content.
    AgentChoiceReasoning {
        agent_context: AgentContext,
        session_id: String,
        content: String,
    },
    /// A tool call being assembled from stream fragments.
    PartialToolCall {
        agent_context: AgentContext,
        session_id: String,
        tool_call: ToolCall,
    },
    ToolCall {
        agent_context: AgentContext,
        session_id: String,
        tool_call: ToolCall,
    },
    /// The runtime is waiting on a resume decision for this call.
    ToolCallConfirmation {
        agent_context: AgentContext,
        session_id: String,
        tool_call: ToolCall,
    },
    ToolCallResponse {
        agent_context: AgentContext,
        session_id: String,
        tool_call: ToolCall,
        result: ToolCallResult,
    },
    HookBlocked {
        agent_context: AgentContext,
        session_id: String,
        tool_call: ToolCall,
        reason: String,
    },
    TokenUsage {
        agent_context: AgentContext,
        session_id: String,
        usage: TokenUsage,
    },
    SessionCompaction {
        agent_context: AgentContext,
        session_id: String,
        status: CompactionStatus,
    },
    SessionTitle {
        session_id: String,
        title: String,
    },
    SessionSummary {
        agent_context: AgentContext,
        session_id: String,
        summary: String,
    },
    MessageAdded {
        agent_context: AgentContext,
        session_id: String,
        message: Message,
    },
    SubSessionCompleted {
        agent_context: AgentContext,
        session_id: String,
        sub_session_id: String,
    },
    MaxIterationsReached {
        agent_context: AgentContext,
        session_id: String,
        iterations: usize,
    },
    Error {
        agent_context: AgentContext,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
    },
    Warning {
        agent_context: AgentContext,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
    },
    /// An authorization flow started or finished for an external server.
    Authorization {
        agent_context: AgentContext,
        server: String,
        message: String,
    },
    ElicitationRequest {
        agent_context: AgentContext,
        session_id: String,
        /// Correlates the eventual `resume_elicitation` call.
        request_id: String,
        message: String,
        schema: Value,
        #[serde(default)]
        meta: Value,
    },
    McpInitStarted {
        agent_context: AgentContext,
    },
    McpInitFinished {
        agent_context: AgentContext,
    },
    AgentInfo {
        agent_context: AgentContext,
        description: String,
    },
    TeamInfo {
        agent_context: AgentContext,
        agents: Vec<String>,
    },
    ToolsetInfo {
        agent_context: AgentContext,
        tools: Vec<String>,
    },
    AgentSwitching {
        agent_context: AgentContext,
        from: String,
        to: String,
    },
    ModelFallback {
        agent_context: AgentContext,
        from_model: String,
        to_model: String,
        reason: String,
        attempt: u32,
        max_attempts: u32,
    },
    RagIndexingStarted {
        agent_context: AgentContext,
        source: String,
    },
    RagIndexingProgress {
        agent_context: AgentContext,
        source: String,
        processed: u64,
        total: u64,
    },
    RagIndexingCompleted {
        agent_context: AgentContext,
        source: String,
    },
    /// Live output from a shell tool invocation.
    Shell {
        agent_context: AgentContext,
        session_id: String,
        output: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Factories
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Event {
    pub fn user_message(agent: impl Into<AgentContext>, session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Event::UserMessage {
            agent_context: agent.into(),
            session_id: session_id.into(),
            content: content.into(),
        }
    }

    pub fn stream_started(agent: impl Into<AgentContext>, session_id: impl Into<String>) -> Self {
        Event::StreamStarted {
            agent_context: agent.into(),
            session_id: session_id.into(),
        }
    }

    pub fn stream_stopped(agent: impl Into<AgentContext>, session_id: impl Into<String>) -> Self {
        Event::StreamStopped {
            agent_context: agent.into(),
            session_id: session_id.into(),
        }
    }

    pub fn agent_choice(agent: impl Into<AgentContext>, session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Event::AgentChoice {
            agent_context: agent.into(),
            session_id: session_id.into(),
            content: content.into(),
        }
    }

    pub fn agent_choice_reasoning(agent: impl Into<AgentContext>, session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Event::AgentChoiceReasoning {
            agent_context: agent.into(),
            session_id: session_id.into(),
            content: content.into(),
        }
    }

    pub fn partial_tool_call(agent: impl Into<AgentContext>, session_id: impl Into<String>, tool_call: ToolCall) -> Self {
        Event::PartialToolCall {
            agent_context: agent.into(),
            session_id: session_id.into(),
            tool_call,
        }
    }

    pub fn tool_call(agent: impl Into<AgentContext>, session_id: impl Into<String>, tool_call: ToolCall) -> Self {
        Event::ToolCall {
            agent_context: agent.into(),
            session_id: session_id.into(),
            tool_call,
        }
    }

    pub fn tool_call_confirmation(agent: impl Into<AgentContext>, session_id: impl Into<String>, tool_call: ToolCall) -> Self {
        Event::ToolCallConfirmation {
            agent_context: agent.into(),
            session_id: session_id.into(),
            tool_call,
        }
    }

    pub fn tool_call_response(
        agent: impl Into<AgentContext>,
        session_id: impl Into<String>,
        tool_call: ToolCall,
        result: ToolCallResult,
    ) -> Self {
        Event::ToolCallResponse {
            agent_context: agent.into(),
            session_id: session_id.into(),
            tool_call,
            result,
        }
    }

    pub fn hook_blocked(
        agent: impl Into<AgentContext>,
        session_id: impl Into<String>,
        tool_call: ToolCall,
        reason: impl Into<String>,
    ) -> Self {
        Event::HookBlocked {
            agent_context: agent.into(),
            session_id: session_id.into(),
            tool_call,
            reason: reason.into(),
        }
    }

    pub fn token_usage(agent: impl Into<AgentContext>, session_id: impl Into<String>, usage: TokenUsage) -> Self {
        Event::TokenUsage {
            agent_context: agent.into(),
            session_id: session_id.into(),
            usage,
        }
    }

    pub fn session_compaction(agent: impl Into<AgentContext>, session_id: impl Into<String>, status: CompactionStatus) -> Self {
        Event::SessionCompaction {
            agent_context: agent.into(),
            session_id: session_id.into(),
            status,
        }
    }

    pub fn session_title(session_id: impl Into<String>, title: impl Into<String>) -> Self {
        Event::SessionTitle {
            session_id: session_id.into(),
            title: title.into(),
        }
    }

    pub fn session_summary(agent: impl Into<AgentContext>, session_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Event::SessionSummary {
            agent_context: agent.into(),
            session_id: session_id.into(),
            summary: summary.into(),
        }
    }

    pub fn message_added(agent: impl Into<AgentContext>, session_id: impl Into<String>, message: Message) -> Self {
        Event::MessageAdded {
            agent_context: agent.into(),
            session_id: session_id.into(),
            message,
        }
    }

    pub fn sub_session_completed(
        agent: impl Into<AgentContext>,
        session_id: impl Into<String>,
        sub_session_id: impl Into<String>,
    ) -> Self {
        Event::SubSessionCompleted {
            agent_context: agent.into(),
            session_id: session_id.into(),
            sub_session_id: sub_session_id.into(),
        }
    }

    pub fn max_iterations_reached(agent: impl Into<AgentContext>, session_id: impl Into<String>, iterations: usize) -> Self {
        Event::MaxIterationsReached {
            agent_context: agent.into(),
            session_id: session_id.into(),
            iterations,
        }
    }

    pub fn error(agent: impl Into<AgentContext>, session_id: Option<String>, message: impl Into<String>) -> Self {
        Event::Error {
            agent_context: agent.into(),
            session_id,
            message: message.into(),
        }
    }

    pub fn warning(agent: impl Into<AgentContext>, session_id: Option<String>, message: impl Into<String>) -> Self {
        Event::Warning {
            agent_context: agent.into(),
            session_id,
            message: message.into(),
        }
    }

    pub fn authorization(agent: impl Into<AgentContext>, server: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Authorization {
            agent_context: agent.into(),
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn elicitation_request(
        agent: impl Into<AgentContext>,
        session_id: impl Into<String>,
        request_id: impl Into<String>,
        message: impl Into<String>,
        schema: Value,
        meta: Value,
    ) -> Self {
        Event::ElicitationRequest {
            agent_context: agent.into(),
            session_id: session_id.into(),
            request_id: request_id.into(),
            message: message.into(),
            schema,
            meta,
        }
    }

    pub fn mcp_init_started(agent: impl Into<AgentContext>) -> Self {
        Event::McpInitStarted {
            agent_context: agent.into(),
        }
    }

    pub fn mcp_init_finished(agent: impl Into<AgentContext>) -> Self {
        Event::McpInitFinished {
            agent_context: agent.into(),
        }
    }

    pub fn agent_info(agent: impl Into<AgentContext>, description: impl Into<String>) -> Self {
        Event::AgentInfo {
            agent_context: agent.into(),
            description: description.into(),
        }
    }

    pub fn team_info(agent: impl Into<AgentContext>, agents: Vec<String>) -> Self {
        Event::TeamInfo {
            agent_context: agent.into(),
            agents,
        }
    }

    pub fn toolset_info(agent: impl Into<AgentContext>, tools: Vec<String>) -> Self {
        Event::ToolsetInfo {
            agent_context: agent.into(),
            tools,
        }
    }

    pub fn agent_switching(agent: impl Into<AgentContext>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Event::AgentSwitching {
            agent_context: agent.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn model_fallback(
        agent: impl Into<AgentContext>,
        from_model: impl Into<String>,
        to_model: impl Into<String>,
        reason: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        Event::ModelFallback {
            agent_context: agent.into(),
            from_model: from_model.into(),
            to_model: to_model.into(),
            reason: reason.into(),
            attempt,
            max_attempts,
        }
    }

    pub fn shell(agent: impl Into<AgentContext>, session_id: impl Into<String>, output: impl Into<String>) -> Self {
        Event::Shell {
            agent_context: agent.into(),
            session_id: session_id.into(),
            output: output.into(),
        }
    }

    /// The `type` discriminator this event serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::StreamStarted { .. } => "stream_started",
            Event::StreamStopped { .. } => "stream_stopped",
            Event::AgentChoice { .. } => "agent_choice",
            Event::AgentChoiceReasoning { .. } => "agent_choice_reasoning",
            Event::PartialToolCall { .. } => "partial_tool_call",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolCallConfirmation { .. } => "tool_call_confirmation",
            Event::ToolCallResponse { .. } => "tool_call_response",
            Event::HookBlocked { .. } => "hook_blocked",
            Event::TokenUsage { .. } => "token_usage",
            Event::SessionCompaction { .. } => "session_compaction",
            Event::SessionTitle { .. } => "session_title",
            Event::SessionSummary { .. } => "session_summary",
            Event::MessageAdded { .. } => "message_added",
            Event::SubSessionCompleted { .. } => "sub_session_completed",
            Event::MaxIterationsReached { .. } => "max_iterations_reached",
            Event::Error { .. } => "error",
            Event::Warning { .. } => "warning",
            Event::Authorization { .. } => "authorization",
            Event::ElicitationRequest { .. } => "elicitation_request",
            Event::McpInitStarted { .. } => "mcp_init_started",
            Event::McpInitFinished { .. } => "mcp_init_finished",
            Event::AgentInfo { .. } => "agent_info",
            Event::TeamInfo { .. } => "team_info",
            Event::ToolsetInfo { .. } => "toolset_info",
            Event::AgentSwitching { .. } => "agent_switching",
            Event::ModelFallback { .. } => "model_fallback",
            Event::RagIndexingStarted { .. } => "rag_indexing_started",
            Event::RagIndexingProgress { .. } => "rag_indexing_progress",
            Event::RagIndexingCompleted { .. } => "rag_indexing_completed",
            Event::Shell { .. } => "shell",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ToolCall;

    #[test]
    fn type_tag_matches_kind() {
        let event = Event::agent_choice("root", "s1", "Hello");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["agent_context"]["agent_name"], "root");
        assert_eq!(json["content"], "Hello");
    }

    #[test]
    fn round_trip_all_core_variants() {
        let call = ToolCall::new("c1", "shell", "{}");
        let events = vec![
            Event::user_message("root", "s1", "Hi"),
            Event::stream_started("root", "s1"),
            Event::partial_tool_call("root", "s1", call.clone()),
            Event::tool_call("root", "s1", call.clone()),
            Event::tool_call_response("root", "s1", call.clone(), ToolCallResult::ok("done")),
            Event::hook_blocked("root", "s1", call, "policy"),
            Event::token_usage(
                "root",
                "s1",
                TokenUsage {
                    input_tokens: 3,
                    output_tokens: 2,
                    total_tokens: 5,
                    cost: 0.0,
                    context_limit: 0,
                },
            ),
            Event::session_compaction("root", "s1", CompactionStatus::Started),
            Event::session_title("s1", "Greetings"),
            Event::max_iterations_reached("root", "s1", 10),
            Event::model_fallback("root", "gpt-5", "claude", "status 429", 1, 3),
            Event::stream_stopped("root", "s1"),
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: Event = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn elicitation_response_wire_shape() {
        let resp = ElicitationResponse {
            action: ElicitationAction::Accept,
            content: Some(serde_json::json!({"access_token": "tok"})),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["action"], "accept");
        assert_eq!(json["content"]["access_token"], "tok");
    }
}
