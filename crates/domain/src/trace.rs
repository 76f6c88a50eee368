//! Structured trace events emitted across all ensemble crates.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStart {
        session_id: String,
        agent: String,
    },
    SessionEnd {
        session_id: String,
        agent: String,
        iterations: usize,
    },
    ModelRequest {
        agent: String,
        model: String,
        attempt: u32,
        duration_ms: u64,
    },
    ModelFallback {
        agent: String,
        from_model: String,
        to_model: String,
        reason: String,
    },
    CooldownPinned {
        agent: String,
        fallback_index: usize,
        expires_in_ms: u64,
    },
    ToolDispatched {
        agent: String,
        tool: String,
        duration_ms: u64,
        is_error: bool,
    },
    SessionCompacted {
        session_id: String,
        summary_chars: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ens_event");
    }
}
