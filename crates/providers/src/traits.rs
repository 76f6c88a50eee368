use ens_domain::chat::Message;
use ens_domain::error::Result;
use ens_domain::stream::{BoxStream, StreamDelta};
use ens_domain::tool::Tool;

/// A chat-completion stream: a lazy, finite sequence of deltas
/// terminating with a finish reason.
pub type DeltaStream = BoxStream<'static, Result<StreamDelta>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic streaming chat request.
///
/// The same request value is replayed against every entry of a fallback
/// chain, so session-level overrides (thinking, token caps) apply
/// uniformly regardless of which model ends up serving it.
#[derive(Debug, Clone, Default)]
pub struct ChatStreamRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    /// Session-level extended-thinking toggle.
    pub thinking: bool,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// When `false`, structured-output constraints are stripped from the
    /// request (used by the one-shot summarize/title runs).
    pub structured_output: bool,
}

impl ChatStreamRequest {
    pub fn new(messages: Vec<Message>, tools: Vec<Tool>) -> Self {
        Self {
            messages,
            tools,
            thinking: false,
            max_tokens: None,
            structured_output: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait implemented by every model adapter.
///
/// Adapters translate between the internal message/tool types and each
/// provider's wire format; the runtime only sees deltas.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier (usually the model id, e.g. `"gpt-5"`).
    fn id(&self) -> &str;

    /// Open a streaming chat completion.
    async fn create_chat_completion_stream(&self, req: ChatStreamRequest) -> Result<DeltaStream>;
}
