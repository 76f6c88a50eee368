//! The toolset contract.

use tokio_util::sync::CancellationToken;

use ens_domain::chat::{ToolCall, ToolCallResult};
use ens_domain::error::Result;
use ens_domain::tool::Tool;

use crate::elicit::ElicitationSender;

/// Per-invocation context handed to tool handlers.
///
/// Handlers must honor the cancellation token; long-running handlers that
/// need user-supplied information mid-call raise it through `elicit`.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub cancel: CancellationToken,
    pub elicit: Option<ElicitationSender>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            elicit: None,
        }
    }

    pub fn with_elicitation(mut self, elicit: ElicitationSender) -> Self {
        self.elicit = Some(elicit);
        self
    }
}

/// A named collection of tools sharing a lifecycle.
///
/// `start`/`stop` manage live resources (spawned processes, network
/// sessions); the team lifecycle invokes them, not the runtime loop.
#[async_trait::async_trait]
pub trait Toolset: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Tools currently exposed by this set.
    async fn tools(&self) -> Result<Vec<Tool>>;

    /// Execute one call. Implementations return an error only for
    /// infrastructure failures; tool-level failures are expressed as an
    /// error [`ToolCallResult`].
    async fn call(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolCallResult>;
}
