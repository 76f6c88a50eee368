//! In-memory toolset over registered async closures.
//!
//! The simplest way to expose application functions as agent tools; also
//! the workhorse for tests and command-template tools.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use ens_domain::chat::{ToolCall, ToolCallResult};
use ens_domain::error::{Error, Result};
use ens_domain::tool::Tool;

use crate::toolset::{ToolContext, Toolset};

type Handler =
    Arc<dyn Fn(ToolContext, serde_json::Value) -> BoxFuture<'static, Result<ToolCallResult>> + Send + Sync>;

pub struct FunctionToolset {
    name: String,
    entries: Vec<(Tool, Handler)>,
}

impl FunctionToolset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Register a tool backed by an async closure.
    pub fn register<F, Fut>(mut self, tool: Tool, handler: F) -> Self
    where
        F: Fn(ToolContext, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolCallResult>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx, args| Box::pin(handler(ctx, args)));
        self.entries.push((tool, handler));
        self
    }
}

#[async_trait::async_trait]
impl Toolset for FunctionToolset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tools(&self) -> Result<Vec<Tool>> {
        Ok(self.entries.iter().map(|(tool, _)| tool.clone()).collect())
    }

    async fn call(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolCallResult> {
        let Some((_, handler)) = self
            .entries
            .iter()
            .find(|(tool, _)| tool.name == call.function.name)
        else {
            return Err(Error::Tool(
                call.function.name.clone(),
                "not registered in this toolset".into(),
            ));
        };

        let args: serde_json::Value = if call.function.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                tracing::warn!(
                    tool = %call.function.name,
                    error = %e,
                    "tool arguments are not valid JSON; passing empty object"
                );
                serde_json::Value::Object(Default::default())
            })
        };

        handler(ctx.clone(), args).await
    }
}
