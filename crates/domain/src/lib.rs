//! Shared domain types for the ensemble runtime.
//!
//! Everything that crosses a crate boundary lives here: conversation
//! messages and tool calls, provider stream deltas, the typed event union
//! consumed by UIs, permission and agent configuration, and the shared
//! error type.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod stream;
pub mod tool;
pub mod trace;

pub use chat::{ContentPart, FunctionCall, ImageDetail, Message, MessageContent, Role, ToolCall, ToolCallResult};
pub use config::{AgentDefinition, CommandSpec, HookCommand, Hooks, PermissionDecision, Permissions, RetryConfig};
pub use error::{Error, Result};
pub use event::{AgentContext, ElicitationAction, ElicitationResponse, Event, TokenUsage};
pub use stream::{BoxStream, DeltaBody, FinishReason, StreamChoice, StreamDelta, ToolCallFragment, Usage};
pub use tool::{Tool, ToolAnnotations};
