//! Slash-command resolution.
//!
//! Expands an agent's command templates: `${…}` JavaScript expressions
//! first (with `args` and the agent's tools in scope), then `!tool(…)`
//! invocations, then positional-argument append. Failures degrade to
//! literal text; resolution never errors out of the conversation.

mod invoke;
mod jseval;
mod resolver;

pub use resolver::{resolve_command, tokenize, ToolDispatcher};
