//! Model provider abstraction and the fallback controller.
//!
//! Providers expose a single capability: open a chat-completion stream.
//! The [`FallbackController`] wraps a chain of providers with retry,
//! backoff, and a per-agent cooldown state machine.

pub mod catalog;
pub mod classify;
pub mod fallback;
pub mod mock;
pub mod traits;

pub use catalog::{CostPerMillion, InMemoryCatalog, ModelCatalog, ModelInfo};
pub use classify::{classify, Disposition};
pub use fallback::{ChainEntry, FallbackController, FallbackOptions};
pub use mock::{MockProvider, ScriptedResponse};
pub use traits::{ChatStreamRequest, DeltaStream, Provider};
