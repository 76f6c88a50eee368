//! The per-session agent execution engine.
//!
//! [`Runtime`] drives one conversation: it streams model output through
//! the fallback controller, decodes deltas into typed events, mediates
//! tool calls (permissions, approval, hooks), compacts the context when
//! it approaches the model's limit, and finalizes with an optional title
//! run. Callers consume the event channel returned by
//! [`Runtime::run_stream`].

pub mod bus;
pub mod decode;
pub mod executor;
pub mod hooks;
pub mod resume;
pub mod runtime;
pub mod summarize;
pub mod transfer;

pub use bus::EventBus;
pub use decode::{decode_stream, StreamOutcome};
pub use resume::{ResumeDecision, ResumeSignal};
pub use runtime::{RunOptions, Runtime, SessionRuntime};
