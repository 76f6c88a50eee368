//! Session state for the ensemble runtime.
//!
//! A session is the aggregate root of one conversation: an ordered item
//! sequence (messages, summaries, sub-sessions), token and cost counters,
//! and per-session toggles. [`SessionHandle`] is the facade the runtime
//! mutates; every durable change is written through to the store.

pub mod session;
pub mod store;

pub use session::{Item, Session, SessionHandle};
pub use store::{JsonSessionStore, NullSessionStore, SessionStore};
