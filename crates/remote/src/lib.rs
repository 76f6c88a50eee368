//! Remote runtime shim.
//!
//! Speaks the same event contract as the local runtime against a remote
//! server: session messages go up, an SSE stream of typed events comes
//! back and republishes on a local channel. Elicitation requests naming
//! an OAuth server trigger the interactive browser flow.

pub mod client;
pub mod oauth;
pub(crate) mod sse;

pub use client::RemoteRuntime;
