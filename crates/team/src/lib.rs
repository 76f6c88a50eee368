//! Agents and teams.
//!
//! An [`Agent`] binds an instruction to a provider chain, toolsets,
//! commands, hooks, and handoff targets. A [`Team`] is the name→agent map
//! with a shared toolset lifecycle.

pub mod agent;
pub mod team;

pub use agent::Agent;
pub use team::Team;
