//! Toolsets for the ensemble runtime.
//!
//! A toolset owns live resources (processes, network clients) and exposes
//! a set of callable tools. The runtime intersects the model's requested
//! tool name with the union of the agent's toolsets and dispatches here.

pub mod elicit;
pub mod function;
pub mod shell;
pub mod toolset;

pub use elicit::{ElicitationCoordinator, ElicitationSender};
pub use function::FunctionToolset;
pub use shell::ShellToolset;
pub use toolset::{ToolContext, Toolset};
