//! `am-tools` — the Tool Executor (§4.11): a closed set of tools run
//! against a per-universe working directory, dispatched through a
//! tagged-variant `ToolKind` rather than a string-keyed table.

pub mod exec;
pub mod executor;
pub mod file_ops;
pub mod kind;
pub mod path;
pub mod task;

pub use executor::{tool_definitions_for_role, ToolExecutor};
pub use kind::ToolKind;
