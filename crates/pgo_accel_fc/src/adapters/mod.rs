//! Seams to the outside world. Workflow code depends only on the traits here;
//! the concrete clients are wired up by the `pgo` binary.

pub mod command;
pub mod fc_http;
pub mod file_share;
pub mod function_compute;
pub mod object_store;
pub mod tool_fetch;
