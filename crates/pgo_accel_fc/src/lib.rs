//! Function-compute side of startup acceleration runs.
//!
//! This crate owns the temporary resource lifecycle, code packaging, archive
//! transfer and the workflow that drives them, plus concrete adapters for the
//! platform REST API, object storage, the file-share CLI and child processes.
//! Pure configuration and protocol types live in `pgo_accel_core`.

pub mod adapters;
pub mod extract;
pub mod packager;
pub mod resources;
pub mod runtimes;
pub mod staging;
pub mod transfer;
pub mod workflow;

pub use workflow::{AccelerationWorkflow, Collaborators, Phase, RunReport};
