//! Platform-independent primitives for startup acceleration runs.
//!
//! This crate owns run configuration and its validation, the remote action
//! protocol, chunk planning for streamed downloads, and temporary resource
//! naming. It intentionally excludes function-compute, object storage and
//! filesystem side effects, which live in `pgo_accel_fc`.

pub mod chunking;
pub mod config;
pub mod error;
pub mod naming;
pub mod protocol;

pub use error::{PgoError, Result};
