//! Per-runtime knowledge plugged into the acceleration workflow.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pgo_accel_core::config::{FunctionSettings, RuntimeKind};
use pgo_accel_core::naming::remote_archive_path;
use pgo_accel_core::Result;

use crate::adapters::command::CommandSpec;
use crate::adapters::function_compute::InvocationMode;
use crate::extract::ArchiveFormat;

pub mod java;
pub mod node;
pub mod python;

pub use java::JavaStrategy;
pub use node::NodeStrategy;
pub use python::PythonStrategy;

/// Environment variable carrying the shared-data directory to the function.
pub const SRPATH_ENV: &str = "SRPATH";
/// Environment variable telling a shim which user handler it wraps.
pub const USER_HANDLER_ENV: &str = "PGO_USER_HANDLER";

/// A file written into the user's project before the build and removed at
/// cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperFile {
    pub relative_path: PathBuf,
    pub contents: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSpec {
    pub file_name: &'static str,
    pub format: ArchiveFormat,
    pub dump_method: &'static str,
}

impl ArchiveSpec {
    pub fn remote_path(&self) -> String {
        remote_archive_path(self.file_name)
    }
}

pub trait RuntimeStrategy: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    /// Prefix of every temporary resource name.
    fn name_base(&self) -> &'static str;

    fn helper_files(&self) -> Vec<HelperFile>;

    fn build_commands(&self, project_root: &Path) -> Vec<CommandSpec>;

    /// Fills `staging_dir` with the temporary function's code.
    fn stage(&self, project_root: &Path, artifact_dir: &Path, staging_dir: &Path) -> Result<()>;

    fn handler(&self) -> &'static str;

    /// Variables layered over the user's environment on the temporary function.
    fn warmup_env(&self, dump_dir: &str, function: &FunctionSettings) -> BTreeMap<String, String>;

    fn invocation_mode(&self) -> InvocationMode;

    /// HTTP methods of the trigger; unused for direct invocation.
    fn trigger_methods(&self) -> &'static [&'static str] {
        &[]
    }

    fn archive(&self) -> ArchiveSpec;

    /// Staging entries whose mode is forced in the code zip.
    fn permission_overrides(&self) -> BTreeMap<String, u32> {
        BTreeMap::new()
    }

    /// Copies build output into the artifact root; returns the entry count.
    fn merge(&self, _project_root: &Path, _artifact_dir: &Path) -> Result<usize> {
        Ok(0)
    }

    /// Build products of the injected helpers, removed at cleanup.
    fn compiled_helper_paths(&self, _project_root: &Path, _artifact_dir: &Path) -> Vec<PathBuf> {
        Vec::new()
    }
}

pub fn strategy_for(kind: RuntimeKind) -> Box<dyn RuntimeStrategy> {
    match kind {
        RuntimeKind::Java => Box::new(JavaStrategy),
        RuntimeKind::Node => Box::new(NodeStrategy),
        RuntimeKind::Python => Box::new(PythonStrategy),
    }
}

pub(crate) fn base_env(dump_dir: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(SRPATH_ENV.to_string(), dump_dir.to_string())])
}

pub(crate) fn user_handler(function: &FunctionSettings) -> String {
    function
        .handler
        .clone()
        .filter(|handler| !handler.trim().is_empty())
        .unwrap_or_else(|| "index.handler".to_string())
}
