use std::collections::BTreeMap;
use std::path::Path;

use pgo_accel_core::config::{FunctionSettings, RuntimeKind};
use pgo_accel_core::{PgoError, Result};

use crate::adapters::command::CommandSpec;
use crate::adapters::function_compute::InvocationMode;
use crate::extract::ArchiveFormat;
use crate::runtimes::{base_env, user_handler, ArchiveSpec, HelperFile, RuntimeStrategy, USER_HANDLER_ENV};
use crate::staging::copy_project_tree;

const HELPER_SOURCE: &str = include_str!("../../shims/node/pgo_helper.js");

/// Require-cache snapshot recorded while the user's module graph loads.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeStrategy;

impl RuntimeStrategy for NodeStrategy {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Node
    }

    fn name_base(&self) -> &'static str {
        "require-cache"
    }

    fn helper_files(&self) -> Vec<HelperFile> {
        vec![HelperFile {
            relative_path: "pgo_helper.js".into(),
            contents: HELPER_SOURCE,
        }]
    }

    fn build_commands(&self, _project_root: &Path) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn stage(&self, project_root: &Path, artifact_dir: &Path, staging_dir: &Path) -> Result<()> {
        copy_project_tree(project_root, artifact_dir, staging_dir)
            .map(|_| ())
            .map_err(|error| PgoError::Prepare(format!("failed to stage project: {error}")))
    }

    fn handler(&self) -> &'static str {
        "pgo_helper.handler"
    }

    fn warmup_env(&self, dump_dir: &str, function: &FunctionSettings) -> BTreeMap<String, String> {
        let mut env = base_env(dump_dir);
        env.insert("PGO_RECORD".to_string(), "true".to_string());
        env.insert("NODE_ENV".to_string(), "development".to_string());
        env.insert(USER_HANDLER_ENV.to_string(), user_handler(function));
        env
    }

    fn invocation_mode(&self) -> InvocationMode {
        InvocationMode::Direct
    }

    fn archive(&self) -> ArchiveSpec {
        ArchiveSpec {
            file_name: "require_cache.strrc",
            format: ArchiveFormat::Raw,
            dump_method: "rrc",
        }
    }
}
