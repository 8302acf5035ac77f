use std::collections::BTreeMap;
use std::path::Path;

use pgo_accel_core::config::{FunctionSettings, RuntimeKind};
use pgo_accel_core::{PgoError, Result};

use crate::adapters::command::CommandSpec;
use crate::adapters::function_compute::InvocationMode;
use crate::extract::ArchiveFormat;
use crate::runtimes::{base_env, user_handler, ArchiveSpec, HelperFile, RuntimeStrategy, USER_HANDLER_ENV};
use crate::staging::copy_project_tree;

const HELPER_SOURCE: &str = include_str!("../../shims/python/pgo_index.py");
const USER_BASE: &str = "/code/.s/python";

/// Code-data-share image traced while the user's modules import.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonStrategy;

impl RuntimeStrategy for PythonStrategy {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Python
    }

    fn name_base(&self) -> &'static str {
        "cds-dump"
    }

    fn helper_files(&self) -> Vec<HelperFile> {
        vec![HelperFile {
            relative_path: "pgo_index.py".into(),
            contents: HELPER_SOURCE,
        }]
    }

    fn build_commands(&self, project_root: &Path) -> Vec<CommandSpec> {
        vec![CommandSpec::new(
            "s",
            [
                "build".to_string(),
                "--use-docker".to_string(),
                "--command".to_string(),
                format!("PYTHONUSERBASE={USER_BASE} pip3 install --user --upgrade code-data-share"),
            ],
        )
        .in_dir(project_root)]
    }

    fn stage(&self, project_root: &Path, artifact_dir: &Path, staging_dir: &Path) -> Result<()> {
        copy_project_tree(project_root, artifact_dir, staging_dir)
            .map(|_| ())
            .map_err(|error| PgoError::Prepare(format!("failed to stage project: {error}")))
    }

    fn handler(&self) -> &'static str {
        "pgo_index.gen_handler"
    }

    fn warmup_env(&self, dump_dir: &str, function: &FunctionSettings) -> BTreeMap<String, String> {
        let mut env = base_env(dump_dir);
        env.insert("PYCDSMODE".to_string(), "TRACE".to_string());
        env.insert("PYCDSLIST".to_string(), "/tmp/cds.lst".to_string());
        env.insert("PYTHONUSERBASE".to_string(), USER_BASE.to_string());
        env.insert(USER_HANDLER_ENV.to_string(), user_handler(function));
        env
    }

    fn invocation_mode(&self) -> InvocationMode {
        InvocationMode::HttpTrigger
    }

    fn trigger_methods(&self) -> &'static [&'static str] {
        &["POST", "GET"]
    }

    fn archive(&self) -> ArchiveSpec {
        ArchiveSpec {
            file_name: "pycds.zip",
            format: ArchiveFormat::Zip,
            dump_method: "cds",
        }
    }
}
