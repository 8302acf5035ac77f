use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pgo_accel_core::config::{FunctionSettings, RuntimeKind};
use pgo_accel_core::naming::BUILD_OUTPUT_DIR;
use pgo_accel_core::{PgoError, Result};

use crate::adapters::command::CommandSpec;
use crate::adapters::function_compute::InvocationMode;
use crate::extract::ArchiveFormat;
use crate::packager::EXECUTABLE_MODE;
use crate::runtimes::{base_env, ArchiveSpec, HelperFile, RuntimeStrategy};
use crate::staging::{copy_build_output, write_file};

const HELPER_SOURCE: &str = include_str!("../../shims/java/AccelerationHelper.java");
const QUICKSTART_SCRIPT: &str = include_str!("../../shims/java/quickstart.sh");
const CLASSLOADER_CONFIG: &str = include_str!("../../shims/java/classloader-config.xml");

const QUICKSTART_ENTRY: &str = "quickstart.sh";
const CLASSLOADER_CONFIG_ENTRY: &str = "sr/classloader-config.xml";
const HELPER_CLASS: &str = "AccelerationHelper.class";

/// Quickstart trace dump of a JVM warmed up by the user's initializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaStrategy;

impl JavaStrategy {
    /// Build output plus the bootstrap wrapper and classloader config.
    fn copy_function_tree(project_root: &Path, artifact_dir: &Path, dest: &Path) -> std::io::Result<usize> {
        let copied = copy_build_output(project_root, artifact_dir, dest)?;
        write_file(&dest.join(QUICKSTART_ENTRY), QUICKSTART_SCRIPT.as_bytes())?;
        write_file(&dest.join(CLASSLOADER_CONFIG_ENTRY), CLASSLOADER_CONFIG.as_bytes())?;
        Ok(copied + 2)
    }
}

impl RuntimeStrategy for JavaStrategy {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Java
    }

    fn name_base(&self) -> &'static str {
        "trace-dump"
    }

    fn helper_files(&self) -> Vec<HelperFile> {
        vec![HelperFile {
            relative_path: ["src", "main", "java", "AccelerationHelper.java"].iter().collect(),
            contents: HELPER_SOURCE,
        }]
    }

    fn build_commands(&self, project_root: &Path) -> Vec<CommandSpec> {
        let lib_dir = project_root.join(BUILD_OUTPUT_DIR).join("lib");
        vec![
            CommandSpec::new("mvn", ["clean", "compile", "-Dmaven.test.skip=true"])
                .in_dir(project_root),
            CommandSpec::new(
                "mvn",
                [
                    format!("-DoutputDirectory={}", lib_dir.display()),
                    "dependency:copy-dependencies".to_string(),
                ],
            )
            .in_dir(project_root),
        ]
    }

    fn stage(&self, project_root: &Path, artifact_dir: &Path, staging_dir: &Path) -> Result<()> {
        Self::copy_function_tree(project_root, artifact_dir, staging_dir)
            .map(|_| ())
            .map_err(|error| PgoError::Prepare(format!("failed to stage build output: {error}")))
    }

    fn handler(&self) -> &'static str {
        "AccelerationHelper::handleRequest"
    }

    fn warmup_env(&self, dump_dir: &str, _function: &FunctionSettings) -> BTreeMap<String, String> {
        let mut env = base_env(dump_dir);
        env.insert("DISABLE_JAVA11_QUICKSTART".to_string(), "true".to_string());
        env.insert(
            "BOOTSTRAP_WRAPPER".to_string(),
            format!("/code/{QUICKSTART_ENTRY}"),
        );
        env
    }

    fn invocation_mode(&self) -> InvocationMode {
        InvocationMode::HttpTrigger
    }

    fn trigger_methods(&self) -> &'static [&'static str] {
        &["POST"]
    }

    fn archive(&self) -> ArchiveSpec {
        ArchiveSpec {
            file_name: "srctl.tar.gz",
            format: ArchiveFormat::TarGz,
            dump_method: "jcmd",
        }
    }

    fn permission_overrides(&self) -> BTreeMap<String, u32> {
        BTreeMap::from([(QUICKSTART_ENTRY.to_string(), EXECUTABLE_MODE)])
    }

    fn merge(&self, project_root: &Path, artifact_dir: &Path) -> Result<usize> {
        Self::copy_function_tree(project_root, artifact_dir, artifact_dir)
            .map_err(|error| PgoError::Merge(format!("failed to merge build output: {error}")))
    }

    fn compiled_helper_paths(&self, project_root: &Path, artifact_dir: &Path) -> Vec<PathBuf> {
        vec![
            artifact_dir.join(HELPER_CLASS),
            project_root.join(BUILD_OUTPUT_DIR).join("classes").join(HELPER_CLASS),
        ]
    }
}
