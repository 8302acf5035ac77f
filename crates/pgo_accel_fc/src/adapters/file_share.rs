use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::command::{CommandRunner, CommandSpec};

/// Copies a file from the mounted network file share onto the local disk.
#[async_trait]
pub trait FileShare: Send + Sync {
    async fn download(&self, remote_path: &str, local_dir: &Path) -> Result<(), String>;

    /// Recursively removes `remote_path` from the share.
    async fn remove(&self, remote_path: &str) -> Result<(), String>;
}

/// Delegates to the deployment CLI's `nas download` subcommand, run from the
/// project root so it resolves the same service descriptor as the deploy.
pub struct CommandFileShare {
    runner: Arc<dyn CommandRunner>,
    project_root: PathBuf,
    program: String,
}

impl CommandFileShare {
    pub fn new(runner: Arc<dyn CommandRunner>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            project_root: project_root.into(),
            program: "s".to_string(),
        }
    }

    pub fn download_command(&self, remote_path: &str, local_dir: &Path) -> CommandSpec {
        CommandSpec::new(
            self.program.clone(),
            [
                "nas".to_string(),
                "download".to_string(),
                remote_path.to_string(),
                local_dir.display().to_string(),
            ],
        )
        .in_dir(self.project_root.clone())
    }

    pub fn remove_command(&self, remote_path: &str) -> CommandSpec {
        CommandSpec::new(
            self.program.clone(),
            [
                "nas".to_string(),
                "command".to_string(),
                "rm".to_string(),
                "-rf".to_string(),
                remote_path.to_string(),
            ],
        )
        .in_dir(self.project_root.clone())
    }
}

#[async_trait]
impl FileShare for CommandFileShare {
    async fn download(&self, remote_path: &str, local_dir: &Path) -> Result<(), String> {
        self.runner
            .run(&self.download_command(remote_path, local_dir))
            .await
            .map(|_| ())
    }

    async fn remove(&self, remote_path: &str) -> Result<(), String> {
        self.runner
            .run(&self.remove_command(remote_path))
            .await
            .map(|_| ())
    }
}
