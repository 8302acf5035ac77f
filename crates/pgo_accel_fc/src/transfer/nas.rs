use std::sync::Arc;

use async_trait::async_trait;
use pgo_accel_core::config::TransportMethod;
use pgo_accel_core::protocol::RelayTarget;
use pgo_accel_core::{PgoError, Result};
use tracing::{info, warn};

use crate::adapters::file_share::FileShare;
use crate::transfer::{ArchiveDownloader, TransferContext};

/// The remote side copies the archive onto the mounted share; it is pulled
/// down with the file-share copy command. The per-run directory holding the
/// relay copy is removed from the share afterwards.
pub struct FileShareDownloader {
    share: Arc<dyn FileShare>,
    nas_file_path: String,
}

impl FileShareDownloader {
    pub fn new(share: Arc<dyn FileShare>, nas_file_path: impl Into<String>) -> Self {
        Self {
            share,
            nas_file_path: nas_file_path.into(),
        }
    }

    /// Per-run directory on the share that holds the relay copy.
    pub fn run_dir(&self) -> &str {
        match self.nas_file_path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir,
            _ => self.nas_file_path.as_str(),
        }
    }

    async fn release(&self) {
        let run_dir = self.run_dir();
        match self.share.remove(run_dir).await {
            Ok(()) => info!(component = "transfer", event = "nas_relay_removed", remote = %run_dir),
            Err(error) => {
                warn!(component = "transfer", event = "nas_relay_left", remote = %run_dir, error = %error)
            }
        }
    }
}

#[async_trait]
impl ArchiveDownloader for FileShareDownloader {
    fn method(&self) -> TransportMethod {
        TransportMethod::Nas
    }

    fn relay(&self) -> RelayTarget {
        RelayTarget::FileShare {
            nas_file_path: self.nas_file_path.clone(),
        }
    }

    async fn download(&self, ctx: &TransferContext<'_>) -> Result<u64> {
        let remote = self.nas_file_path.as_str();
        let local = ctx.local_path;
        if tokio::fs::try_exists(local).await.unwrap_or(false) {
            tokio::fs::remove_file(local).await.map_err(|error| {
                PgoError::Transfer(format!("failed to remove stale {}: {error}", local.display()))
            })?;
        }

        let local_dir = local.parent().ok_or_else(|| {
            PgoError::Transfer(format!("{} has no parent directory", local.display()))
        })?;
        self.share
            .download(remote, local_dir)
            .await
            .map_err(|error| PgoError::Transfer(format!("nas download failed: {error}")))?;

        let metadata = tokio::fs::metadata(local).await.map_err(|_| {
            PgoError::Transfer(format!(
                "{} does not exist after downloading {remote}",
                local.display()
            ))
        })?;
        info!(component = "transfer", event = "nas_file_downloaded", remote = %remote, archive_bytes = metadata.len());
        self.release().await;
        Ok(metadata.len())
    }

    async fn discard(&self) {
        self.release().await;
    }
}
