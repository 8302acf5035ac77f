//! Moving the acceleration archive from the temporary function to disk.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use pgo_accel_core::config::{RunConfig, TransportMethod};
use pgo_accel_core::naming::{nas_file_path, TempNames};
use pgo_accel_core::protocol::RelayTarget;
use pgo_accel_core::{PgoError, Result};

use crate::adapters::file_share::FileShare;
use crate::adapters::function_compute::{FunctionCompute, InvocationMode};
use crate::adapters::object_store::ObjectStore;

pub mod nas;
pub mod oss;
pub mod stream;

pub use nas::FileShareDownloader;
pub use oss::ObjectStorageDownloader;
pub use stream::ChunkedRpcDownloader;

/// Where the archive lives remotely and where it must end up locally.
pub struct TransferContext<'a> {
    pub client: &'a dyn FunctionCompute,
    pub service: &'a str,
    pub function: &'a str,
    pub mode: InvocationMode,
    pub remote_archive: &'a str,
    pub archive_name: &'a str,
    pub local_path: &'a Path,
}

impl TransferContext<'_> {
    /// One action round trip; any platform failure is a transfer failure.
    pub async fn call(&self, body: &str) -> Result<String> {
        self.client
            .call_action(self.service, self.function, self.mode, body)
            .await
            .map_err(|message| PgoError::Transfer(format!("action call failed: {message}")))
    }
}

#[async_trait]
pub trait ArchiveDownloader: Send + Sync {
    fn method(&self) -> TransportMethod;

    /// Extras the dump request must carry for this downloader.
    fn relay(&self) -> RelayTarget;

    /// Writes the archive to `ctx.local_path` and returns its size.
    async fn download(&self, ctx: &TransferContext<'_>) -> Result<u64>;

    /// Best-effort removal of relay leftovers after an incomplete transfer.
    async fn discard(&self) {}
}

/// Builds the downloader selected in `config`.
pub fn downloader_for(
    config: &RunConfig,
    names: &TempNames,
    archive_name: &str,
    object_store: Arc<dyn ObjectStore>,
    file_share: Arc<dyn FileShare>,
) -> Result<Box<dyn ArchiveDownloader>> {
    Ok(match config.transport.downloader {
        TransportMethod::Stream => Box::new(ChunkedRpcDownloader::new(config.chunk_size)),
        TransportMethod::Oss => Box::new(ObjectStorageDownloader::new(
            object_store,
            RelayTarget::ObjectStorage {
                access_key_id: config.credentials.access_key_id.clone(),
                access_key_secret: config.credentials.access_key_secret.clone(),
                endpoint: config.oss.resolved_endpoint(&config.region),
                bucket: names.bucket.clone(),
            },
        )),
        TransportMethod::Nas => {
            let mount_dir = config
                .service
                .nas_config
                .as_ref()
                .ok_or_else(|| {
                    PgoError::Config("nasConfig is required when nas transport is used".to_string())
                })?
                .mount_dir()?;
            Box::new(FileShareDownloader::new(
                file_share,
                nas_file_path(&mount_dir, &names.token, archive_name),
            ))
        }
    })
}
