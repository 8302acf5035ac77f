use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pgo_accel_core::config::TransportMethod;
use pgo_accel_core::protocol::RelayTarget;
use pgo_accel_core::{PgoError, Result};
use tracing::{info, warn};

use crate::adapters::object_store::ObjectStore;
use crate::transfer::{ArchiveDownloader, TransferContext};

/// The remote side uploads the archive into a per-run bucket; the bucket is
/// emptied and removed once the archive is local.
pub struct ObjectStorageDownloader {
    store: Arc<dyn ObjectStore>,
    relay: RelayTarget,
    bucket: String,
    bucket_removed: AtomicBool,
}

impl ObjectStorageDownloader {
    pub fn new(store: Arc<dyn ObjectStore>, relay: RelayTarget) -> Self {
        let bucket = match &relay {
            RelayTarget::ObjectStorage { bucket, .. } => bucket.clone(),
            _ => String::new(),
        };
        Self {
            store,
            relay,
            bucket,
            bucket_removed: AtomicBool::new(false),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ArchiveDownloader for ObjectStorageDownloader {
    fn method(&self) -> TransportMethod {
        TransportMethod::Oss
    }

    fn relay(&self) -> RelayTarget {
        self.relay.clone()
    }

    async fn download(&self, ctx: &TransferContext<'_>) -> Result<u64> {
        let bucket = self.bucket.as_str();
        let key = ctx.archive_name;
        let bytes = self
            .store
            .get_object(bucket, key, ctx.local_path)
            .await
            .map_err(PgoError::Transfer)?;
        info!(component = "transfer", event = "object_downloaded", bucket, key, archive_bytes = bytes);

        self.store
            .delete_object(bucket, key)
            .await
            .map_err(PgoError::Transfer)?;
        let remaining = self.store.list_keys(bucket).await.map_err(PgoError::Transfer)?;
        if !remaining.is_empty() {
            return Err(PgoError::Transfer(format!(
                "bucket {bucket} is not empty after download: {}",
                remaining.join(", ")
            )));
        }
        self.store
            .delete_bucket(bucket)
            .await
            .map_err(PgoError::Transfer)?;
        self.bucket_removed.store(true, Ordering::SeqCst);
        info!(component = "transfer", event = "relay_bucket_deleted", bucket);
        Ok(bytes)
    }

    async fn discard(&self) {
        if self.bucket_removed.load(Ordering::SeqCst) {
            return;
        }
        let bucket = self.bucket.as_str();
        let keys = match self.store.list_keys(bucket).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(component = "transfer", event = "relay_bucket_unlisted", bucket, error = %error);
                return;
            }
        };
        for key in &keys {
            if let Err(error) = self.store.delete_object(bucket, key).await {
                warn!(component = "transfer", event = "relay_object_left", bucket, key = %key, error = %error);
            }
        }
        match self.store.delete_bucket(bucket).await {
            Ok(()) => {
                self.bucket_removed.store(true, Ordering::SeqCst);
                info!(component = "transfer", event = "relay_bucket_deleted", bucket);
            }
            Err(error) => warn!(component = "transfer", event = "relay_bucket_left", bucket, error = %error),
        }
    }
}
