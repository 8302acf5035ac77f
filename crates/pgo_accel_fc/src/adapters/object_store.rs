use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client as S3Client;
use pgo_accel_core::config::Credentials as AccessKeys;
use tokio::io::AsyncWriteExt;

/// Bucket operations needed to collect and dispose of a relayed archive.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams the object into `dest`, returning the number of bytes written.
    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, String>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), String>;

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, String>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), String>;
}

/// Object storage reached through its S3-compatible API.
pub struct OssObjectStore {
    client: S3Client,
}

impl OssObjectStore {
    pub async fn new(keys: &AccessKeys, region: &str, endpoint: &str) -> Self {
        let credentials = Credentials::new(
            &keys.access_key_id,
            &keys.access_key_secret,
            None,
            None,
            "pgo-accel",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint_url(endpoint))
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(false)
            .build();
        Self {
            client: S3Client::from_conf(s3_config),
        }
    }
}

/// The relay endpoint handed to the remote side is region-internal; the local
/// machine goes through the public one.
pub fn public_endpoint(endpoint: &str) -> String {
    endpoint.replacen("-internal.", ".", 1)
}

fn endpoint_url(endpoint: &str) -> String {
    let endpoint = public_endpoint(endpoint.trim());
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint
    } else {
        format!("https://{endpoint}")
    }
}

#[async_trait]
impl ObjectStore for OssObjectStore {
    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, String> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| format!("failed to get oss://{bucket}/{key}: {error}"))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|error| format!("failed to create {}: {error}", dest.display()))?;
        let mut body = output.body;
        let mut written = 0u64;
        while let Some(bytes) = body
            .try_next()
            .await
            .map_err(|error| format!("failed to read oss://{bucket}/{key}: {error}"))?
        {
            file.write_all(&bytes)
                .await
                .map_err(|error| format!("failed to write {}: {error}", dest.display()))?;
            written += bytes.len() as u64;
        }
        file.flush()
            .await
            .map_err(|error| format!("failed to flush {}: {error}", dest.display()))?;
        Ok(written)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| format!("failed to delete oss://{bucket}/{key}: {error}"))
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, String> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .send()
            .await
            .map_err(|error| format!("failed to list oss://{bucket}: {error}"))?;
        Ok(output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), String> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| format!("failed to delete bucket {bucket}: {error}"))
    }
}
