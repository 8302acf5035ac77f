use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pgo_accel_core::chunking::plan_chunks;
use pgo_accel_core::config::TransportMethod;
use pgo_accel_core::protocol::{parse_size_response, read_request, size_request, RelayTarget};
use pgo_accel_core::{PgoError, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::transfer::{ArchiveDownloader, TransferContext};

/// Reads the archive back through the action endpoint, one base64 slice per
/// call.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedRpcDownloader {
    chunk_size: u64,
}

impl ChunkedRpcDownloader {
    pub fn new(chunk_size: u64) -> Self {
        Self { chunk_size }
    }
}

#[async_trait]
impl ArchiveDownloader for ChunkedRpcDownloader {
    fn method(&self) -> TransportMethod {
        TransportMethod::Stream
    }

    fn relay(&self) -> RelayTarget {
        RelayTarget::Inline
    }

    async fn download(&self, ctx: &TransferContext<'_>) -> Result<u64> {
        let size_body = size_request(ctx.remote_archive).encode()?;
        let total = parse_size_response(&ctx.call(&size_body).await?)?;
        let chunks = plan_chunks(total, self.chunk_size)?;
        info!(
            component = "transfer",
            event = "stream_started",
            archive_bytes = total,
            chunks = chunks.read_count()
        );

        let mut file = tokio::fs::File::create(ctx.local_path).await.map_err(|error| {
            PgoError::Transfer(format!("failed to create {}: {error}", ctx.local_path.display()))
        })?;
        let mut received = 0u64;
        for chunk in chunks {
            let body = read_request(ctx.remote_archive, chunk).encode()?;
            let encoded = ctx.call(&body).await?;
            let bytes = BASE64.decode(encoded.trim()).map_err(|error| {
                PgoError::Transfer(format!(
                    "chunk at offset {} is not valid base64: {error}",
                    chunk.start
                ))
            })?;
            if bytes.len() as u64 != chunk.size {
                return Err(PgoError::Transfer(format!(
                    "chunk at offset {} decoded to {} bytes, expected {}",
                    chunk.start,
                    bytes.len(),
                    chunk.size
                )));
            }
            file.write_all(&bytes).await.map_err(|error| {
                PgoError::Transfer(format!("failed to write {}: {error}", ctx.local_path.display()))
            })?;
            received += chunk.size;
            debug!(component = "transfer", event = "chunk_received", start = chunk.start, size = chunk.size, received);
        }
        file.flush().await.map_err(|error| {
            PgoError::Transfer(format!("failed to flush {}: {error}", ctx.local_path.display()))
        })?;

        if received != total {
            return Err(PgoError::Transfer(format!(
                "received {received} bytes, remote reported {total}"
            )));
        }
        Ok(received)
    }
}
