//! Text protocol spoken with the helper shim inside the temporary function.
//!
//! Requests are `key=value` pairs joined by `;`. The shim answers plain text:
//! a status line for `dump`, a decimal length for `size`, base64 for reads.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::chunking::ChunkRange;
use crate::error::{PgoError, Result};

pub const SUCCESS_MARKER: &str = "success";

pub const KEY_SRPATH: &str = "srpath";
pub const KEY_TYPE: &str = "type";
pub const KEY_FILE: &str = "file";
pub const KEY_METHOD: &str = "method";
pub const KEY_START: &str = "start";
pub const KEY_SIZE: &str = "size";
pub const KEY_ACCESS_KEY_ID: &str = "accessKeyId";
pub const KEY_ACCESS_KEY_SECRET: &str = "accessKeySecret";
pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_BUCKET: &str = "bucket";
pub const KEY_NAS_FILE_PATH: &str = "nasFilePath";

pub const TYPE_DUMP: &str = "dump";
pub const TYPE_SIZE: &str = "size";

/// Where the remote side must place the archive after dumping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTarget {
    /// Keep the archive at its remote path; it is read back in chunks.
    Inline,
    ObjectStorage {
        access_key_id: String,
        access_key_secret: String,
        endpoint: String,
        bucket: String,
    },
    FileShare {
        nas_file_path: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionRequest {
    fields: Vec<(String, String)>,
}

impl ActionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for (key, value) in &self.fields {
            if key.is_empty() || key.contains(['=', ';']) {
                return Err(PgoError::Config(format!(
                    "action key '{key}' must be non-empty without '=' or ';'"
                )));
            }
            if value.contains(';') {
                return Err(PgoError::Config(format!(
                    "value of action key '{key}' must not contain ';'"
                )));
            }
            parts.push(format!("{key}={value}"));
        }
        Ok(parts.join(";"))
    }

    /// Parses a body the way the helper shims do: empty items are skipped, a
    /// key without `=` maps to an empty value.
    pub fn parse(body: &str) -> BTreeMap<String, String> {
        body.split(';')
            .filter_map(|item| {
                let (key, value) = item.split_once('=').unwrap_or((item, ""));
                if key.is_empty() {
                    None
                } else {
                    Some((key.to_string(), value.to_string()))
                }
            })
            .collect()
    }
}

pub fn dump_request(
    srpath: &str,
    remote_archive_path: &str,
    method: &str,
    relay: &RelayTarget,
) -> ActionRequest {
    let request = ActionRequest::new()
        .field(KEY_SRPATH, srpath)
        .field(KEY_TYPE, TYPE_DUMP)
        .field(KEY_FILE, remote_archive_path)
        .field(KEY_METHOD, method);

    match relay {
        RelayTarget::Inline => request,
        RelayTarget::ObjectStorage {
            access_key_id,
            access_key_secret,
            endpoint,
            bucket,
        } => request
            .field(KEY_ACCESS_KEY_ID, access_key_id)
            .field(KEY_ACCESS_KEY_SECRET, access_key_secret)
            .field(KEY_ENDPOINT, endpoint)
            .field(KEY_BUCKET, bucket),
        RelayTarget::FileShare { nas_file_path } => {
            request.field(KEY_NAS_FILE_PATH, nas_file_path)
        }
    }
}

pub fn size_request(remote_archive_path: &str) -> ActionRequest {
    ActionRequest::new()
        .field(KEY_TYPE, TYPE_SIZE)
        .field(KEY_FILE, remote_archive_path)
}

pub fn read_request(remote_archive_path: &str, range: ChunkRange) -> ActionRequest {
    ActionRequest::new()
        .field(KEY_START, range.start.to_string())
        .field(KEY_SIZE, range.size.to_string())
        .field(KEY_FILE, remote_archive_path)
}

/// Accepts only ASCII digits, surrounding whitespace aside. Anything else,
/// including an inline error message from the shim, is a hard failure.
pub fn parse_size_response(body: &str) -> Result<u64> {
    let trimmed = body.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(PgoError::Transfer(format!(
            "archive size response is not a non-negative integer: {}",
            preview(trimmed)
        )));
    }
    trimmed
        .parse::<u64>()
        .map_err(|error| PgoError::Transfer(format!("archive size out of range: {error}")))
}

pub fn ensure_dump_succeeded(body: &str) -> Result<()> {
    if body.starts_with(SUCCESS_MARKER) {
        Ok(())
    } else {
        Err(PgoError::RemoteExecution(format!(
            "dump encountered error: {}",
            preview(body)
        )))
    }
}

pub fn archive_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 512;
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
