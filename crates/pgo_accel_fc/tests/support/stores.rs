#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use pgo_accel_fc::adapters::command::{CommandRunner, CommandSpec};
use pgo_accel_fc::adapters::file_share::FileShare;
use pgo_accel_fc::adapters::object_store::ObjectStore;
use pgo_accel_fc::adapters::tool_fetch::ToolFetcher;

/// Buckets of objects held in memory.
#[derive(Default)]
pub struct FakeObjectStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl FakeObjectStore {
    /// Stands in for the remote side uploading into the relay bucket.
    pub fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.buckets
            .lock()
            .expect("store poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), bytes);
    }

    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.lock().expect("store poisoned").contains_key(bucket)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, String> {
        let bytes = self
            .buckets
            .lock()
            .expect("store poisoned")
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| format!("NoSuchKey: {bucket}/{key}"))?;
        std::fs::write(dest, &bytes).map_err(|error| error.to_string())?;
        Ok(bytes.len() as u64)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), String> {
        if let Some(objects) = self.buckets.lock().expect("store poisoned").get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, String> {
        self.buckets
            .lock()
            .expect("store poisoned")
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| format!("NoSuchBucket: {bucket}"))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), String> {
        let mut buckets = self.buckets.lock().expect("store poisoned");
        match buckets.get(bucket) {
            Some(objects) if !objects.is_empty() => Err(format!("BucketNotEmpty: {bucket}")),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
            None => Err(format!("NoSuchBucket: {bucket}")),
        }
    }
}

/// Mounted share holding files by their remote path.
#[derive(Default)]
pub struct FakeFileShare {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    downloads: Mutex<Vec<String>>,
    removals: Mutex<Vec<String>>,
}

impl FakeFileShare {
    pub fn put(&self, remote_path: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .expect("share poisoned")
            .insert(remote_path.to_string(), bytes);
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().expect("share poisoned").clone()
    }

    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().expect("share poisoned").clone()
    }

    pub fn contains(&self, remote_path: &str) -> bool {
        self.files.lock().expect("share poisoned").contains_key(remote_path)
    }
}

#[async_trait]
impl FileShare for FakeFileShare {
    /// Like the real copy command, a missing remote file is not reported.
    async fn download(&self, remote_path: &str, local_dir: &Path) -> Result<(), String> {
        self.downloads
            .lock()
            .expect("share poisoned")
            .push(remote_path.to_string());
        let contents = self.files.lock().expect("share poisoned").get(remote_path).cloned();
        if let Some(bytes) = contents {
            let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
            std::fs::write(local_dir.join(name), bytes).map_err(|error| error.to_string())?;
        }
        Ok(())
    }

    async fn remove(&self, remote_path: &str) -> Result<(), String> {
        self.removals
            .lock()
            .expect("share poisoned")
            .push(remote_path.to_string());
        let prefix = format!("{remote_path}/");
        self.files
            .lock()
            .expect("share poisoned")
            .retain(|path, _| path != remote_path && !path.starts_with(&prefix));
        Ok(())
    }
}

/// Records build commands instead of running them.
#[derive(Default)]
pub struct RecordingCommandRunner {
    commands: Mutex<Vec<String>>,
    failing_programs: BTreeSet<String>,
}

impl RecordingCommandRunner {
    pub fn failing_on(program: &str) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            failing_programs: BTreeSet::from([program.to_string()]),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("runner poisoned").clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<String, String> {
        self.commands
            .lock()
            .expect("runner poisoned")
            .push(command.display());
        if self.failing_programs.contains(&command.program) {
            return Err(format!("{} exited with status 1", command.display()));
        }
        Ok(String::new())
    }
}

/// Serves a fixed payload for every tool URL.
#[derive(Default)]
pub struct StaticToolFetcher {
    payload: Vec<u8>,
    fetched: Mutex<Vec<String>>,
}

impl StaticToolFetcher {
    pub fn serving(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("fetcher poisoned").clone()
    }
}

#[async_trait]
impl ToolFetcher for StaticToolFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        self.fetched.lock().expect("fetcher poisoned").push(url.to_string());
        if self.payload.is_empty() {
            return Err(format!("GET {url}: 404 Not Found"));
        }
        Ok(self.payload.clone())
    }
}
