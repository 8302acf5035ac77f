#![allow(dead_code)]

pub mod platform;
pub mod stores;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pgo_accel_core::config::{
    Credentials, FunctionSettings, NasConfig, NasMount, OssSettings, RunConfig, RuntimeKind,
    StagingPaths, TransportMethod, TransportSelection, VpcConfig,
};
use pgo_accel_core::naming::{RunToken, TempNames};
use pgo_accel_fc::staging::write_file;
use pgo_accel_fc::Collaborators;
use tempfile::TempDir;

pub use platform::FakePlatform;
pub use stores::{FakeFileShare, FakeObjectStore, RecordingCommandRunner, StaticToolFetcher};

pub const TOKEN: &str = "t1";
pub const MIB: usize = 1024 * 1024;

/// A throwaway project directory plus a separate scratch dir for staging.
pub struct Workspace {
    pub project: TempDir,
    pub scratch: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            project: tempfile::tempdir().expect("project dir"),
            scratch: tempfile::tempdir().expect("scratch dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.project.path()
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.root().join("target").join("artifact")
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.artifact_dir().join("runtime.data.share")
    }

    pub fn write(&self, relative: &str, contents: &str) {
        write_file(&self.root().join(relative), contents.as_bytes()).expect("write fixture");
    }

    /// Entries left in the scratch dir after a run.
    pub fn scratch_entries(&self) -> Vec<String> {
        std::fs::read_dir(self.scratch.path())
            .expect("read scratch")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// Fakes behind every collaborator, kept typed so tests can inspect them.
pub struct Fakes {
    pub platform: Arc<FakePlatform>,
    pub object_store: Arc<FakeObjectStore>,
    pub file_share: Arc<FakeFileShare>,
    pub commands: Arc<RecordingCommandRunner>,
    pub tools: Arc<StaticToolFetcher>,
}

impl Fakes {
    pub fn new(platform: FakePlatform) -> Self {
        Self {
            platform: Arc::new(platform),
            object_store: Arc::new(FakeObjectStore::default()),
            file_share: Arc::new(FakeFileShare::default()),
            commands: Arc::new(RecordingCommandRunner::default()),
            tools: Arc::new(StaticToolFetcher::serving(b"#!/bin/sh\necho ossutil\n")),
        }
    }

    pub fn with_commands(mut self, commands: RecordingCommandRunner) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            function_compute: self.platform.clone(),
            object_store: self.object_store.clone(),
            file_share: self.file_share.clone(),
            commands: self.commands.clone(),
            tools: self.tools.clone(),
        }
    }
}

pub fn names_for(kind: RuntimeKind) -> TempNames {
    let base = match kind {
        RuntimeKind::Java => "trace-dump",
        RuntimeKind::Node => "require-cache",
        RuntimeKind::Python => "cds-dump",
    };
    TempNames::new(base, RunToken::from_value(TOKEN))
}

pub fn base_config(
    kind: RuntimeKind,
    runtime: &str,
    workspace: &Workspace,
    downloader: TransportMethod,
    uploader: TransportMethod,
) -> RunConfig {
    let mut config = RunConfig::new(
        kind,
        "cn-chengdu",
        Credentials {
            account_id: "1234567890".to_string(),
            access_key_id: "test-ak".to_string(),
            access_key_secret: "test-secret".to_string(),
        },
        StagingPaths::new(workspace.root()),
        FunctionSettings::new(runtime),
    );
    config.transport = TransportSelection {
        downloader,
        uploader,
    };
    config.oss = OssSettings {
        endpoint: None,
        bucket: Some("deploy-bucket".to_string()),
        key: Some("code.zip".to_string()),
        util_url: Some("https://tools.example.com/ossutil64".to_string()),
    };
    config
}

/// Adds the VPC and NAS settings a file-share transport needs, with the
/// shared dir placed on the mount.
pub fn with_file_share(mut config: RunConfig) -> RunConfig {
    config.service.vpc_config = Some(VpcConfig {
        vpc_id: "vpc-1".to_string(),
        v_switch_ids: vec!["vsw-1".to_string()],
        security_group_id: "sg-1".to_string(),
    });
    config.service.nas_config = Some(NasConfig {
        user_id: 10003,
        group_id: 10003,
        mount_points: vec![NasMount {
            server_addr: "abc.cn-chengdu.nas.aliyuncs.com".to_string(),
            nas_dir: "/demo".to_string(),
            fc_dir: "/mnt/nas".to_string(),
        }],
    });
    config.srpath = "/mnt/nas/app/runtime.data.share".to_string();
    config
}

/// Deterministic, non-repeating-ish payload of `len` bytes.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|index| (index % 251) as u8 ^ (index / 251) as u8).collect()
}

pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).expect("append entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}
