use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chunking::{validate_chunk_size, DEFAULT_CHUNK_SIZE};
use crate::error::{PgoError, Result};

pub const DEFAULT_SRPATH: &str = "/code/runtime.data.share";
pub const CODE_ROOT: &str = "/code";
pub const NAS_SHARED_DIR_SUFFIX: &str = "/runtime.data.share";
const REMOTE_SCRATCH_DIR: &str = "/tmp";
/// Published linux build of the storage CLI, used when no mirror is configured.
pub const DEFAULT_OSS_UTIL_URL: &str = "https://gosspublic.alicdn.com/ossutil/1.7.14/ossutil64";

/// Runtime family of the function being accelerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Scripting runtime producing a require-cache snapshot.
    Node,
    /// Managed runtime producing a quickstart trace dump.
    Java,
    /// Managed runtime producing a code-data-share image.
    Python,
}

impl RuntimeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Java => "java",
            Self::Python => "python",
        }
    }

    /// Infers the family from a platform runtime identifier such as `java11`.
    pub fn from_runtime_id(runtime_id: &str) -> Result<Self> {
        let lowered = runtime_id.trim().to_ascii_lowercase();
        if lowered.starts_with("nodejs") {
            Ok(Self::Node)
        } else if lowered.starts_with("java") {
            Ok(Self::Java)
        } else if lowered.starts_with("python") {
            Ok(Self::Python)
        } else {
            Err(PgoError::Config(format!(
                "unsupported runtime '{runtime_id}' (expected nodejs*, java* or python*)"
            )))
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = PgoError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "node" | "nodejs" => Ok(Self::Node),
            "java" => Ok(Self::Java),
            "python" => Ok(Self::Python),
            _ => Self::from_runtime_id(value),
        }
    }
}

/// How the acceleration archive crosses between the temporary function and the
/// local machine (downloader) or where the shared directory is staged for the
/// final deployment (uploader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMethod {
    /// Chunked base64 over synchronous action calls.
    Stream,
    /// Relay through an object storage bucket.
    Oss,
    /// Relay through a mounted network file share.
    Nas,
}

impl TransportMethod {
    pub const ALL: [TransportMethod; 3] = [Self::Stream, Self::Oss, Self::Nas];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Oss => "oss",
            Self::Nas => "nas",
        }
    }
}

impl fmt::Display for TransportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMethod {
    type Err = PgoError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(Self::Stream),
            "oss" => Ok(Self::Oss),
            "nas" => Ok(Self::Nas),
            other => Err(PgoError::Config(format!(
                "invalid transport method '{other}', choose one from ['oss', 'nas', 'stream']"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSelection {
    pub downloader: TransportMethod,
    pub uploader: TransportMethod,
}

impl Default for TransportSelection {
    fn default() -> Self {
        Self {
            downloader: TransportMethod::Oss,
            uploader: TransportMethod::Stream,
        }
    }
}

impl TransportSelection {
    /// Rejects pairs the remote helper cannot serve.
    ///
    /// | downloader | uploader | status          |
    /// |------------|----------|-----------------|
    /// | oss        | stream   | recommended     |
    /// | nas        | stream   | recommended     |
    /// | oss        | oss      | recommended     |
    /// | nas        | nas      | tested          |
    /// | stream     | stream   | not recommended |
    /// | nas        | oss      | unsupported     |
    pub fn validate(&self) -> Result<()> {
        if self.downloader == TransportMethod::Nas && self.uploader == TransportMethod::Oss {
            return Err(PgoError::Config(format!(
                "the combination is unsupported: downloader [{}], uploader [{}]",
                self.downloader, self.uploader
            )));
        }
        Ok(())
    }

    pub fn uses(&self, method: TransportMethod) -> bool {
        self.downloader == method || self.uploader == method
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: String,
    pub access_key_id: String,
    pub access_key_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPaths {
    pub project_root: PathBuf,
    pub artifact_dir: PathBuf,
}

impl StagingPaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let artifact_dir = project_root.join("target").join("artifact");
        Self {
            project_root,
            artifact_dir,
        }
    }

    pub fn with_artifact_dir(mut self, artifact_dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = artifact_dir.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    pub project: String,
    pub logstore: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfig {
    pub vpc_id: String,
    #[serde(rename = "vSwitchIds")]
    pub v_switch_ids: Vec<String>,
    pub security_group_id: String,
}

/// NAS mount as written in the deployment descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NasMount {
    pub server_addr: String,
    pub nas_dir: String,
    pub fc_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NasConfig {
    pub user_id: i64,
    pub group_id: i64,
    pub mount_points: Vec<NasMount>,
}

/// NAS mount in the shape the platform expects on a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMountPoint {
    pub server_addr: String,
    pub mount_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNasConfig {
    pub user_id: i64,
    pub group_id: i64,
    pub mount_points: Vec<ServiceMountPoint>,
}

impl NasConfig {
    pub fn primary_mount(&self) -> Result<&NasMount> {
        let mount = self
            .mount_points
            .first()
            .ok_or_else(|| PgoError::Config("nasConfig has no mount points".to_string()))?;
        if mount.fc_dir.trim().is_empty() {
            return Err(PgoError::Config("fcDir is empty, please check".to_string()));
        }
        Ok(mount)
    }

    /// Mount directory of the primary mount point, without a trailing slash.
    pub fn mount_dir(&self) -> Result<String> {
        Ok(trim_trailing_slash(&self.primary_mount()?.fc_dir).to_string())
    }

    /// Only the primary mount is cloned onto the temporary service.
    pub fn to_service_config(&self) -> Result<ServiceNasConfig> {
        let mount = self.primary_mount()?;
        Ok(ServiceNasConfig {
            user_id: self.user_id,
            group_id: self.group_id,
            mount_points: vec![ServiceMountPoint {
                server_addr: format!("{}:{}", mount.server_addr, mount.nas_dir),
                mount_dir: trim_trailing_slash(&mount.fc_dir).to_string(),
            }],
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSettings {
    pub role: Option<String>,
    pub log_config: Option<LogConfig>,
    pub vpc_config: Option<VpcConfig>,
    pub nas_config: Option<NasConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSettings {
    pub runtime: String,
    pub handler: Option<String>,
    pub initializer: Option<String>,
    pub memory_size_mb: u32,
    pub timeout_secs: u32,
    pub initialization_timeout_secs: u32,
    pub instance_type: Option<String>,
    pub environment_variables: BTreeMap<String, String>,
}

impl FunctionSettings {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            handler: None,
            initializer: None,
            memory_size_mb: 4096,
            timeout_secs: 60 * 60,
            initialization_timeout_secs: 5 * 60,
            instance_type: Some("c1".to_string()),
            environment_variables: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OssSettings {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub util_url: Option<String>,
}

impl OssSettings {
    /// Storage endpoint reachable from inside the region.
    pub fn resolved_endpoint(&self, region: &str) -> String {
        self.endpoint
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| format!("oss-{region}-internal.aliyuncs.com"))
    }

    pub fn resolved_util_url(&self) -> &str {
        self.util_url
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(DEFAULT_OSS_UTIL_URL)
    }
}

/// Fully resolved settings for one acceleration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub runtime_kind: RuntimeKind,
    pub region: String,
    pub endpoint: Option<String>,
    pub credentials: Credentials,
    pub paths: StagingPaths,
    pub srpath: String,
    pub service: ServiceSettings,
    pub function: FunctionSettings,
    pub transport: TransportSelection,
    pub oss: OssSettings,
    pub relaxed_layout: bool,
    pub chunk_size: u64,
}

impl RunConfig {
    pub fn new(
        runtime_kind: RuntimeKind,
        region: impl Into<String>,
        credentials: Credentials,
        paths: StagingPaths,
        function: FunctionSettings,
    ) -> Self {
        Self {
            runtime_kind,
            region: region.into(),
            endpoint: None,
            credentials,
            paths,
            srpath: DEFAULT_SRPATH.to_string(),
            service: ServiceSettings::default(),
            function,
            transport: TransportSelection::default(),
            oss: OssSettings::default(),
            relaxed_layout: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Shared directory path on the remote side, without a trailing slash.
    pub fn shared_path(&self) -> &str {
        trim_trailing_slash(&self.srpath)
    }

    pub fn shared_dir_name(&self) -> &str {
        shared_dir_name(&self.srpath)
    }

    /// Directory the temporary function dumps into. The code package is
    /// read-only at run time, so unless the shared dir lives on NAS the dump
    /// lands in the scratch area under the same name.
    pub fn remote_dump_dir(&self) -> String {
        if self.transport.uploader == TransportMethod::Nas {
            self.shared_path().to_string()
        } else {
            format!("{REMOTE_SCRATCH_DIR}/{}", self.shared_dir_name())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;

        if self.region.trim().is_empty() {
            return Err(PgoError::Config("region cannot be empty".to_string()));
        }
        if self.credentials.account_id.trim().is_empty()
            || self.credentials.access_key_id.trim().is_empty()
            || self.credentials.access_key_secret.trim().is_empty()
        {
            return Err(PgoError::Config(
                "account id, access key id and access key secret are required".to_string(),
            ));
        }
        if self.function.runtime.trim().is_empty() {
            return Err(PgoError::Config("function runtime cannot be empty".to_string()));
        }
        if self.function.memory_size_mb == 0 {
            return Err(PgoError::Config(
                "max memory must be a positive integer".to_string(),
            ));
        }
        if self.function.timeout_secs == 0 || self.function.initialization_timeout_secs == 0 {
            return Err(PgoError::Config(
                "timeout and init timeout must be positive integers".to_string(),
            ));
        }
        validate_chunk_size(self.chunk_size)?;

        let shared_path = self.shared_path();
        if !shared_path.starts_with('/') || self.shared_dir_name().is_empty() {
            return Err(PgoError::Config(format!(
                "SRPATH [{}] must be an absolute directory path",
                self.srpath
            )));
        }

        if !self.relaxed_layout
            && self.transport.uploader != TransportMethod::Nas
            && parent_dir(shared_path) != CODE_ROOT
        {
            return Err(PgoError::Config(
                "environment var SRPATH should start with /code".to_string(),
            ));
        }

        if self.transport.uses(TransportMethod::Nas) {
            self.validate_nas(shared_path)?;
        }

        if self.transport.uploader == TransportMethod::Oss
            && (is_blank(&self.oss.bucket) || is_blank(&self.oss.key))
        {
            return Err(PgoError::Config(
                "ossBucket and ossKey are required when the uploader is oss".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_nas(&self, shared_path: &str) -> Result<()> {
        if self.service.vpc_config.is_none() {
            return Err(PgoError::Config(
                "vpcConfig is required when nas transport is used".to_string(),
            ));
        }
        let nas_config = self.service.nas_config.as_ref().ok_or_else(|| {
            PgoError::Config("nasConfig is required when nas transport is used".to_string())
        })?;
        let mount_dir = nas_config.mount_dir()?;

        if self.transport.uploader == TransportMethod::Nas {
            let nested = shared_path
                .strip_prefix(mount_dir.as_str())
                .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1);
            if !nested {
                return Err(PgoError::Config("SRPATH should be subdir of fcDir".to_string()));
            }
            if !shared_path.ends_with(NAS_SHARED_DIR_SUFFIX) {
                return Err(PgoError::Config(format!(
                    "invalid SRPATH [{shared_path}], should end with {NAS_SHARED_DIR_SUFFIX}, for example: /mnt/nas{NAS_SHARED_DIR_SUFFIX}"
                )));
            }
        }
        Ok(())
    }
}

pub fn trim_trailing_slash(value: &str) -> &str {
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() && value.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

pub fn shared_dir_name(srpath: &str) -> &str {
    let trimmed = trim_trailing_slash(srpath);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "",
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
