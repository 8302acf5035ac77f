use thiserror::Error;

pub type Result<T> = std::result::Result<T, PgoError>;

/// Failure of an acceleration run, classified by the phase that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PgoError {
    /// Invalid or missing setting. Raised before any remote side effect.
    #[error("configuration error: {0}")]
    Config(String),

    /// Helper injection, build command or staging failure.
    #[error("prepare error: {0}")]
    Prepare(String),

    /// Local zip construction failure.
    #[error("packaging error: {0}")]
    Packaging(String),

    /// The auxiliary storage CLI could not be fetched into the staging tree.
    #[error("tool download error: {0}")]
    ToolDownload(String),

    /// A create call against the function-compute platform failed.
    #[error("failed to create {resource}: {message}")]
    Provision { resource: String, message: String },

    /// The temporary function answered the dump request without `success`.
    #[error("remote execution error: {0}")]
    RemoteExecution(String),

    /// Size, format or post-condition mismatch while moving the archive.
    #[error("transfer error: {0}")]
    Transfer(String),

    /// Copying build output into the artifact directory failed.
    #[error("merge error: {0}")]
    Merge(String),
}

impl PgoError {
    pub fn provision(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provision {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly label used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Prepare(_) => "prepare_error",
            Self::Packaging(_) => "packaging_error",
            Self::ToolDownload(_) => "tool_download_error",
            Self::Provision { .. } => "provision_error",
            Self::RemoteExecution(_) => "remote_execution_error",
            Self::Transfer(_) => "transfer_error",
            Self::Merge(_) => "merge_error",
        }
    }
}
