//! One acceleration run: prepare, package, provision, dump, transfer, merge,
//! and unconditional cleanup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pgo_accel_core::config::{RunConfig, TransportMethod};
use pgo_accel_core::naming::{local_shared_dir, TempNames};
use pgo_accel_core::protocol::{archive_digest, dump_request, ensure_dump_succeeded};
use pgo_accel_core::{PgoError, Result};
use tracing::{debug, error, info, warn};

use crate::adapters::command::CommandRunner;
use crate::adapters::file_share::FileShare;
use crate::adapters::function_compute::{
    FunctionCode, FunctionCompute, FunctionSpec, InvocationMode, ServiceSpec,
};
use crate::adapters::object_store::ObjectStore;
use crate::adapters::tool_fetch::ToolFetcher;
use crate::extract;
use crate::packager::{self, PackOptions, EXECUTABLE_MODE};
use crate::resources::TransientResourceManager;
use crate::runtimes::{strategy_for, RuntimeStrategy};
use crate::staging::{remove_path, write_file};
use crate::transfer::{downloader_for, ArchiveDownloader, TransferContext};

/// File name of the storage CLI shipped in the code package for bucket relays.
pub const STORAGE_CLI_ENTRY: &str = "ossutil64";
const STALE_BUILD_ARTIFACTS: [&str; 3] = [".s", "build", "artifacts"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    Prepared,
    Packaged,
    ServiceCreated,
    FunctionCreated,
    TriggerCreated,
    RemoteDumpInvoked,
    Transferred,
    Merged,
    CleanedUp,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Prepared => "prepared",
            Self::Packaged => "packaged",
            Self::ServiceCreated => "service_created",
            Self::FunctionCreated => "function_created",
            Self::TriggerCreated => "trigger_created",
            Self::RemoteDumpInvoked => "remote_dump_invoked",
            Self::Transferred => "transferred",
            Self::Merged => "merged",
            Self::CleanedUp => "cleaned_up",
        };
        f.write_str(label)
    }
}

/// External systems a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub function_compute: Arc<dyn FunctionCompute>,
    pub object_store: Arc<dyn ObjectStore>,
    pub file_share: Arc<dyn FileShare>,
    pub commands: Arc<dyn CommandRunner>,
    pub tools: Arc<dyn ToolFetcher>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub names: TempNames,
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
    pub archive_sha256: String,
    pub extracted_entries: usize,
    pub merged_entries: usize,
    pub phase: Phase,
}

/// Everything a run has touched that cleanup must undo.
struct RunState {
    phase: Phase,
    resources: TransientResourceManager,
    injected: Vec<PathBuf>,
    staging_dir: Option<PathBuf>,
    zip_path: Option<PathBuf>,
    transfer_complete: bool,
}

pub struct AccelerationWorkflow {
    config: RunConfig,
    strategy: Box<dyn RuntimeStrategy>,
    collaborators: Collaborators,
    names: TempNames,
    scratch_dir: PathBuf,
}

impl AccelerationWorkflow {
    /// Validates `config` before anything else; an invalid configuration never
    /// reaches the platform.
    pub fn new(config: RunConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let strategy = strategy_for(config.runtime_kind);
        let names = TempNames::generate(strategy.name_base());
        Ok(Self {
            config,
            strategy,
            collaborators,
            names,
            scratch_dir: std::env::temp_dir(),
        })
    }

    pub fn with_names(mut self, names: TempNames) -> Self {
        self.names = names;
        self
    }

    /// Parent of the temporary staging dir and code zip.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn names(&self) -> &TempNames {
        &self.names
    }

    pub async fn run(self) -> Result<RunReport> {
        let archive = self.strategy.archive();
        let downloader = downloader_for(
            &self.config,
            &self.names,
            archive.file_name,
            self.collaborators.object_store.clone(),
            self.collaborators.file_share.clone(),
        )?;
        let mut state = RunState {
            phase: Phase::Idle,
            resources: TransientResourceManager::new(self.collaborators.function_compute.clone()),
            injected: Vec::new(),
            staging_dir: None,
            zip_path: None,
            transfer_complete: false,
        };

        info!(
            component = "workflow",
            event = "run_started",
            runtime = %self.config.runtime_kind,
            downloader = %downloader.method(),
            uploader = %self.config.transport.uploader,
            token = self.names.token.as_str()
        );

        let outcome = self.execute(&mut state, downloader.as_ref()).await;
        let completed_phase = state.phase;
        if let Err(error) = &outcome {
            error!(
                component = "workflow",
                event = "phase_failed",
                completed_phase = %completed_phase,
                kind = error.kind(),
                error = %error
            );
        }

        self.cleanup(&mut state, downloader.as_ref()).await;

        match outcome {
            Ok(mut report) => {
                report.phase = state.phase;
                info!(
                    component = "workflow",
                    event = "run_succeeded",
                    archive_bytes = report.archive_bytes,
                    merged_entries = report.merged_entries
                );
                Ok(report)
            }
            Err(error) => {
                error!(
                    component = "workflow",
                    event = "run_failed",
                    completed_phase = %completed_phase,
                    error = %error
                );
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        state: &mut RunState,
        downloader: &dyn ArchiveDownloader,
    ) -> Result<RunReport> {
        self.prepare(state).await?;
        state.phase = Phase::Prepared;

        self.package(state).await?;
        state.phase = Phase::Packaged;

        let mode = self.provision(state).await?;
        self.remote_dump(mode, downloader).await?;
        state.phase = Phase::RemoteDumpInvoked;

        let mut report = self.transfer(mode, downloader, state).await?;
        state.phase = Phase::Transferred;

        report.merged_entries = self
            .strategy
            .merge(&self.config.paths.project_root, &self.config.paths.artifact_dir)?;
        state.phase = Phase::Merged;
        info!(component = "workflow", event = "merged", entries = report.merged_entries);
        Ok(report)
    }

    async fn prepare(&self, state: &mut RunState) -> Result<()> {
        let project_root = &self.config.paths.project_root;
        let stale: PathBuf = STALE_BUILD_ARTIFACTS.iter().fold(project_root.clone(), |path, part| path.join(part));
        if stale.exists() {
            return Err(PgoError::Prepare(format!(
                "{} exists; remove it so the deployment uses the artifact directory",
                stale.display()
            )));
        }

        let helpers = self.strategy.helper_files();
        if let Some(existing) = helpers
            .iter()
            .map(|helper| project_root.join(&helper.relative_path))
            .find(|target| target.symlink_metadata().is_ok())
        {
            return Err(PgoError::Prepare(format!(
                "{} already exists in the project; rename it so the helper can be injected",
                existing.display()
            )));
        }

        for helper in helpers {
            let target = project_root.join(&helper.relative_path);
            state.injected.push(target.clone());
            write_file(&target, helper.contents.as_bytes()).map_err(|error| {
                PgoError::Prepare(format!("failed to write {}: {error}", target.display()))
            })?;
        }

        for command in self.strategy.build_commands(project_root) {
            info!(component = "workflow", event = "build_step", command = %command.display());
            let output = self
                .collaborators
                .commands
                .run(&command)
                .await
                .map_err(PgoError::Prepare)?;
            debug!(component = "workflow", event = "build_output", output = %output);
        }

        let staging_dir = self.scratch_dir.join(&self.names.staging_dir);
        state.staging_dir = Some(staging_dir.clone());
        std::fs::create_dir_all(&staging_dir).map_err(|error| {
            PgoError::Prepare(format!("failed to create {}: {error}", staging_dir.display()))
        })?;
        self.strategy
            .stage(project_root, &self.config.paths.artifact_dir, &staging_dir)?;
        info!(component = "workflow", event = "prepared", staging_dir = %staging_dir.display());
        Ok(())
    }

    async fn package(&self, state: &mut RunState) -> Result<()> {
        let staging_dir = state
            .staging_dir
            .clone()
            .ok_or_else(|| PgoError::Packaging("staging directory missing".to_string()))?;
        let mut options = PackOptions {
            permission_overrides: self.strategy.permission_overrides(),
            ..PackOptions::default()
        };

        if self.config.transport.downloader == TransportMethod::Oss {
            let url = self.config.oss.resolved_util_url();
            let tool = self
                .collaborators
                .tools
                .fetch(url)
                .await
                .map_err(PgoError::ToolDownload)?;
            write_file(&staging_dir.join(STORAGE_CLI_ENTRY), &tool).map_err(|error| {
                PgoError::ToolDownload(format!("failed to store {STORAGE_CLI_ENTRY}: {error}"))
            })?;
            options
                .permission_overrides
                .insert(STORAGE_CLI_ENTRY.to_string(), EXECUTABLE_MODE);
            info!(component = "workflow", event = "tool_fetched", tool = STORAGE_CLI_ENTRY, bytes = tool.len());
        }

        let zip_path = self.scratch_dir.join(&self.names.zip_file);
        state.zip_path = Some(zip_path.clone());
        let summary = {
            let zip_path = zip_path.clone();
            tokio::task::spawn_blocking(move || packager::pack(&staging_dir, &zip_path, &options))
                .await
                .map_err(|error| PgoError::Packaging(format!("packaging task failed: {error}")))??
        };
        info!(
            component = "workflow",
            event = "packaged",
            zip = %zip_path.display(),
            files = summary.files,
            symlinks = summary.symlinks
        );
        Ok(())
    }

    async fn provision(&self, state: &mut RunState) -> Result<InvocationMode> {
        let service_settings = &self.config.service;
        let nas_config = service_settings
            .nas_config
            .as_ref()
            .filter(|_| self.config.transport.uses(TransportMethod::Nas))
            .map(|nas| nas.to_service_config())
            .transpose()?;
        let service_spec = ServiceSpec {
            service_name: self.names.service.clone(),
            description: format!("temporary {} startup acceleration", self.config.runtime_kind),
            role: service_settings.role.clone(),
            log_config: service_settings.log_config.clone(),
            vpc_config: service_settings
                .vpc_config
                .clone()
                .filter(|_| nas_config.is_some()),
            nas_config,
        };
        let service = state.resources.create_service(&service_spec).await?;
        state.phase = Phase::ServiceCreated;

        let zip_path = state
            .zip_path
            .as_deref()
            .ok_or_else(|| PgoError::Packaging("code zip missing".to_string()))?;
        let zip_bytes = tokio::fs::read(zip_path).await.map_err(|error| {
            PgoError::Packaging(format!("failed to read {}: {error}", zip_path.display()))
        })?;

        let function = &self.config.function;
        let dump_dir = self.config.remote_dump_dir();
        let mut environment_variables = function.environment_variables.clone();
        environment_variables.extend(self.strategy.warmup_env(&dump_dir, function));
        let function_spec = FunctionSpec {
            function_name: self.names.function.clone(),
            description: String::new(),
            code: FunctionCode {
                zip_file: BASE64.encode(zip_bytes),
            },
            handler: self.strategy.handler().to_string(),
            initializer: function.initializer.clone(),
            memory_size: function.memory_size_mb,
            runtime: function.runtime.clone(),
            timeout: function.timeout_secs,
            initialization_timeout: function.initialization_timeout_secs,
            instance_type: function.instance_type.clone(),
            environment_variables,
        };
        let function_handle = state
            .resources
            .create_function(&service, &function_spec)
            .await?;
        state.phase = Phase::FunctionCreated;

        let mode = self.strategy.invocation_mode();
        match mode {
            InvocationMode::HttpTrigger => {
                state
                    .resources
                    .create_http_trigger(
                        &function_handle,
                        &self.names.trigger,
                        self.strategy.trigger_methods(),
                    )
                    .await?;
                state.phase = Phase::TriggerCreated;
            }
            InvocationMode::Direct => {
                info!(component = "workflow", event = "trigger_skipped", reason = "direct invocation");
            }
        }

        Ok(mode)
    }

    async fn remote_dump(&self, mode: InvocationMode, downloader: &dyn ArchiveDownloader) -> Result<()> {
        let archive = self.strategy.archive();
        let body = dump_request(
            &self.config.remote_dump_dir(),
            &archive.remote_path(),
            archive.dump_method,
            &downloader.relay(),
        )
        .encode()?;

        info!(component = "workflow", event = "dump_requested", method = archive.dump_method);
        let response = self
            .collaborators
            .function_compute
            .call_action(&self.names.service, &self.names.function, mode, &body)
            .await
            .map_err(|message| PgoError::RemoteExecution(format!("dump call failed: {message}")))?;
        debug!(component = "workflow", event = "dump_response", response = %response);
        ensure_dump_succeeded(&response)?;
        info!(component = "workflow", event = "dump_succeeded");
        Ok(())
    }

    async fn transfer(
        &self,
        mode: InvocationMode,
        downloader: &dyn ArchiveDownloader,
        state: &mut RunState,
    ) -> Result<RunReport> {
        let archive = self.strategy.archive();
        let shared_dir = local_shared_dir(&self.config.paths.artifact_dir, self.config.shared_dir_name());
        tokio::fs::create_dir_all(&shared_dir).await.map_err(|error| {
            PgoError::Transfer(format!("failed to create {}: {error}", shared_dir.display()))
        })?;
        let local_path = shared_dir.join(archive.file_name);
        let remote_archive = archive.remote_path();

        let context = TransferContext {
            client: self.collaborators.function_compute.as_ref(),
            service: &self.names.service,
            function: &self.names.function,
            mode,
            remote_archive: &remote_archive,
            archive_name: archive.file_name,
            local_path: &local_path,
        };
        let archive_bytes = downloader.download(&context).await?;
        state.transfer_complete = true;

        let contents = tokio::fs::read(&local_path).await.map_err(|error| {
            PgoError::Transfer(format!("failed to read {}: {error}", local_path.display()))
        })?;
        if contents.len() as u64 != archive_bytes {
            return Err(PgoError::Transfer(format!(
                "{} holds {} bytes, expected {archive_bytes}",
                local_path.display(),
                contents.len()
            )));
        }
        let archive_sha256 = archive_digest(&contents);
        drop(contents);
        info!(
            component = "workflow",
            event = "archive_transferred",
            archive_bytes,
            sha256 = %archive_sha256
        );

        let extracted_entries = {
            let (archive_path, dest) = (local_path.clone(), shared_dir.clone());
            let format = archive.format;
            tokio::task::spawn_blocking(move || extract::unpack(format, &archive_path, &dest))
                .await
                .map_err(|error| PgoError::Transfer(format!("extraction task failed: {error}")))??
        };
        if !archive.format.keeps_archive() {
            remove_path(&local_path).map_err(|error| {
                PgoError::Transfer(format!("failed to remove {}: {error}", local_path.display()))
            })?;
        }
        info!(
            component = "workflow",
            event = "archive_extracted",
            entries = extracted_entries,
            shared_dir = %shared_dir.display()
        );

        Ok(RunReport {
            names: self.names.clone(),
            archive_path: local_path,
            archive_bytes,
            archive_sha256,
            extracted_entries,
            merged_entries: 0,
            phase: state.phase,
        })
    }

    async fn cleanup(&self, state: &mut RunState, downloader: &dyn ArchiveDownloader) {
        let mut local: Vec<PathBuf> = Vec::new();
        local.extend(state.staging_dir.take());
        local.extend(state.zip_path.take());
        if !state.injected.is_empty() {
            local.append(&mut state.injected);
            local.extend(
                self.strategy
                    .compiled_helper_paths(&self.config.paths.project_root, &self.config.paths.artifact_dir),
            );
        }
        for path in &local {
            remove_quietly(path);
        }

        if !state.transfer_complete {
            downloader.discard().await;
        }
        state.resources.cleanup().await;
        state.phase = Phase::CleanedUp;
        info!(component = "workflow", event = "cleaned_up", token = self.names.token.as_str());
    }
}

fn remove_quietly(path: &Path) {
    if let Err(error) = remove_path(path) {
        warn!(
            component = "workflow",
            event = "local_cleanup_failed",
            path = %path.display(),
            error = %error
        );
    }
}
