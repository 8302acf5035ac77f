use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use pgo_accel_core::chunking::DEFAULT_CHUNK_SIZE;
use pgo_accel_core::config::{
    Credentials, FunctionSettings, LogConfig, NasConfig, NasMount, OssSettings, RunConfig,
    RuntimeKind, ServiceSettings, StagingPaths, TransportMethod, TransportSelection, VpcConfig,
    DEFAULT_SRPATH,
};
use pgo_accel_fc::adapters::command::ProcessCommandRunner;
use pgo_accel_fc::adapters::fc_http::FcHttpClient;
use pgo_accel_fc::adapters::file_share::CommandFileShare;
use pgo_accel_fc::adapters::object_store::OssObjectStore;
use pgo_accel_fc::adapters::tool_fetch::HttpToolFetcher;
use pgo_accel_fc::{AccelerationWorkflow, Collaborators};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "pgo_accel_fc=info,pgo_accel_core=info";
const DEBUG_LOG_FILTER: &str = "pgo_accel_fc=debug,pgo_accel_core=debug";

#[derive(Parser, Debug)]
#[command(
    name = "pgo",
    about = "Generate startup acceleration files for a function-compute function",
    long_about = "Deploys a temporary copy of the function, lets the runtime record its\n\
                  warm-up artifact, downloads it into the artifact directory and removes\n\
                  every temporary resource again."
)]
struct Cli {
    #[arg(long, env = "ALIBABA_CLOUD_ACCOUNT_ID")]
    account_id: String,
    #[arg(long, env = "ALIBABA_CLOUD_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: String,
    #[arg(long, env = "ALIBABA_CLOUD_ACCESS_KEY_SECRET", hide_env_values = true)]
    access_key_secret: String,
    #[arg(long, env = "FC_REGION")]
    region: String,
    /// Override of the function-compute endpoint
    #[arg(long, env = "FC_ENDPOINT")]
    endpoint: Option<String>,

    /// Platform runtime identifier, e.g. java11, nodejs14, python3.9
    #[arg(long)]
    runtime: String,
    /// Runtime family; inferred from --runtime when omitted
    #[arg(long)]
    runtime_kind: Option<RuntimeKind>,
    /// User handler wrapped by the helper shim
    #[arg(long)]
    handler: Option<String>,
    #[arg(long)]
    initializer: Option<String>,
    /// Shared-data directory as seen by the deployed function
    #[arg(long, default_value = DEFAULT_SRPATH)]
    srpath: String,
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,
    /// Defaults to <project-dir>/target/artifact
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    #[arg(long, default_value = "oss")]
    downloader: TransportMethod,
    #[arg(long, default_value = "stream")]
    uploader: TransportMethod,

    #[arg(long, default_value_t = 300)]
    init_timeout: u32,
    #[arg(long, default_value_t = 3600)]
    timeout: u32,
    #[arg(long, default_value_t = 4096)]
    max_memory: u32,
    #[arg(long, default_value = "c1")]
    instance_type: String,
    /// Extra function environment variable, KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_key_value)]
    env: Vec<(String, String)>,

    #[arg(long)]
    role: Option<String>,
    #[arg(long, requires = "log_store")]
    log_project: Option<String>,
    #[arg(long, requires = "log_project")]
    log_store: Option<String>,

    #[arg(long)]
    vpc_id: Option<String>,
    #[arg(long = "vswitch-id")]
    vswitch_ids: Vec<String>,
    #[arg(long)]
    security_group_id: Option<String>,

    #[arg(long)]
    nas_server_addr: Option<String>,
    #[arg(long, default_value = "/")]
    nas_dir: String,
    /// Mount directory inside the function (fcDir)
    #[arg(long)]
    nas_mount_dir: Option<String>,
    #[arg(long, default_value_t = 10003)]
    nas_user_id: i64,
    #[arg(long, default_value_t = 10003)]
    nas_group_id: i64,

    #[arg(long)]
    oss_endpoint: Option<String>,
    #[arg(long)]
    oss_bucket: Option<String>,
    #[arg(long)]
    oss_key: Option<String>,
    /// Download URL of the storage CLI shipped for bucket relays
    #[arg(long)]
    oss_util_url: Option<String>,

    /// Skip the deployment layout checks
    #[arg(long)]
    enable: bool,
    /// Bytes per streamed read, at most 3 MiB
    #[arg(
        long,
        default_value_t = DEFAULT_CHUNK_SIZE,
        value_parser = clap::value_parser!(u64).range(1..=DEFAULT_CHUNK_SIZE)
    )]
    chunk_size: u64,

    #[arg(long)]
    debug: bool,
    #[arg(long)]
    log_json: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn init_tracing(debug: bool, json: bool) {
    let filter = if debug {
        EnvFilter::new(DEBUG_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

impl Cli {
    fn into_config(self) -> anyhow::Result<RunConfig> {
        let runtime_kind = match self.runtime_kind {
            Some(kind) => kind,
            None => RuntimeKind::from_runtime_id(&self.runtime)?,
        };
        let project_root = std::fs::canonicalize(&self.project_dir)
            .with_context(|| format!("project dir {} is not accessible", self.project_dir.display()))?;
        let paths = match self.artifact_dir {
            Some(dir) => StagingPaths::new(&project_root).with_artifact_dir(project_root.join(dir)),
            None => StagingPaths::new(&project_root),
        };

        let mut function = FunctionSettings::new(self.runtime);
        function.handler = self.handler;
        function.initializer = self.initializer;
        function.memory_size_mb = self.max_memory;
        function.timeout_secs = self.timeout;
        function.initialization_timeout_secs = self.init_timeout;
        function.instance_type = Some(self.instance_type).filter(|value| !value.is_empty());
        function.environment_variables = self.env.into_iter().collect::<BTreeMap<_, _>>();

        let vpc_config = match (self.vpc_id, self.security_group_id) {
            (Some(vpc_id), Some(security_group_id)) => Some(VpcConfig {
                vpc_id,
                v_switch_ids: self.vswitch_ids,
                security_group_id,
            }),
            (None, None) => None,
            _ => return Err(anyhow!("--vpc-id and --security-group-id must be given together")),
        };
        let nas_config = match (self.nas_server_addr, self.nas_mount_dir) {
            (Some(server_addr), Some(fc_dir)) => Some(NasConfig {
                user_id: self.nas_user_id,
                group_id: self.nas_group_id,
                mount_points: vec![NasMount {
                    server_addr,
                    nas_dir: self.nas_dir,
                    fc_dir,
                }],
            }),
            (None, None) => None,
            _ => return Err(anyhow!("--nas-server-addr and --nas-mount-dir must be given together")),
        };
        let log_config = match (self.log_project, self.log_store) {
            (Some(project), Some(logstore)) => Some(LogConfig { project, logstore }),
            _ => None,
        };

        let mut config = RunConfig::new(
            runtime_kind,
            self.region,
            Credentials {
                account_id: self.account_id,
                access_key_id: self.access_key_id,
                access_key_secret: self.access_key_secret,
            },
            paths,
            function,
        );
        config.endpoint = self.endpoint;
        config.srpath = self.srpath;
        config.service = ServiceSettings {
            role: self.role,
            log_config,
            vpc_config,
            nas_config,
        };
        config.transport = TransportSelection {
            downloader: self.downloader,
            uploader: self.uploader,
        };
        config.oss = OssSettings {
            endpoint: self.oss_endpoint,
            bucket: self.oss_bucket,
            key: self.oss_key,
            util_url: self.oss_util_url,
        };
        config.relaxed_layout = self.enable;
        config.chunk_size = self.chunk_size;
        Ok(config)
    }
}

async fn build_collaborators(config: &RunConfig) -> anyhow::Result<Collaborators> {
    let function_compute = FcHttpClient::new(
        config.credentials.clone(),
        &config.region,
        config.endpoint.as_deref(),
    )
    .map_err(|error| anyhow!(error))?;
    let object_store = OssObjectStore::new(
        &config.credentials,
        &config.region,
        &config.oss.resolved_endpoint(&config.region),
    )
    .await;
    let commands = Arc::new(ProcessCommandRunner);
    let file_share = CommandFileShare::new(commands.clone(), config.paths.project_root.clone());
    let tools = HttpToolFetcher::new().map_err(|error| anyhow!(error))?;

    Ok(Collaborators {
        function_compute: Arc::new(function_compute),
        object_store: Arc::new(object_store),
        file_share: Arc::new(file_share),
        commands,
        tools: Arc::new(tools),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_json);

    let config = cli.into_config()?;
    let collaborators = build_collaborators(&config).await?;
    let workflow = AccelerationWorkflow::new(config, collaborators)?;
    info!(
        component = "cli",
        event = "run_planned",
        service = %workflow.names().service,
        function = %workflow.names().function
    );

    let report = workflow.run().await?;
    info!(
        component = "cli",
        event = "completed",
        archive = %report.archive_path.display(),
        archive_bytes = report.archive_bytes,
        sha256 = %report.archive_sha256
    );
    Ok(())
}
