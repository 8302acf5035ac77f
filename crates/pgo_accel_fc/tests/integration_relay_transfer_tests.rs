mod support;

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pgo_accel_core::config::{RuntimeKind, TransportMethod, DEFAULT_SRPATH};
use pgo_accel_core::PgoError;
use pgo_accel_fc::{AccelerationWorkflow, Phase};
use support::{
    base_config, names_for, patterned_bytes, tar_gz, with_file_share, FakePlatform, Fakes,
    Workspace,
};

const RELAY_BUCKET: &str = "pgo-t1";
const NAS_ARCHIVE: &str = "/mnt/nas/pgo/t1/require_cache.strrc";

fn java_workspace() -> Workspace {
    let workspace = Workspace::new();
    workspace.write("pom.xml", "<project/>");
    workspace.write("src/main/java/com/demo/App.java", "class App {}");
    workspace.write("target/classes/com/demo/App.class", "app-bytes");
    workspace.write("target/classes/AccelerationHelper.class", "helper-bytes");
    workspace.write("target/lib/guava.jar", "jar-bytes");
    workspace
}

fn zip_mode(encoded: &str, entry: &str) -> u32 {
    let bytes = BASE64.decode(encoded).expect("code zip is base64");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let file = archive.by_name(entry).expect("entry present");
    file.unix_mode().expect("unix mode recorded") & 0o777
}

#[tokio::test]
async fn java_trace_relays_through_bucket_and_merges_build_output() {
    let workspace = java_workspace();
    let archive = tar_gz(&[("quickstart/cache.data", b"trace-bytes")]);
    let fakes = Fakes::new(FakePlatform::serving(Vec::new()));
    fakes.object_store.put(RELAY_BUCKET, "srctl.tar.gz", archive.clone());
    let config = base_config(
        RuntimeKind::Java,
        "java11",
        &workspace,
        TransportMethod::Oss,
        TransportMethod::Stream,
    );

    let report = AccelerationWorkflow::new(config, fakes.collaborators())
        .expect("valid config")
        .with_names(names_for(RuntimeKind::Java))
        .with_scratch_dir(workspace.scratch.path())
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(report.phase, Phase::CleanedUp);
    assert_eq!(report.archive_bytes, archive.len() as u64);
    assert_eq!(
        std::fs::read(workspace.shared_dir().join("quickstart/cache.data")).expect("extracted"),
        b"trace-bytes"
    );
    assert!(!workspace.shared_dir().join("srctl.tar.gz").exists());
    assert!(!fakes.object_store.bucket_exists(RELAY_BUCKET));

    let actions = fakes.platform.actions();
    let dump = &actions[0];
    assert_eq!(dump["method"], "jcmd");
    assert_eq!(dump["bucket"], RELAY_BUCKET);
    assert_eq!(dump["accessKeyId"], "test-ak");
    assert_eq!(dump["endpoint"], "oss-cn-chengdu-internal.aliyuncs.com");
    assert_eq!(actions.len(), 1, "bucket relay needs no chunked reads");

    assert_eq!(
        fakes.tools.fetched(),
        vec!["https://tools.example.com/ossutil64".to_string()]
    );
    let commands = fakes.commands.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].starts_with("mvn clean compile"));
    assert!(commands[1].ends_with("dependency:copy-dependencies"));

    let function = fakes.platform.function_specs().pop().expect("function created");
    assert_eq!(function.handler, "AccelerationHelper::handleRequest");
    assert_eq!(function.environment_variables["BOOTSTRAP_WRAPPER"], "/code/quickstart.sh");
    assert_eq!(zip_mode(&function.code.zip_file, "quickstart.sh"), 0o755);
    assert_eq!(zip_mode(&function.code.zip_file, "ossutil64"), 0o755);
    let trigger = fakes.platform.trigger_specs().pop().expect("trigger created");
    assert_eq!(trigger.trigger_config.methods, vec!["POST"]);

    let artifact = workspace.artifact_dir();
    assert!(artifact.join("com/demo/App.class").is_file());
    assert!(artifact.join("lib/guava.jar").is_file());
    assert!(artifact.join("quickstart.sh").is_file());
    assert!(artifact.join("sr/classloader-config.xml").is_file());
    assert!(!artifact.join("AccelerationHelper.class").exists());
    assert!(!workspace.root().join("target/classes/AccelerationHelper.class").exists());
    assert!(!workspace.root().join("src/main/java/AccelerationHelper.java").exists());
    assert!(fakes.platform.live_services().is_empty());
}

#[tokio::test]
async fn leftover_object_in_relay_bucket_fails_transfer_and_bucket_is_discarded() {
    let workspace = java_workspace();
    let fakes = Fakes::new(FakePlatform::serving(Vec::new()));
    fakes.object_store.put(RELAY_BUCKET, "srctl.tar.gz", tar_gz(&[("a", b"b")]));
    fakes.object_store.put(RELAY_BUCKET, "core.1234", b"crash".to_vec());
    let config = base_config(
        RuntimeKind::Java,
        "java11",
        &workspace,
        TransportMethod::Oss,
        TransportMethod::Stream,
    );

    let error = AccelerationWorkflow::new(config, fakes.collaborators())
        .expect("valid config")
        .with_names(names_for(RuntimeKind::Java))
        .with_scratch_dir(workspace.scratch.path())
        .run()
        .await
        .expect_err("non-empty bucket must fail");

    assert!(matches!(error, PgoError::Transfer(_)), "got {error:?}");
    assert!(error.to_string().contains("core.1234"));
    assert!(!fakes.object_store.bucket_exists(RELAY_BUCKET));
    assert!(fakes.platform.live_services().is_empty());
    assert!(!workspace.artifact_dir().join("quickstart.sh").exists(), "no merge after a failed transfer");
}

#[tokio::test]
async fn unreachable_tool_url_is_a_tool_download_error() {
    let workspace = java_workspace();
    let mut fakes = Fakes::new(FakePlatform::serving(Vec::new()));
    fakes.tools = std::sync::Arc::new(support::StaticToolFetcher::default());
    let config = base_config(
        RuntimeKind::Java,
        "java11",
        &workspace,
        TransportMethod::Oss,
        TransportMethod::Stream,
    );

    let error = AccelerationWorkflow::new(config, fakes.collaborators())
        .expect("valid config")
        .with_scratch_dir(workspace.scratch.path())
        .run()
        .await
        .expect_err("tool download must fail");

    assert!(matches!(error, PgoError::ToolDownload(_)), "got {error:?}");
    assert!(fakes.platform.calls().is_empty());
    assert!(workspace.scratch_entries().is_empty());
}

#[tokio::test]
async fn nas_relay_pulls_snapshot_from_mount() {
    let workspace = Workspace::new();
    workspace.write("index.js", "exports.handler = () => {};");
    let snapshot = patterned_bytes(2048);
    let fakes = Fakes::new(FakePlatform::serving(Vec::new()));
    fakes.file_share.put(NAS_ARCHIVE, snapshot.clone());
    let config = with_file_share(base_config(
        RuntimeKind::Node,
        "nodejs14",
        &workspace,
        TransportMethod::Nas,
        TransportMethod::Nas,
    ));

    let report = AccelerationWorkflow::new(config, fakes.collaborators())
        .expect("valid config")
        .with_names(names_for(RuntimeKind::Node))
        .with_scratch_dir(workspace.scratch.path())
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(report.archive_bytes, snapshot.len() as u64);
    assert_eq!(std::fs::read(&report.archive_path).expect("snapshot"), snapshot);
    assert_eq!(fakes.file_share.downloads(), vec![NAS_ARCHIVE.to_string()]);
    assert_eq!(fakes.file_share.removals(), vec!["/mnt/nas/pgo/t1".to_string()]);
    assert!(!fakes.file_share.contains(NAS_ARCHIVE), "relay copy is removed from the share");

    let actions = fakes.platform.actions();
    let dump = &actions[0];
    assert_eq!(dump["nasFilePath"], NAS_ARCHIVE);
    assert_eq!(dump["srpath"], "/mnt/nas/app/runtime.data.share");

    let service = fakes.platform.service_specs().pop().expect("service created");
    let nas = service.nas_config.expect("nas mounted on temp service");
    assert_eq!(nas.mount_points[0].server_addr, "abc.cn-chengdu.nas.aliyuncs.com:/demo");
    assert_eq!(nas.mount_points[0].mount_dir, "/mnt/nas");
    assert!(service.vpc_config.is_some());
    assert!(fakes.platform.live_services().is_empty());
}

#[tokio::test]
async fn nas_relay_without_file_on_mount_is_a_transfer_error() {
    let workspace = Workspace::new();
    workspace.write("index.js", "exports.handler = () => {};");
    workspace.write("target/artifact/runtime.data.share/require_cache.strrc", "stale");
    let fakes = Fakes::new(FakePlatform::serving(Vec::new()));
    let mut config = with_file_share(base_config(
        RuntimeKind::Node,
        "nodejs14",
        &workspace,
        TransportMethod::Nas,
        TransportMethod::Stream,
    ));
    config.srpath = DEFAULT_SRPATH.to_string();

    let error = AccelerationWorkflow::new(config, fakes.collaborators())
        .expect("valid config")
        .with_names(names_for(RuntimeKind::Node))
        .with_scratch_dir(workspace.scratch.path())
        .run()
        .await
        .expect_err("missing file must fail");

    assert!(matches!(error, PgoError::Transfer(_)), "got {error:?}");
    assert!(error.to_string().contains("does not exist"));
    assert!(
        !workspace.shared_dir().join("require_cache.strrc").exists(),
        "stale snapshot is removed before the download"
    );
    assert_eq!(fakes.file_share.removals(), vec!["/mnt/nas/pgo/t1".to_string()]);
    assert!(fakes.platform.live_services().is_empty());
}
