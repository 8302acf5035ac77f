use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

pub const REMOTE_TMP_DIR: &str = "/tmp";
pub const BUILD_OUTPUT_DIR: &str = "target";
pub const COMPILED_CLASSES_SEGMENT: &str = "classes";

/// Per-run token embedded in every temporary name so concurrent runs from
/// different machines do not collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunToken(String);

impl RunToken {
    pub fn generate() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", Utc::now().timestamp_millis(), &random[..8]))
    }

    /// Fixed token, used where names must be reproducible.
    pub fn from_value(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Names of everything a single run creates, locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempNames {
    pub token: RunToken,
    pub service: String,
    pub function: String,
    pub trigger: String,
    pub bucket: String,
    pub staging_dir: String,
    pub zip_file: String,
}

impl TempNames {
    pub fn new(name_base: &str, token: RunToken) -> Self {
        let value = token.as_str();
        Self {
            service: format!("{name_base}-service-{value}"),
            function: format!("{name_base}-func-{value}"),
            trigger: format!("{name_base}-trigger-{value}"),
            bucket: format!("pgo-{}", value.to_ascii_lowercase()),
            staging_dir: format!("{name_base}-tmp-{value}"),
            zip_file: format!("{name_base}-tmp-{value}.zip"),
            token,
        }
    }

    pub fn generate(name_base: &str) -> Self {
        Self::new(name_base, RunToken::generate())
    }
}

pub fn remote_archive_path(archive_name: &str) -> String {
    format!("{REMOTE_TMP_DIR}/{archive_name}")
}

/// `<artifact-root>/<shared-dir-name>`
pub fn local_shared_dir(artifact_root: &Path, shared_dir_name: &str) -> PathBuf {
    artifact_root.join(shared_dir_name)
}

/// `<artifact-root>/<shared-dir-name>/<archive-name>`
pub fn local_archive_path(artifact_root: &Path, shared_dir_name: &str, archive_name: &str) -> PathBuf {
    local_shared_dir(artifact_root, shared_dir_name).join(archive_name)
}

/// Location on the NAS mount the remote side copies the archive to.
pub fn nas_file_path(mount_dir: &str, token: &RunToken, archive_name: &str) -> String {
    format!(
        "{}/pgo/{}/{archive_name}",
        mount_dir.trim_end_matches('/'),
        token.as_str()
    )
}

/// Maps a path relative to the project root inside the build tree onto a path
/// relative to the artifact root.
///
/// The leading `target/` is stripped; if a `classes` segment remains,
/// everything up to and including it is stripped too. Returns `None` for paths
/// outside the build tree or that rewrite to nothing.
pub fn rewrite_build_output_path(relative: &str) -> Option<String> {
    let segments: Vec<&str> = relative
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    let (first, rest) = segments.split_first()?;
    if *first != BUILD_OUTPUT_DIR {
        return None;
    }

    let rest = match rest
        .iter()
        .position(|segment| *segment == COMPILED_CLASSES_SEGMENT)
    {
        Some(index) => &rest[index + 1..],
        None => rest,
    };

    if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    }
}

/// Build-tree entries never copied into the staging dir or the artifact.
pub fn is_ignored_build_path(relative: &str, artifact_dir_name: &str) -> bool {
    let segments: Vec<&str> = relative
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.first() != Some(&BUILD_OUTPUT_DIR) {
        return false;
    }
    let Some(top) = segments.get(1) else {
        return false;
    };
    *top == artifact_dir_name
        || *top == "sr"
        || *top == "dependency"
        || top.starts_with("maven")
        || top.contains("sources")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_names_share_the_run_token() {
        let names = TempNames::new("trace-dump", RunToken::from_value("1700000000000-ab12CD34"));
        assert_eq!(names.service, "trace-dump-service-1700000000000-ab12CD34");
        assert_eq!(names.function, "trace-dump-func-1700000000000-ab12CD34");
        assert_eq!(names.trigger, "trace-dump-trigger-1700000000000-ab12CD34");
        assert_eq!(names.bucket, "pgo-1700000000000-ab12cd34");
        assert_eq!(names.zip_file, "trace-dump-tmp-1700000000000-ab12CD34.zip");
    }

    #[test]
    fn generated_tokens_differ() {
        assert_ne!(RunToken::generate(), RunToken::generate());
    }

    #[test]
    fn builds_local_archive_layout() {
        let path = local_archive_path(Path::new("/w/target/artifact"), "runtime.data.share", "srctl.tar.gz");
        assert_eq!(path, PathBuf::from("/w/target/artifact/runtime.data.share/srctl.tar.gz"));
        assert_eq!(remote_archive_path("srctl.tar.gz"), "/tmp/srctl.tar.gz");
    }

    #[test]
    fn builds_nas_file_path_under_mount() {
        let token = RunToken::from_value("1-a");
        assert_eq!(nas_file_path("/mnt/nas/", &token, "srctl.tar.gz"), "/mnt/nas/pgo/1-a/srctl.tar.gz");
    }

    #[test]
    fn rewrite_strips_build_prefix_and_classes_segment() {
        assert_eq!(
            rewrite_build_output_path("target/classes/com/demo/App.class").as_deref(),
            Some("com/demo/App.class")
        );
        assert_eq!(
            rewrite_build_output_path("target/lib/guava.jar").as_deref(),
            Some("lib/guava.jar")
        );
        assert_eq!(
            rewrite_build_output_path("target/generated/classes/A.class").as_deref(),
            Some("A.class")
        );
        assert_eq!(
            rewrite_build_output_path("target/subclasses/A.class").as_deref(),
            Some("subclasses/A.class")
        );
        assert_eq!(rewrite_build_output_path("target/classes"), None);
        assert_eq!(rewrite_build_output_path("src/main/java/A.java"), None);
    }

    #[test]
    fn ignores_tool_directories_in_build_tree() {
        assert!(is_ignored_build_path("target/artifact/x", "artifact"));
        assert!(is_ignored_build_path("target/maven-status/y", "artifact"));
        assert!(is_ignored_build_path("target/demo-1.0-sources.jar", "artifact"));
        assert!(is_ignored_build_path("target/sr", "artifact"));
        assert!(!is_ignored_build_path("target/classes/A.class", "artifact"));
        assert!(!is_ignored_build_path("target", "artifact"));
    }
}
