//! Zips a staging tree into function code.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use pgo_accel_core::{PgoError, Result};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;
pub const EXECUTABLE_MODE: u32 = 0o755;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// Relative entry path (forward slashes) to the mode it must carry.
    pub permission_overrides: BTreeMap<String, u32>,
    pub compression_level: i32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            permission_overrides: BTreeMap::new(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl PackOptions {
    pub fn executable(mut self, entry: impl Into<String>) -> Self {
        self.permission_overrides.insert(entry.into(), EXECUTABLE_MODE);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
}

pub fn pack(source_dir: &Path, dest_zip: &Path, options: &PackOptions) -> Result<PackSummary> {
    let file = File::create(dest_zip).map_err(|error| {
        PgoError::Packaging(format!("failed to create {}: {error}", dest_zip.display()))
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let base_options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(options.compression_level));
    let mut summary = PackSummary::default();

    for entry in WalkDir::new(source_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|error| {
            PgoError::Packaging(format!("failed to walk {}: {error}", source_dir.display()))
        })?;
        let path = entry.path();
        let name = entry_name(source_dir, path)?;
        let metadata = fs::symlink_metadata(path).map_err(|error| {
            PgoError::Packaging(format!("failed to stat {}: {error}", path.display()))
        })?;
        let mode = options
            .permission_overrides
            .get(&name)
            .copied()
            .unwrap_or_else(|| source_mode(&metadata));
        let entry_options = base_options.unix_permissions(mode);
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            zip.add_directory(name.as_str(), entry_options)
                .map_err(|error| packaging_error(&name, error))?;
            summary.directories += 1;
        } else if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(|error| {
                PgoError::Packaging(format!("failed to read link {}: {error}", path.display()))
            })?;
            let target = normalize_link_target(&target, path, cfg!(windows));
            zip.add_symlink(name.as_str(), target.as_str(), entry_options)
                .map_err(|error| packaging_error(&name, error))?;
            summary.symlinks += 1;
        } else if file_type.is_file() {
            zip.start_file(name.as_str(), entry_options)
                .map_err(|error| packaging_error(&name, error))?;
            let mut reader = File::open(path).map_err(|error| {
                PgoError::Packaging(format!("failed to open {}: {error}", path.display()))
            })?;
            io::copy(&mut reader, &mut zip).map_err(|error| {
                PgoError::Packaging(format!("failed to write {name}: {error}"))
            })?;
            summary.files += 1;
        }
    }

    zip.finish()
        .map_err(|error| PgoError::Packaging(format!("failed to finish zip: {error}")))?;
    debug!(
        component = "packager",
        event = "zip_written",
        zip = %dest_zip.display(),
        files = summary.files,
        directories = summary.directories,
        symlinks = summary.symlinks
    );
    Ok(summary)
}

/// Link text stored in the archive. On Windows hosts the target is expressed
/// relative to the link's own directory with forward slashes.
pub fn normalize_link_target(target: &Path, link_path: &Path, is_windows: bool) -> String {
    if !is_windows {
        return target.to_string_lossy().into_owned();
    }
    let base = link_path.parent().unwrap_or_else(|| Path::new(""));
    let absolute = if target.is_absolute() || target.has_root() {
        target.to_path_buf()
    } else {
        base.join(target)
    };
    relative_to(&absolute, base)
        .to_string_lossy()
        .replace('\\', "/")
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component<'_>> = path.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let shared = path
        .iter()
        .zip(base.iter())
        .take_while(|(left, right)| left == right)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base.len() {
        relative.push("..");
    }
    for component in &path[shared..] {
        relative.push(component.as_os_str());
    }
    relative
}

fn entry_name(source_dir: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(source_dir).map_err(|_| {
        PgoError::Packaging(format!(
            "{} is outside {}",
            path.display(),
            source_dir.display()
        ))
    })?;
    let segments: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(segments.join("/"))
}

#[cfg(unix)]
fn source_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn source_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn packaging_error(name: &str, error: zip::result::ZipError) -> PgoError {
    PgoError::Packaging(format!("failed to add {name}: {error}"))
}
