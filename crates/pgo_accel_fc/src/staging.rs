//! Local file-tree copies used to stage function code and to merge build
//! output into the artifact directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pgo_accel_core::naming::{is_ignored_build_path, rewrite_build_output_path, BUILD_OUTPUT_DIR};
use walkdir::WalkDir;

const VCS_DIRS: [&str; 3] = [".git", ".svn", ".hg"];

/// Copies the project tree into `dest`, dotfiles included, skipping VCS
/// metadata and the artifact directory when it sits inside the project.
pub fn copy_project_tree(project_root: &Path, artifact_dir: &Path, dest: &Path) -> io::Result<usize> {
    let artifact_relative = artifact_dir.strip_prefix(project_root).ok().map(Path::to_path_buf);
    let mut copied = 0;
    let mut walker = WalkDir::new(project_root)
        .min_depth(1)
        .follow_links(false)
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(project_root)
            .map_err(io::Error::other)?
            .to_path_buf();
        let skipped = relative
            .components()
            .next()
            .is_some_and(|first| VCS_DIRS.iter().any(|vcs| first.as_os_str() == *vcs))
            || artifact_relative.as_deref() == Some(relative.as_path())
            || dest.starts_with(entry.path());
        if skipped {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        copy_entry(entry.path(), &dest.join(&relative), entry.file_type())?;
        copied += 1;
    }
    Ok(copied)
}

/// Copies `<project>/target` into `dest`, mapping each path through
/// [`rewrite_build_output_path`]. Tool directories are ignored and the bare
/// `classes` and `lib` directories are not copied as entries.
pub fn copy_build_output(project_root: &Path, artifact_dir: &Path, dest: &Path) -> io::Result<usize> {
    let build_root = project_root.join(BUILD_OUTPUT_DIR);
    if !build_root.is_dir() {
        return Ok(0);
    }
    let artifact_dir_name = artifact_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut copied = 0;
    let mut walker = WalkDir::new(&build_root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = slash_path(entry.path().strip_prefix(project_root).map_err(io::Error::other)?);

        if is_ignored_build_path(&relative, &artifact_dir_name) || dest.starts_with(entry.path()) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        if relative == format!("{BUILD_OUTPUT_DIR}/classes") || relative == format!("{BUILD_OUTPUT_DIR}/lib") {
            continue;
        }
        let Some(rewritten) = rewrite_build_output_path(&relative) else {
            continue;
        };
        copy_entry(entry.path(), &dest.join(rewritten), entry.file_type())?;
        copied += 1;
    }
    Ok(copied)
}

/// Writes `contents` at `dest`, creating parent directories.
pub fn write_file(dest: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, contents)
}

/// Removes a file or directory tree; a missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn copy_entry(source: &Path, target: &Path, file_type: fs::FileType) -> io::Result<()> {
    if file_type.is_dir() {
        return fs::create_dir_all(target);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if file_type.is_symlink() {
        return copy_symlink(source, target);
    }
    fs::copy(source, target).map(|_| ())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    let link: PathBuf = fs::read_link(source)?;
    remove_path(target)?;
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
