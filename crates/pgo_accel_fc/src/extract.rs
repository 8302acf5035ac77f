use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use pgo_accel_core::{PgoError, Result};

/// How the acceleration archive is laid out once it reaches the local machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
    /// The archive is itself the artifact and stays where it was downloaded.
    Raw,
}

impl ArchiveFormat {
    pub fn keeps_archive(self) -> bool {
        matches!(self, Self::Raw)
    }
}

/// Unpacks `archive` into `dest_dir` and returns the number of entries placed.
pub fn unpack(format: ArchiveFormat, archive: &Path, dest_dir: &Path) -> Result<usize> {
    match format {
        ArchiveFormat::Raw => Ok(1),
        ArchiveFormat::TarGz => {
            let mut tarball = tar::Archive::new(GzDecoder::new(open(archive)?));
            tarball.set_preserve_permissions(true);
            let mut count = 0;
            for entry in tarball.entries().map_err(|error| unpack_error(archive, error))? {
                let mut entry = entry.map_err(|error| unpack_error(archive, error))?;
                if entry
                    .unpack_in(dest_dir)
                    .map_err(|error| unpack_error(archive, error))?
                {
                    count += 1;
                }
            }
            Ok(count)
        }
        ArchiveFormat::Zip => unpack_zip(archive, dest_dir),
    }
}

const FILE_TYPE_MASK: u32 = 0o170000;
const SYMLINK_TYPE: u32 = 0o120000;

/// Restores directories, symlinks and file modes recorded in the entries'
/// unix attributes.
fn unpack_zip(archive: &Path, dest_dir: &Path) -> Result<usize> {
    let mut zip = zip::ZipArchive::new(BufReader::new(open(archive)?))
        .map_err(|error| unpack_error(archive, error))?;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|error| unpack_error(archive, error))?;
        let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            unpack_error(archive, format!("entry {} escapes the destination", entry.name()))
        })?;
        let target = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|error| unpack_error(archive, error))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| unpack_error(archive, error))?;
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(|mode| mode & FILE_TYPE_MASK == SYMLINK_TYPE) {
            let mut link_target = String::new();
            entry
                .read_to_string(&mut link_target)
                .map_err(|error| unpack_error(archive, error))?;
            restore_link(&link_target, &target).map_err(|error| unpack_error(archive, error))?;
            continue;
        }

        let mut file = File::create(&target).map_err(|error| unpack_error(archive, error))?;
        io::copy(&mut entry, &mut file).map_err(|error| unpack_error(archive, error))?;
        if let Some(mode) = mode {
            set_mode(&target, mode).map_err(|error| unpack_error(archive, error))?;
        }
    }
    Ok(zip.len())
}

#[cfg(unix)]
fn restore_link(link_target: &str, path: &Path) -> io::Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path)?;
    }
    std::os::unix::fs::symlink(link_target, path)
}

#[cfg(not(unix))]
fn restore_link(link_target: &str, path: &Path) -> io::Result<()> {
    fs::write(path, link_target)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

fn open(archive: &Path) -> Result<File> {
    File::open(archive).map_err(|error| {
        PgoError::Transfer(format!("failed to open {}: {error}", archive.display()))
    })
}

fn unpack_error(archive: &Path, error: impl std::fmt::Display) -> PgoError {
    PgoError::Transfer(format!("failed to extract {}: {error}", archive.display()))
}
