// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reading archives.

use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::error::{ArchiveError, Result};

/// Counts bytes pulled from the underlying reader so an empty body can be told
/// apart from an empty archive.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// An entry that passed the policy checks.
enum EntryKind {
    Dir,
    File { mode: u32 },
    Symlink { target: PathBuf },
}

fn format_err(e: io::Error) -> ArchiveError {
    ArchiveError::format(e.to_string())
}

fn check_entry_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(ArchiveError::format("entry with empty name"));
    }
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::format(format!(
                    "absolute path {}",
                    path.display()
                )));
            }
            Component::ParentDir => {
                return Err(ArchiveError::format(format!(
                    "path {} escapes the archive root",
                    path.display()
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

/// Walk every entry of a gzip-tar stream, checking the policy before handing
/// each one to `visit`. The stream is consumed to its end.
fn for_each_entry<R, F>(reader: R, mut visit: F) -> Result<()>
where
    R: Read,
    F: FnMut(&Path, EntryKind, &mut dyn Read) -> Result<()>,
{
    let counting = CountingReader {
        inner: reader,
        count: 0,
    };
    let mut archive = Archive::new(GzDecoder::new(counting));

    for entry in archive.entries().map_err(format_err)? {
        let mut entry = entry.map_err(format_err)?;
        let path = entry.path().map_err(format_err)?.into_owned();
        check_entry_path(&path)?;

        let entry_type = entry.header().entry_type();
        let kind = if entry_type.is_dir() {
            EntryKind::Dir
        } else if entry_type.is_file() {
            let mode = entry.header().mode().map_err(format_err)? & 0o7777;
            EntryKind::File { mode }
        } else if entry_type.is_symlink() {
            let target = entry
                .link_name()
                .map_err(format_err)?
                .ok_or_else(|| {
                    ArchiveError::format(format!("symlink {} has no target", path.display()))
                })?
                .into_owned();
            if target.is_absolute() {
                return Err(ArchiveError::format(format!(
                    "symlink {} has absolute target {}",
                    path.display(),
                    target.display()
                )));
            }
            EntryKind::Symlink { target }
        } else {
            return Err(ArchiveError::format(format!(
                "unexpected entry type {:?} for {}",
                entry_type,
                path.display()
            )));
        };

        visit(&path, kind, &mut entry)?;
    }

    // Read through the tar padding and gzip trailer so the checksum is verified
    // and the whole body has passed through the reader.
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink()).map_err(format_err)?;

    if decoder.into_inner().count == 0 {
        return Err(ArchiveError::format("empty archive"));
    }
    Ok(())
}

/// Check a gzip-tar stream against the archive policy without writing anything.
///
/// The whole stream is consumed. Any malformed header, absolute path, absolute
/// link target or unsupported entry type yields [`ArchiveError::Format`].
pub fn validate<R: Read>(reader: R) -> Result<()> {
    for_each_entry(reader, |_, _, _| Ok(()))
}

/// Validate a gzip-tar stream and materialize it under `dir`.
///
/// Directories are created with mode 0755, regular files keep their archived
/// mode, and symlink targets are resolved against the link's parent directory.
pub fn extract<R: Read>(reader: R, dir: &Path) -> Result<()> {
    for_each_entry(reader, |path, kind, data| {
        let dest = dir.join(path);
        match kind {
            EntryKind::Dir => {
                if dest != dir {
                    DirBuilder::new().recursive(true).mode(0o755).create(&dest)?;
                }
            }
            EntryKind::File { mode } => {
                create_parent(&dest)?;
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(mode)
                    .open(&dest)?;
                io::copy(data, &mut file)?;
                // The mode passed to open is filtered by the umask.
                fs::set_permissions(&dest, Permissions::from_mode(mode))?;
            }
            EntryKind::Symlink { target } => {
                create_parent(&dest)?;
                let parent = dest.parent().unwrap_or(dir);
                let resolved = normalize(&parent.join(&target));
                if fs::symlink_metadata(&dest).is_ok() {
                    fs::remove_file(&dest)?;
                }
                std::os::unix::fs::symlink(&resolved, &dest)?;
                debug!(link = %dest.display(), target = %resolved.display(), "Extracted symlink");
            }
        }
        Ok(())
    })
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            DirBuilder::new().recursive(true).mode(0o755).create(parent)
        }
        _ => Ok(()),
    }
}

/// Lexically remove `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_entry_path() {
        assert!(check_entry_path(Path::new("a/b.txt")).is_ok());
        assert!(check_entry_path(Path::new("./a")).is_ok());
        assert!(check_entry_path(Path::new("/etc/passwd")).is_err());
        assert!(check_entry_path(Path::new("a/../../b")).is_err());
        assert!(check_entry_path(Path::new("")).is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("a/./b")), PathBuf::from("a/b"));
    }

    #[test]
    fn test_empty_input_is_a_format_error() {
        let err = validate(io::empty()).unwrap_err();
        assert!(err.is_format());
    }
}
