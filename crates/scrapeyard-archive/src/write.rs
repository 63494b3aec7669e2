// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Writing archives from a directory tree.

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;
use crate::read::normalize;

/// Archive `dir` into an in-memory gzip-tar.
///
/// See [`create_to_writer`].
pub fn create<P: AsRef<Path>>(dir: &Path, ignore_paths: &[P]) -> Result<Vec<u8>> {
    create_to_writer(dir, ignore_paths, Vec::new())
}

/// Archive `dir` as gzip-tar into `writer`, returning the writer once the
/// gzip trailer has been written.
///
/// `ignore_paths` are relative to `dir`; an ignored directory is skipped with
/// everything under it. Symlinks are stored as links, never followed, and an
/// absolute link target is rewritten relative to the link's parent directory.
/// Entries are emitted in file-name order.
pub fn create_to_writer<W, P>(dir: &Path, ignore_paths: &[P], writer: W) -> Result<W>
where
    W: Write,
    P: AsRef<Path>,
{
    let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));
    builder.follow_symlinks(false);

    let mut walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        if ignore_paths.iter().any(|p| p.as_ref() == relative) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            debug!(path = %relative.display(), "Ignoring path");
            continue;
        }

        let metadata = fs::symlink_metadata(path)?;
        let file_type = metadata.file_type();

        let mut header = Header::new_gnu();
        header.set_mode(metadata.permissions().mode() & 0o7777);
        header.set_mtime(metadata.mtime().max(0) as u64);
        header.set_uid(u64::from(metadata.uid()));
        header.set_gid(u64::from(metadata.gid()));

        if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            builder.append_data(&mut header, relative, io::empty())?;
        } else if file_type.is_file() {
            header.set_entry_type(EntryType::Regular);
            header.set_size(metadata.len());
            builder.append_data(&mut header, relative, File::open(path)?)?;
        } else if file_type.is_symlink() {
            let mut target = fs::read_link(path)?;
            if target.is_absolute() {
                let parent = std::path::absolute(path)?
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("/"));
                target = relative_to(&target, &parent);
            }
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            builder.append_link(&mut header, relative, &target)?;
        } else {
            debug!(path = %relative.display(), "Skipping special file");
        }
    }

    builder.finish()?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Express the absolute path `target` relative to the absolute directory `base`.
fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target = normalize(target);
    let base = normalize(base);

    let target_parts: Vec<Component<'_>> = target.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = target_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
