//! Archive Extractor: unpack the export into a directory, refusing any entry
//! that would land outside of it.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Seek, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, trace, warn};
use zip::ZipArchive;

use crate::error::ExtractError;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Directory produced by [`extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTree {
    pub root: PathBuf,
    /// Regular files written, relative to `root`, in archive order.
    pub files: Vec<PathBuf>,
}

struct PlannedEntry {
    index: usize,
    rel: PathBuf,
    is_dir: bool,
}

/// Unpack `archive_path` into `target_dir`, keeping the archive's directory
/// layout.
///
/// Every entry is checked before anything is written; one unsafe entry
/// rejects the whole archive. Entries are written into a staging directory
/// beside `target_dir`, which is renamed into place once all of them
/// succeeded. `target_dir` must not exist yet. With `cleanup` the archive
/// is removed afterwards.
#[instrument(level = "debug", skip_all, fields(archive = %archive_path.as_ref().display()))]
pub fn extract(
    archive_path: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
    cleanup: bool,
) -> Result<ExtractedTree, ExtractError> {
    let archive_path = archive_path.as_ref();
    let target = target_dir.as_ref();
    let io_err = |path: &Path, source| ExtractError::Io {
        archive: archive_path.to_path_buf(),
        path: path.to_path_buf(),
        source,
    };
    let zip_err = |source| ExtractError::Archive {
        archive: archive_path.to_path_buf(),
        source,
    };

    if target.exists() {
        return Err(ExtractError::TargetExists(target.to_path_buf()));
    }

    let file = File::open(archive_path).map_err(|e| io_err(archive_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;
    let plan = plan_entries(&mut archive, archive_path)?;
    debug!(entries = plan.len(), "archive entries validated");

    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)
        .map_err(|e| io_err(parent, e))?;

    let mut files = Vec::new();
    for entry in &plan {
        let out = staging.path().join(&entry.rel);
        if entry.is_dir {
            fs::create_dir_all(&out).map_err(|e| io_err(&out, e))?;
            continue;
        }
        if let Some(dir) = out.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let mut src = archive.by_index(entry.index).map_err(zip_err)?;
        let mut dst = BufWriter::new(File::create(&out).map_err(|e| io_err(&out, e))?);
        let written = io::copy(&mut src, &mut dst).map_err(|e| io_err(&out, e))?;
        dst.flush().map_err(|e| io_err(&out, e))?;
        trace!(entry = %entry.rel.display(), bytes = written, "extracted");
        files.push(entry.rel.clone());
    }
    drop(archive);

    fs::rename(staging.path(), target).map_err(|e| io_err(target, e))?;

    if cleanup {
        if let Err(e) = fs::remove_file(archive_path) {
            warn!(error = %e, "could not remove archive after extraction");
        }
    }

    Ok(ExtractedTree {
        root: target.to_path_buf(),
        files,
    })
}

/// Validate every entry name and decide where it goes.
fn plan_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
) -> Result<Vec<PlannedEntry>, ExtractError> {
    let mut plan = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|source| ExtractError::Archive {
                archive: archive_path.to_path_buf(),
                source,
            })?;
        let name = entry.name().to_string();
        let unsafe_entry = |reason| ExtractError::UnsafeEntry {
            archive: archive_path.to_path_buf(),
            entry: name.clone(),
            reason,
        };

        if entry.unix_mode().is_some_and(|m| m & S_IFMT == S_IFLNK) {
            return Err(unsafe_entry("symbolic link"));
        }
        let rel = relative_entry_path(&name).map_err(unsafe_entry)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        plan.push(PlannedEntry {
            index,
            rel,
            is_dir: entry.is_dir(),
        });
    }
    Ok(plan)
}

/// Turn an entry name into a path relative to the extraction root.
///
/// Only plain name segments survive; `.` and empty segments are dropped.
fn relative_entry_path(name: &str) -> Result<PathBuf, &'static str> {
    if name.contains('\0') {
        return Err("NUL byte in name");
    }
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err("absolute path");
    }

    let mut rel = PathBuf::new();
    for (i, part) in normalized.split('/').enumerate() {
        match part {
            "" | "." => continue,
            ".." => return Err("parent directory component"),
            p if i == 0 && p.len() == 2 && p.ends_with(':') => return Err("drive prefix"),
            p => rel.push(p),
        }
    }
    Ok(rel)
}
