use reqwest::blocking::Client;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::FetchError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// What [`fetch`] did to put the archive in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A non-empty file was already at the destination; no request was made.
    Cached { path: PathBuf, bytes: u64 },
    /// The archive was downloaded and moved onto the destination.
    Downloaded { path: PathBuf, bytes: u64 },
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FetchOutcome::Cached { path, .. } | FetchOutcome::Downloaded { path, .. } => path,
        }
    }

    pub fn bytes(&self) -> u64 {
        match self {
            FetchOutcome::Cached { bytes, .. } | FetchOutcome::Downloaded { bytes, .. } => *bytes,
        }
    }

    pub fn was_cached(&self) -> bool {
        matches!(self, FetchOutcome::Cached { .. })
    }
}

/// Blocking client suited to one large download: bounded connect time, but
/// no overall deadline on the transfer.
pub fn default_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None)
        .build()
}

/// Download `url` to `dest` unless a non-empty file is already there.
///
/// The body is streamed into a temporary file next to `dest` and renamed onto
/// it only once the whole transfer succeeded, so a failed download never
/// leaves a file that a later call would mistake for a finished one. The
/// parent directory of `dest` must exist. No retries.
#[instrument(level = "debug", skip(client, dest), fields(dest = %dest.as_ref().display()))]
pub fn fetch(
    client: &Client,
    url: &str,
    dest: impl AsRef<Path>,
) -> Result<FetchOutcome, FetchError> {
    let dest = dest.as_ref();

    if let Some(bytes) = cached_size(dest) {
        debug!(bytes, "archive already present; skipping download");
        return Ok(FetchOutcome::Cached {
            path: dest.to_path_buf(),
            bytes,
        });
    }

    let io_err = |source| FetchError::Io {
        url: url.to_string(),
        path: dest.to_path_buf(),
        source,
    };

    let mut resp = client.get(url).send().map_err(|source| FetchError::Transport {
        url: url.to_string(),
        source,
    })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    let bytes = resp
        .copy_to(tmp.as_file_mut())
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
    if bytes == 0 {
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(dest).map_err(|e| io_err(e.error))?;

    debug!(bytes, "archive downloaded");
    Ok(FetchOutcome::Downloaded {
        path: dest.to_path_buf(),
        bytes,
    })
}

/// Size of the file at `path` if it counts as already downloaded.
fn cached_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|m| m.is_file() && m.len() > 0)
        .map(|m| m.len())
}
