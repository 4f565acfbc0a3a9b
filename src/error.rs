//! Error types, one enum per pipeline stage.
//!
//! Each stage returns its own error so callers can branch on the failure
//! kind. [`Error`] wraps all of them for code that drives a whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for a whole pipeline run.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure of a pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Archive download failed.
    #[error(transparent)]
    Download(#[from] FetchError),

    /// Archive extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// The source record file could not be located.
    #[error(transparent)]
    SourceNotFound(#[from] LocateError),

    /// Conversion of the source record file failed.
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid source url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Archive download errors.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("GET {url} returned an empty body")]
    EmptyBody { url: String },

    #[error("failed to write {url} to {path}: {source}")]
    Io {
        url: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Archive extraction errors.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read archive {archive}: {source}")]
    Archive {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("unsafe entry {entry:?} in {archive}: {reason}")]
    UnsafeEntry {
        archive: PathBuf,
        entry: String,
        reason: &'static str,
    },

    #[error("extraction target {0} already exists")]
    TargetExists(PathBuf),

    #[error("I/O error extracting {archive} at {path}: {source}")]
    Io {
        archive: PathBuf,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// True when the archive was rejected for an entry escaping the target.
    pub fn is_unsafe_entry(&self) -> bool {
        matches!(self, ExtractError::UnsafeEntry { .. })
    }
}

/// Source file lookup errors.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no file ending with {suffix:?} in {dir}")]
    NotFound { dir: PathBuf, suffix: String },

    #[error("{} files ending with {suffix:?} in {dir}: {candidates:?}", .candidates.len())]
    Ambiguous {
        dir: PathBuf,
        suffix: String,
        candidates: Vec<PathBuf>,
    },

    #[error("failed to list {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Transcoding errors.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read header of {path}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{0} has no header row")]
    MissingHeader(PathBuf),

    #[error("failed to parse {path} after {rows} rows: {source}")]
    Parse {
        path: PathBuf,
        rows: u64,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("unsupported output format for {0} (expected .xlsx, .csv or .parquet)")]
    UnsupportedFormat(PathBuf),

    #[error("{path} exceeds the spreadsheet limit of {limit} rows")]
    RowLimit { path: PathBuf, limit: u32 },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
