use chrono::NaiveDate;
use serde::Deserialize;
use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
use url::Url;

use crate::error::ConfigError;
use crate::transcode::{OutputFormat, TranscodeOptions};

/// County export of the preliminary appraisal roll.
pub const DEFAULT_SOURCE_URL: &str = "https://maps.graysonappraisal.org/export/Preliminary_Export.zip";

/// Marker at the end of the record file's name inside the export.
pub const DEFAULT_SOURCE_SUFFIX: &str = "_APPRAISAL_INFO.TXT";

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// User-facing settings, as read from a YAML file. Every field has a default,
/// so an empty document is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub source_url: String,
    /// Holds the cached archive and the extracted tree.
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_stem: String,
    pub output_stem: String,
    pub output_format: OutputFormat,
    pub source_suffix: String,
    pub chunk_size: usize,
    pub delimiter: char,
    /// Delete the archive once it has been extracted.
    pub cleanup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            work_dir: PathBuf::from("tmp"),
            output_dir: PathBuf::from("."),
            archive_stem: "Preliminary_Export".to_string(),
            output_stem: "Appraisal_Data".to_string(),
            output_format: OutputFormat::Xlsx,
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            delimiter: ',',
            cleanup: false,
        }
    }
}

impl Settings {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Freeze these settings into the configuration of one run, stamping every
    /// derived path with `date`.
    pub fn resolve(&self, date: NaiveDate) -> Result<RunConfig, ConfigError> {
        let source_url = Url::parse(&self.source_url).map_err(|source| ConfigError::InvalidUrl {
            url: self.source_url.clone(),
            source,
        })?;
        let chunk_size =
            NonZeroUsize::new(self.chunk_size).ok_or_else(|| ConfigError::InvalidValue {
                field: "chunk_size",
                reason: "must be greater than zero".into(),
            })?;
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::InvalidValue {
                field: "delimiter",
                reason: format!("{:?} is not a single ASCII character", self.delimiter),
            });
        }
        if self.source_suffix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "source_suffix",
                reason: "must not be empty".into(),
            });
        }

        let stamp = date.format("%Y%m%d").to_string();
        let run_name = format!("{}_{}", self.archive_stem, stamp);

        Ok(RunConfig {
            source_url,
            archive_path: self.work_dir.join(format!("{run_name}.zip")),
            extract_dir: self.work_dir.join(&run_name),
            output_path: self.output_dir.join(format!(
                "{}_{}.{}",
                self.output_stem,
                stamp,
                self.output_format.extension()
            )),
            source_suffix: self.source_suffix.clone(),
            transcode: TranscodeOptions {
                chunk_size,
                delimiter: self.delimiter as u8,
                format: Some(self.output_format),
            },
            cleanup: self.cleanup,
            stamp,
        })
    }
}

/// Everything one run needs, computed once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source_url: Url,
    /// `YYYYMMDD` of the day the run started.
    pub stamp: String,
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    pub source_suffix: String,
    pub output_path: PathBuf,
    pub transcode: TranscodeOptions,
    pub cleanup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 10).unwrap()
    }

    #[test]
    fn defaults_resolve_to_date_stamped_paths() {
        let cfg = Settings::default().resolve(day()).unwrap();
        assert_eq!(cfg.stamp, "20250910");
        assert_eq!(
            cfg.archive_path,
            PathBuf::from("tmp/Preliminary_Export_20250910.zip")
        );
        assert_eq!(cfg.extract_dir, PathBuf::from("tmp/Preliminary_Export_20250910"));
        assert_eq!(cfg.output_path, PathBuf::from("./Appraisal_Data_20250910.xlsx"));
        assert_eq!(cfg.transcode.chunk_size.get(), DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.transcode.delimiter, b',');
        assert_eq!(cfg.source_suffix, DEFAULT_SOURCE_SUFFIX);
        assert!(!cfg.cleanup);
    }

    #[test]
    fn yaml_overrides_selected_fields() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            "work_dir: /data/work\noutput_format: csv\nchunk_size: 500\ndelimiter: \"|\"\ncleanup: true"
        )?;

        let settings = Settings::from_yaml_file(file.path())?;
        let cfg = settings.resolve(day())?;
        assert_eq!(
            cfg.archive_path,
            PathBuf::from("/data/work/Preliminary_Export_20250910.zip")
        );
        assert_eq!(cfg.output_path, PathBuf::from("./Appraisal_Data_20250910.csv"));
        assert_eq!(cfg.transcode.chunk_size.get(), 500);
        assert_eq!(cfg.transcode.delimiter, b'|');
        assert_eq!(cfg.source_url.as_str(), DEFAULT_SOURCE_URL);
        assert!(cfg.cleanup);
        Ok(())
    }

    #[test]
    fn rejects_unknown_fields() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "chunk_sise: 5")?;
        let err = Settings::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        Ok(())
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let settings = Settings {
            chunk_size: 0,
            ..Settings::default()
        };
        let err = settings.resolve(day()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "chunk_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_url_and_delimiter() {
        let bad_url = Settings {
            source_url: "not a url".into(),
            ..Settings::default()
        };
        assert!(matches!(
            bad_url.resolve(day()),
            Err(ConfigError::InvalidUrl { .. })
        ));

        let bad_delim = Settings {
            delimiter: '§',
            ..Settings::default()
        };
        assert!(matches!(
            bad_delim.resolve(day()),
            Err(ConfigError::InvalidValue {
                field: "delimiter",
                ..
            })
        ));
    }
}
