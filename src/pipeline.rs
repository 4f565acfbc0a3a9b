//! Pipeline Orchestrator: fetch and extract when needed, find the record file,
//! transcode it.
//!
//! Stages return values; this module turns them into [`Event`]s so the caller
//! decides how progress is shown. [`Pipeline::run`] logs them.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{FetchError, Result, TranscodeError};
use crate::extract::{extract, ExtractedTree};
use crate::fetch::{default_client, fetch, FetchOutcome};
use crate::locate::find_by_suffix;
use crate::transcode::{transcode_with, ChunkProgress, TranscodeReport};

/// Progress of a run, in the order stages happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Fetching { url: String, dest: PathBuf },
    Fetched(FetchOutcome),
    Extracting { archive: PathBuf, target: PathBuf },
    Extracted { root: PathBuf, files: usize },
    /// The extraction directory already existed; fetch and extract skipped.
    ReusedExtraction(PathBuf),
    Located(PathBuf),
    ChunkWritten(ChunkProgress),
    Finished { output: PathBuf, rows: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    Reused(PathBuf),
    Extracted(ExtractedTree),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// `None` when an earlier extraction was reused.
    pub fetch: Option<FetchOutcome>,
    pub extraction: ExtractionStatus,
    pub source: PathBuf,
    pub transcode: TranscodeReport,
    pub output: PathBuf,
    pub elapsed: Duration,
}

/// One configured run. Not safe to run twice at once over the same paths.
pub struct Pipeline {
    config: RunConfig,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every stage, logging progress.
    pub fn run(&self) -> Result<RunReport> {
        self.run_with(log_event)
    }

    /// Run every stage, handing progress to `observer`. Blocks until the
    /// output is written or a stage fails.
    pub fn run_with(&self, mut observer: impl FnMut(&Event)) -> Result<RunReport> {
        let start = Instant::now();
        let cfg = &self.config;

        let (fetched, extraction) = self.ensure_extracted(&mut observer)?;

        let source = find_by_suffix(&cfg.extract_dir, &cfg.source_suffix)?;
        observer(&Event::Located(source.clone()));

        ensure_parent(&cfg.output_path).map_err(|source| TranscodeError::Io {
            path: cfg.output_path.clone(),
            source,
        })?;
        let report = transcode_with(&source, &cfg.output_path, &cfg.transcode, |p| {
            observer(&Event::ChunkWritten(p))
        })?;
        observer(&Event::Finished {
            output: cfg.output_path.clone(),
            rows: report.rows,
        });

        Ok(RunReport {
            fetch: fetched,
            extraction,
            source,
            transcode: report,
            output: cfg.output_path.clone(),
            elapsed: start.elapsed(),
        })
    }

    /// The extraction directory's existence is the only check: when it is
    /// there, neither the archive nor the network is touched.
    fn ensure_extracted(
        &self,
        observer: &mut impl FnMut(&Event),
    ) -> Result<(Option<FetchOutcome>, ExtractionStatus)> {
        let cfg = &self.config;
        if cfg.extract_dir.is_dir() {
            observer(&Event::ReusedExtraction(cfg.extract_dir.clone()));
            return Ok((None, ExtractionStatus::Reused(cfg.extract_dir.clone())));
        }

        let url = cfg.source_url.as_str();
        ensure_parent(&cfg.archive_path).map_err(|source| FetchError::Io {
            url: url.to_string(),
            path: cfg.archive_path.clone(),
            source,
        })?;
        observer(&Event::Fetching {
            url: url.to_string(),
            dest: cfg.archive_path.clone(),
        });
        let client = default_client().map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        let fetched = fetch(&client, url, &cfg.archive_path)?;
        observer(&Event::Fetched(fetched.clone()));

        observer(&Event::Extracting {
            archive: cfg.archive_path.clone(),
            target: cfg.extract_dir.clone(),
        });
        let tree = extract(&cfg.archive_path, &cfg.extract_dir, cfg.cleanup)?;
        observer(&Event::Extracted {
            root: tree.root.clone(),
            files: tree.files.len(),
        });

        Ok((Some(fetched), ExtractionStatus::Extracted(tree)))
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

/// Default observer: one log line per event.
pub fn log_event(event: &Event) {
    match event {
        Event::Fetching { url, dest } => {
            info!(%url, dest = %dest.display(), "fetching archive")
        }
        Event::Fetched(FetchOutcome::Cached { path, bytes }) => {
            info!(path = %path.display(), bytes, "archive already present")
        }
        Event::Fetched(FetchOutcome::Downloaded { path, bytes }) => {
            info!(path = %path.display(), bytes, "downloaded archive")
        }
        Event::Extracting { archive, target } => {
            info!(archive = %archive.display(), target = %target.display(), "extracting")
        }
        Event::Extracted { root, files } => {
            info!(root = %root.display(), files, "extracted archive")
        }
        Event::ReusedExtraction(dir) => {
            info!(dir = %dir.display(), "extracted directory found; skipping fetch and extract")
        }
        Event::Located(path) => info!(path = %path.display(), "found record file"),
        Event::ChunkWritten(p) => debug!(
            chunk = p.chunk,
            rows = p.rows_in_chunk,
            total = p.rows_total,
            "chunk written"
        ),
        Event::Finished { output, rows } => {
            info!(output = %output.display(), rows, "output written")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::{Error, ExtractError, LocateError};
    use crate::transcode::OutputFormat;
    use anyhow::Result;
    use chrono::NaiveDate;
    use std::io::{Cursor, Write};
    use tempfile::{tempdir, TempDir};
    use tokio::runtime::Runtime;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };
    use zip::write::SimpleFileOptions;

    const RECORDS: &str = "PROP_ID,OWNER\n10,ALPHA\n11,BRAVO\n12,CHARLIE\n";
    const DEAD_URL: &str = "http://127.0.0.1:9/Preliminary_Export.zip";

    fn config(dir: &TempDir, url: &str) -> Result<RunConfig> {
        let settings = Settings {
            source_url: url.to_string(),
            work_dir: dir.path().join("tmp"),
            output_dir: dir.path().join("out"),
            output_format: OutputFormat::Csv,
            chunk_size: 2,
            ..Settings::default()
        };
        Ok(settings.resolve(NaiveDate::from_ymd_opt(2025, 9, 10).unwrap())?)
    }

    fn zip_bytes(entries: &[(&str, &str)]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, SimpleFileOptions::default())?;
                zip.write_all(body.as_bytes())?;
            }
            zip.finish()?;
        }
        Ok(buf)
    }

    fn place_archive(cfg: &RunConfig, entries: &[(&str, &str)]) -> Result<()> {
        fs::create_dir_all(cfg.archive_path.parent().unwrap())?;
        fs::write(&cfg.archive_path, zip_bytes(entries)?)?;
        Ok(())
    }

    #[test]
    fn cached_archive_runs_end_to_end() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(&dir, DEAD_URL)?;
        place_archive(
            &cfg,
            &[
                ("PRELIM_APPRAISAL_INFO.TXT", RECORDS),
                ("PRELIM_APPRAISAL_ENTITY_INFO.TXT", "X\n1\n"),
            ],
        )?;

        let mut events = Vec::new();
        let report = Pipeline::new(cfg.clone()).run_with(|e| events.push(e.clone()))?;

        assert!(report.fetch.as_ref().is_some_and(FetchOutcome::was_cached));
        assert!(matches!(report.extraction, ExtractionStatus::Extracted(ref t) if t.files.len() == 2));
        assert_eq!(report.source, cfg.extract_dir.join("PRELIM_APPRAISAL_INFO.TXT"));
        assert_eq!(report.transcode.rows, 3);
        assert_eq!(report.output, dir.path().join("out/Appraisal_Data_20250910.csv"));
        assert_eq!(fs::read_to_string(&report.output)?, RECORDS);
        assert!(cfg.archive_path.exists(), "archive kept for the next run");

        let chunks = events
            .iter()
            .filter(|e| matches!(e, Event::ChunkWritten(_)))
            .count();
        assert_eq!(chunks, 2);
        assert!(matches!(events.first(), Some(Event::Fetching { .. })));
        assert!(matches!(events.last(), Some(Event::Finished { rows: 3, .. })));
        Ok(())
    }

    #[test]
    fn downloads_when_nothing_is_cached() -> Result<()> {
        let rt = Runtime::new()?;
        let body = zip_bytes(&[("X_APPRAISAL_INFO.TXT", RECORDS)])?;
        let server = rt.block_on(async move {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/Preliminary_Export.zip"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
                .expect(1)
                .mount(&server)
                .await;
            server
        });
        let dir = tempdir()?;
        let cfg = config(&dir, &format!("{}/Preliminary_Export.zip", server.uri()))?;

        let report = Pipeline::new(cfg.clone()).run_with(|_| {})?;

        assert!(matches!(report.fetch, Some(FetchOutcome::Downloaded { .. })));
        assert_eq!(report.transcode.rows, 3);
        assert!(cfg.archive_path.is_file());
        rt.block_on(server.verify());
        Ok(())
    }

    #[test]
    fn existing_extraction_skips_fetch_and_extract() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(&dir, DEAD_URL)?;
        fs::create_dir_all(&cfg.extract_dir)?;
        fs::write(cfg.extract_dir.join("A_APPRAISAL_INFO.TXT"), RECORDS)?;

        let report = Pipeline::new(cfg.clone()).run_with(|_| {})?;

        assert!(report.fetch.is_none());
        assert_eq!(
            report.extraction,
            ExtractionStatus::Reused(cfg.extract_dir.clone())
        );
        assert!(!cfg.archive_path.exists());
        assert_eq!(report.transcode.rows, 3);
        Ok(())
    }

    #[test]
    fn missing_record_file_is_fatal_before_transcoding() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(&dir, DEAD_URL)?;
        place_archive(&cfg, &[("SOMETHING_ELSE.TXT", RECORDS)])?;

        let mut events = Vec::new();
        let err = Pipeline::new(cfg.clone())
            .run_with(|e| events.push(e.clone()))
            .unwrap_err();

        assert!(matches!(err, Error::SourceNotFound(LocateError::NotFound { .. })));
        assert!(!events.iter().any(|e| matches!(e, Event::ChunkWritten(_) | Event::Located(_))));
        assert!(!cfg.output_path.exists());
        Ok(())
    }

    #[test]
    fn download_failure_stops_the_run() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(&dir, DEAD_URL)?;

        let err = Pipeline::new(cfg.clone()).run_with(|_| {}).unwrap_err();

        assert!(matches!(err, Error::Download(FetchError::Transport { .. })));
        assert!(!cfg.archive_path.exists());
        assert!(!cfg.extract_dir.exists());
        Ok(())
    }

    #[test]
    fn unsafe_archive_is_reported_as_extraction_failure() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(&dir, DEAD_URL)?;
        place_archive(
            &cfg,
            &[
                ("A_APPRAISAL_INFO.TXT", RECORDS),
                ("../../outside.txt", "x"),
            ],
        )?;

        let err = Pipeline::new(cfg.clone()).run_with(|_| {}).unwrap_err();

        assert!(matches!(err, Error::Extraction(ref e) if e.is_unsafe_entry()));
        assert!(matches!(err, Error::Extraction(ExtractError::UnsafeEntry { .. })));
        assert!(!cfg.extract_dir.exists());
        assert!(!dir.path().join("outside.txt").exists());
        Ok(())
    }
}
