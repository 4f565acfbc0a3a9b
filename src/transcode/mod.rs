//! Tabular Transcoder: stream a delimited text file into one output artifact,
//! a bounded number of rows at a time.

mod sink;

pub use sink::XLSX_MAX_ROWS;

use arrow::datatypes::{DataType, Field, Schema};
use serde::Deserialize;
use std::{fs::File, io::BufReader, num::NonZeroUsize, path::Path, sync::Arc};
use tracing::{debug, instrument, trace};

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::TranscodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Xlsx,
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }

    /// Pick the format from a path's extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(OutputFormat::Xlsx),
            "csv" => Some(OutputFormat::Csv),
            "parquet" => Some(OutputFormat::Parquet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOptions {
    /// Most rows held in memory at once.
    pub chunk_size: NonZeroUsize,
    /// Field delimiter of the input, reused for CSV output.
    pub delimiter: u8,
    /// Output format; `None` derives it from the output path.
    pub format: Option<OutputFormat>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            delimiter: b',',
            format: None,
        }
    }
}

impl TranscodeOptions {
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Reported after each chunk has been appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// 1-based.
    pub chunk: usize,
    pub rows_in_chunk: usize,
    pub rows_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeReport {
    /// Data rows written, header excluded.
    pub rows: u64,
    pub chunks: usize,
    pub columns: Vec<String>,
}

pub fn transcode(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &TranscodeOptions,
) -> Result<TranscodeReport, TranscodeError> {
    transcode_with(input, output, options, |_| {})
}

/// Convert `input` into a single artifact at `output`, calling `on_chunk`
/// after every chunk.
///
/// The first line of `input` names the columns. Rows are read in chunks of at
/// most `chunk_size` and appended to the artifact in input order; values are
/// carried as text. The artifact is staged beside `output` and only appears
/// there once every chunk has been written.
#[instrument(level = "debug", skip_all, fields(input = %input.as_ref().display(), output = %output.as_ref().display()))]
pub fn transcode_with(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &TranscodeOptions,
    mut on_chunk: impl FnMut(ChunkProgress),
) -> Result<TranscodeReport, TranscodeError> {
    let input = input.as_ref();
    let output = output.as_ref();
    let format = match options.format {
        Some(format) => format,
        None => OutputFormat::from_path(output)
            .ok_or_else(|| TranscodeError::UnsupportedFormat(output.to_path_buf()))?,
    };

    let columns = read_header(input, options.delimiter)?;
    debug!(columns = columns.len(), ?format, "header read");
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let file = File::open(input).map_err(|source| TranscodeError::Open {
        path: input.to_path_buf(),
        source,
    })?;
    let reader = arrow::csv::ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(options.delimiter)
        .with_batch_size(options.chunk_size.get())
        .build(file)
        .map_err(|source| TranscodeError::Parse {
            path: input.to_path_buf(),
            rows: 0,
            source,
        })?;

    let mut sink = sink::open(format, output, schema, options.delimiter)?;
    let mut rows = 0u64;
    let mut chunks = 0usize;
    for batch in reader {
        let batch = batch.map_err(|source| TranscodeError::Parse {
            path: input.to_path_buf(),
            rows,
            source,
        })?;
        sink.append(&batch)?;

        chunks += 1;
        rows += batch.num_rows() as u64;
        trace!(chunk = chunks, rows_in_chunk = batch.num_rows(), rows, "chunk appended");
        on_chunk(ChunkProgress {
            chunk: chunks,
            rows_in_chunk: batch.num_rows(),
            rows_total: rows,
        });
    }
    sink.finish()?;

    Ok(TranscodeReport {
        rows,
        chunks,
        columns,
    })
}

/// Column names from the first record of `path`.
fn read_header(path: &Path, delimiter: u8) -> Result<Vec<String>, TranscodeError> {
    let file = File::open(path).map_err(|source| TranscodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(BufReader::new(file));
    let headers = rdr.headers().map_err(|source| TranscodeError::Header {
        path: path.to_path_buf(),
        source,
    })?;
    if headers.is_empty() {
        return Err(TranscodeError::MissingHeader(path.to_path_buf()));
    }
    Ok(headers.iter().map(|h| h.trim().to_string()).collect())
}
