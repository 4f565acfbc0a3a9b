//! Output artifacts. Each sink stages its bytes in a temporary file next to
//! the destination and renames it into place on `finish`.

use arrow::array::{Array, StringArray};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_xlsxwriter::{Format, Workbook};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::{NamedTempFile, TempPath};

use super::OutputFormat;
use crate::error::TranscodeError;

/// Rows per worksheet, header included.
pub const XLSX_MAX_ROWS: u32 = 1_048_576;
const XLSX_MAX_COLS: usize = 16_384;

/// Destination of transcoded chunks. The header is written when the sink is
/// opened; `append` adds rows in call order.
pub(crate) trait TableSink {
    fn append(&mut self, batch: &RecordBatch) -> Result<(), TranscodeError>;

    /// Complete the artifact and move it onto the output path.
    fn finish(self: Box<Self>) -> Result<(), TranscodeError>;
}

pub(crate) fn open(
    format: OutputFormat,
    output: &Path,
    schema: SchemaRef,
    delimiter: u8,
) -> Result<Box<dyn TableSink>, TranscodeError> {
    let (file, temp) = stage(output)?;
    let dest = output.to_path_buf();
    let sink: Box<dyn TableSink> = match format {
        OutputFormat::Xlsx => Box::new(XlsxSink::new(file, temp, dest, &schema)?),
        OutputFormat::Csv => Box::new(CsvSink::new(file, temp, dest, schema, delimiter)),
        OutputFormat::Parquet => Box::new(ParquetSink::new(file, temp, dest, schema)?),
    };
    Ok(sink)
}

fn stage(output: &Path) -> Result<(File, TempPath), TranscodeError> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir)
        .map(NamedTempFile::into_parts)
        .map_err(|source| TranscodeError::Io {
            path: output.to_path_buf(),
            source,
        })
}

fn publish(file: File, temp: TempPath, dest: &Path) -> Result<(), TranscodeError> {
    let io_err = |source| TranscodeError::Io {
        path: dest.to_path_buf(),
        source,
    };
    file.sync_all().map_err(io_err)?;
    drop(file);
    temp.persist(dest).map_err(|e| io_err(e.error))
}

fn write_err(path: &Path, reason: impl ToString) -> TranscodeError {
    TranscodeError::Write {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    idx: usize,
    dest: &Path,
) -> Result<&'a StringArray, TranscodeError> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| write_err(dest, format!("column {idx} is not text")))
}

/// A cell is written as a number only when its text is exactly how that
/// number prints, so codes like `00012` or `1.50` stay text.
pub(crate) fn numeric_cell(text: &str) -> Option<f64> {
    let n: f64 = text.parse().ok()?;
    (n.is_finite() && n.to_string() == text).then_some(n)
}

struct XlsxSink {
    workbook: Workbook,
    file: File,
    temp: TempPath,
    dest: PathBuf,
    next_row: u32,
}

impl XlsxSink {
    fn new(
        file: File,
        temp: TempPath,
        dest: PathBuf,
        schema: &SchemaRef,
    ) -> Result<Self, TranscodeError> {
        if schema.fields().len() > XLSX_MAX_COLS {
            return Err(write_err(
                &dest,
                format!("{} columns exceed the sheet limit", schema.fields().len()),
            ));
        }

        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet_with_constant_memory();
        for (col, field) in schema.fields().iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, field.name(), &bold)
                .map_err(|e| write_err(&dest, e))?;
        }
        sheet.set_freeze_panes(1, 0).map_err(|e| write_err(&dest, e))?;

        Ok(Self {
            workbook,
            file,
            temp,
            dest,
            next_row: 1,
        })
    }
}

impl TableSink for XlsxSink {
    fn append(&mut self, batch: &RecordBatch) -> Result<(), TranscodeError> {
        let columns = (0..batch.num_columns())
            .map(|i| string_column(batch, i, &self.dest))
            .collect::<Result<Vec<_>, _>>()?;
        let sheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(|e| write_err(&self.dest, e))?;

        for row in 0..batch.num_rows() {
            if self.next_row >= XLSX_MAX_ROWS {
                return Err(TranscodeError::RowLimit {
                    path: self.dest.clone(),
                    limit: XLSX_MAX_ROWS,
                });
            }
            for (col, array) in columns.iter().enumerate() {
                if array.is_null(row) || array.value(row).is_empty() {
                    continue;
                }
                let text = array.value(row);
                let written = match numeric_cell(text) {
                    Some(n) => sheet.write_number(self.next_row, col as u16, n),
                    None => sheet.write_string(self.next_row, col as u16, text),
                };
                written.map_err(|e| write_err(&self.dest, e))?;
            }
            self.next_row += 1;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), TranscodeError> {
        self.workbook
            .save_to_writer(&mut self.file)
            .map_err(|e| write_err(&self.dest, e))?;
        let XlsxSink {
            file, temp, dest, ..
        } = *self;
        publish(file, temp, &dest)
    }
}

struct CsvSink {
    writer: arrow::csv::Writer<BufWriter<File>>,
    temp: TempPath,
    dest: PathBuf,
    schema: SchemaRef,
    wrote_any: bool,
}

impl CsvSink {
    fn new(file: File, temp: TempPath, dest: PathBuf, schema: SchemaRef, delimiter: u8) -> Self {
        let writer = arrow::csv::WriterBuilder::new()
            .with_header(true)
            .with_delimiter(delimiter)
            .build(BufWriter::new(file));
        Self {
            writer,
            temp,
            dest,
            schema,
            wrote_any: false,
        }
    }
}

impl TableSink for CsvSink {
    fn append(&mut self, batch: &RecordBatch) -> Result<(), TranscodeError> {
        self.writer
            .write(batch)
            .map_err(|e| write_err(&self.dest, e))?;
        self.wrote_any = true;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), TranscodeError> {
        // header-only output still needs its header line
        if !self.wrote_any {
            let empty = RecordBatch::new_empty(self.schema.clone());
            self.writer
                .write(&empty)
                .map_err(|e| write_err(&self.dest, e))?;
        }
        let CsvSink {
            writer, temp, dest, ..
        } = *self;
        let mut buffered = writer.into_inner();
        buffered.flush().map_err(|source| TranscodeError::Io {
            path: dest.clone(),
            source,
        })?;
        let file = buffered
            .into_inner()
            .map_err(|e| TranscodeError::Io {
                path: dest.clone(),
                source: e.into_error(),
            })?;
        publish(file, temp, &dest)
    }
}

struct ParquetSink {
    writer: ArrowWriter<File>,
    temp: TempPath,
    dest: PathBuf,
}

impl ParquetSink {
    fn new(
        file: File,
        temp: TempPath,
        dest: PathBuf,
        schema: SchemaRef,
    ) -> Result<Self, TranscodeError> {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer =
            ArrowWriter::try_new(file, schema, Some(props)).map_err(|e| write_err(&dest, e))?;
        Ok(Self { writer, temp, dest })
    }
}

impl TableSink for ParquetSink {
    fn append(&mut self, batch: &RecordBatch) -> Result<(), TranscodeError> {
        self.writer
            .write(batch)
            .map_err(|e| write_err(&self.dest, e))?;
        // one row group per chunk keeps the writer's buffer to a single chunk
        self.writer
            .flush()
            .map_err(|e| write_err(&self.dest, e))
    }

    fn finish(self: Box<Self>) -> Result<(), TranscodeError> {
        let ParquetSink { writer, temp, dest } = *self;
        let file = writer.into_inner().map_err(|e| write_err(&dest, e))?;
        publish(file, temp, &dest)
    }
}
