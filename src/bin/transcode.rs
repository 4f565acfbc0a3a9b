//! Convert one local delimited file without fetching anything.
//!
//! usage: transcode <input> <output.xlsx|.csv|.parquet> [chunk_size] [delimiter]

use anyhow::{bail, Context, Result};
use appraisal_roll::{
    logging,
    transcode::{transcode_with, TranscodeOptions},
};
use std::{env, num::NonZeroUsize, path::PathBuf, time::Instant};
use tracing::info;

const USAGE: &str =
    "usage: transcode <input> <output.xlsx|.csv|.parquet> [chunk_size] [delimiter]";

fn main() -> Result<()> {
    logging::init(None)?;

    let mut args = env::args().skip(1);
    let input = PathBuf::from(args.next().context(USAGE)?);
    let output = PathBuf::from(args.next().context(USAGE)?);

    let mut options = TranscodeOptions::default();
    if let Some(raw) = args.next() {
        let chunk_size: NonZeroUsize = raw
            .parse()
            .with_context(|| format!("chunk_size must be a positive integer, got {raw:?}"))?;
        options = options.with_chunk_size(chunk_size);
    }
    if let Some(raw) = args.next() {
        match raw.as_bytes() {
            [b] if b.is_ascii() => options.delimiter = *b,
            _ => bail!("delimiter must be one ASCII character, got {raw:?}"),
        }
    }

    let start = Instant::now();
    let report = transcode_with(&input, &output, &options, |p| {
        info!(chunk = p.chunk, total = p.rows_total, "chunk written");
    })
    .with_context(|| format!("transcoding {}", input.display()))?;

    info!(
        rows = report.rows,
        chunks = report.chunks,
        columns = report.columns.len(),
        output = %output.display(),
        elapsed = ?start.elapsed(),
        "done"
    );
    Ok(())
}
