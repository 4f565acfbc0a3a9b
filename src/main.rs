use anyhow::{Context, Result};
use appraisal_roll::{logging, Pipeline, Settings};
use chrono::Local;
use std::{env, path::PathBuf};
use tracing::{error, info};

const CONFIG_ENV: &str = "APPRAISAL_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) fix the run date once ────────────────────────────────────
    let today = Local::now().date_naive();
    let stamp = today.format("%Y%m%d").to_string();

    // ─── 2) init logging ─────────────────────────────────────────────
    let log_path = logging::daily_log_path("logs", &stamp);
    logging::init(Some(&log_path))
        .with_context(|| format!("opening log file {}", log_path.display()))?;
    info!(log = %log_path.display(), "startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 3) load settings ────────────────────────────────────────────
    let config_path = env::args_os()
        .nth(1)
        .or_else(|| env::var_os(CONFIG_ENV))
        .map(PathBuf::from);
    let settings = match &config_path {
        Some(path) => Settings::from_yaml_file(path)?,
        None => Settings::default(),
    };
    let config = settings.resolve(today).context("invalid settings")?;
    info!(
        config = ?config_path,
        url = %config.source_url,
        output = %config.output_path.display(),
        chunk_size = config.transcode.chunk_size.get(),
        "configured"
    );

    // ─── 4) run the pipeline off the async workers ──────────────────
    let pipeline = Pipeline::new(config);
    let outcome = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .context("pipeline task panicked")?;

    match outcome {
        Ok(report) => {
            info!(
                rows = report.transcode.rows,
                chunks = report.transcode.chunks,
                output = %report.output.display(),
                elapsed = ?report.elapsed,
                "processing completed successfully"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "processing failed");
            Err(e.into())
        }
    }
}
