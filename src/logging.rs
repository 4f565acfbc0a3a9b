use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `<dir>/appraisal_transform_<stamp>.log`
pub fn daily_log_path(dir: impl AsRef<Path>, stamp: &str) -> PathBuf {
    dir.as_ref().join(format!("appraisal_transform_{stamp}.log"))
}

/// Install the global subscriber: human-readable lines on stderr and, when
/// `log_file` is given, the same lines appended to that file without colour.
/// `RUST_LOG` overrides the default `info` filter. A second call is a no-op.
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(env)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init();
    Ok(())
}
