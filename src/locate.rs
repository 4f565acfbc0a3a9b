use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::trace;

use crate::error::LocateError;

/// Find the one regular file directly inside `dir` whose name ends with
/// `suffix` (case-sensitive, not recursive).
///
/// More than one match is an error listing every candidate, so the choice
/// never depends on directory listing order.
pub fn find_by_suffix(dir: impl AsRef<Path>, suffix: &str) -> Result<PathBuf, LocateError> {
    let dir = dir.as_ref();
    let io_err = |source| LocateError::Io {
        dir: dir.to_path_buf(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            trace!(name = ?entry.file_name(), "skipping non-UTF-8 name");
            continue;
        };
        if name.ends_with(suffix) && entry.file_type().map_err(io_err)?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    match candidates.len() {
        0 => Err(LocateError::NotFound {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(LocateError::Ambiguous {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
            candidates,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const SUFFIX: &str = "_APPRAISAL_INFO.TXT";

    #[test]
    fn finds_single_match() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("2025-09-10_APPRAISAL_INFO.TXT"), "x")?;
        fs::write(dir.path().join("2025-09-10_APPRAISAL_ENTITY_INFO.TXT"), "x")?;
        fs::write(dir.path().join("readme.txt"), "x")?;

        let found = find_by_suffix(dir.path(), SUFFIX)?;

        assert_eq!(found, dir.path().join("2025-09-10_APPRAISAL_INFO.TXT"));
        Ok(())
    }

    #[test]
    fn missing_match_is_not_found() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("other.TXT"), "x")?;
        // suffix match is case-sensitive
        fs::write(dir.path().join("x_appraisal_info.txt"), "x")?;

        let err = find_by_suffix(dir.path(), SUFFIX).unwrap_err();

        assert!(matches!(err, LocateError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn ignores_directories_and_nested_files() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("dir_APPRAISAL_INFO.TXT"))?;
        fs::create_dir(dir.path().join("sub"))?;
        fs::write(dir.path().join("sub").join("deep_APPRAISAL_INFO.TXT"), "x")?;

        let err = find_by_suffix(dir.path(), SUFFIX).unwrap_err();

        assert!(matches!(err, LocateError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn several_matches_are_ambiguous() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("b_APPRAISAL_INFO.TXT"), "x")?;
        fs::write(dir.path().join("a_APPRAISAL_INFO.TXT"), "x")?;

        let err = find_by_suffix(dir.path(), SUFFIX).unwrap_err();

        match err {
            LocateError::Ambiguous { candidates, .. } => assert_eq!(
                candidates,
                vec![
                    dir.path().join("a_APPRAISAL_INFO.TXT"),
                    dir.path().join("b_APPRAISAL_INFO.TXT")
                ]
            ),
            other => panic!("expected ambiguous, got {other}"),
        }
        Ok(())
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = find_by_suffix("/definitely/not/here", SUFFIX).unwrap_err();
        assert!(matches!(err, LocateError::Io { .. }));
    }
}
