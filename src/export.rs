//! Saving the reformatted document.
//!
//! The text is written byte-for-byte to a temporary file next to the target
//! and then renamed over it, so readers never see a half-written file.

use crate::config::DEFAULT_EXPORT_NAME;
use crate::error::ReformatError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write `text` to `path` atomically.
pub fn save_text(text: &str, path: &Path) -> Result<(), ReformatError> {
    let export_err = |source: std::io::Error| ReformatError::ExportFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(export_err)?;
    tmp.write_all(text.as_bytes()).map_err(export_err)?;
    tmp.flush().map_err(export_err)?;
    tmp.persist(path).map_err(|e| export_err(e.error))?;

    info!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

/// Where to save when the user names a directory rather than a file.
pub fn export_path(target: &Path) -> PathBuf {
    if target.is_dir() {
        target.join(DEFAULT_EXPORT_NAME)
    } else {
        target.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_text_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.md");
        let text = "# Jane Doe\n\nÉcole Polytechnique — 2019\r\n";
        save_text(text, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), text.as_bytes());
    }

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.md");
        std::fs::write(&path, "old content that is longer").unwrap();
        save_text("new", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn missing_directory_is_export_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("out.md");
        let err = save_text("x", &path).unwrap_err();
        assert!(matches!(err, ReformatError::ExportFailed { .. }));
    }

    #[test]
    fn directory_target_gets_default_name() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(export_path(dir.path()), dir.path().join("reformatted_cv.md"));
        let file = dir.path().join("cv.md");
        assert_eq!(export_path(&file), file);
    }
}
