//! Static page assets

use std::path::Path;

use crate::ConfigError;

/// Read the stylesheet that gets inlined into every rendered page.
///
/// A missing file is a startup error; the page is never served unstyled.
pub fn load_stylesheet(path: &Path) -> Result<String, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(css) => {
            tracing::debug!(path = %path.display(), bytes = css.len(), "Loaded stylesheet");
            Ok(css)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::FileNotFound(path.display().to_string()))
        }
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("style.css");
        std::fs::write(&path, "body { margin: 0; }").unwrap();

        let css = load_stylesheet(&path).unwrap();
        assert_eq!(css, "body { margin: 0; }");
    }

    #[test]
    fn test_missing_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_stylesheet(&dir.path().join("missing.css")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
