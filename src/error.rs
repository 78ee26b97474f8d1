/// Error types shared by the scanner, report model, cache and diff worker.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the comparison core.
///
/// Scan failures are recoverable at the call site (the set is treated as empty),
/// a malformed report aborts only the load, and configuration errors abort a
/// single diff run. Per-row diff failures are not errors at this level, they are
/// collected as [`crate::diff::RowFailure`] in the run summary.
#[derive(Debug, Error)]
pub enum ImcompError {
    /// A set directory could not be walked
    #[error("cannot scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A persisted report could not be decoded
    #[error("malformed report {}: {reason}", path.display())]
    ReportParse { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    /// A second diff run was submitted while one is active
    #[error("a difference computation is already running")]
    DiffBusy,

    #[error("cannot read image {}: {reason}", path.display())]
    ImageRead { path: PathBuf, reason: String },

    #[error("invalid cache size '{0}'")]
    CacheSize(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ImcompError>;

impl ImcompError {
    pub(crate) fn report_parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ImcompError::ReportParse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = ImcompError::report_parse("/tmp/report.json", "expected an object");
        assert_eq!(
            err.to_string(),
            "malformed report /tmp/report.json: expected an object"
        );

        let err = ImcompError::ImageRead {
            path: PathBuf::from("a.png"),
            reason: "unsupported".into(),
        };
        assert!(err.to_string().contains("a.png"));
    }
}
