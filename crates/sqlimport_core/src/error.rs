//! Error taxonomy for a load.
//!
//! Input errors are raised before anything touches the target table,
//! transport and execution errors abort the load after cleanup, and
//! maintenance/cleanup problems never become errors at all (they are
//! logged by the orchestrator and surfaced in its report).

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by transport and database errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Load pipeline result type.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors surfaced to the caller of a load.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The source file is missing or unreadable.
    #[error("Source file not found or unreadable: {}", path.display())]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The schema catalog returned no columns for the table.
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    /// Strict header reconciliation found a divergence.
    #[error("Column mismatch at position {position}: file has '{found}', table expects '{expected}'")]
    ColumnMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    /// Options that cannot describe a valid load.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shared-storage staging failed (copy, remote command, cleanup of a share).
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Connection, catalog or statement failure outside the load itself.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The bulk copy or server-side load statement failed mid-load.
    ///
    /// Rows already committed by earlier batches stay in the table.
    #[error("Load failed after {rows_committed} committed rows: {message}")]
    Execution {
        message: String,
        rows_committed: u64,
        #[source]
        source: Option<BoxError>,
    },

    /// Local file system failure while staging or writing descriptors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub fn source_not_found(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceNotFound {
            path: path.into(),
            source,
        }
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    pub fn transport_with(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database {
            message: msg.into(),
            source: None,
        }
    }

    pub fn database_with(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Database {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    /// Wrap a failure that happened while rows were being loaded.
    pub fn execution(msg: impl Into<String>, rows_committed: u64, source: Option<BoxError>) -> Self {
        Self::Execution {
            message: msg.into(),
            rows_committed,
            source,
        }
    }

    /// Whether the error was raised before any data reached the table.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::TableNotFound { .. }
                | Self::ColumnMismatch { .. }
                | Self::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        assert!(LoadError::table_not_found("dbo.t").is_input_error());
        assert!(LoadError::invalid_config("bad").is_input_error());
        assert!(!LoadError::transport("smb down").is_input_error());
        assert!(!LoadError::execution("boom", 10, None).is_input_error());
    }

    #[test]
    fn test_execution_message_reports_committed_rows() {
        let err = LoadError::execution("constraint violation", 5000, None);
        assert_eq!(
            err.to_string(),
            "Load failed after 5000 committed rows: constraint violation"
        );
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "share offline");
        let err = LoadError::transport_with("copy failed", io);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("share offline"));
    }
}
