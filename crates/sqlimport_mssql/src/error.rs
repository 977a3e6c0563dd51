//! SQL Server backend errors.

use sqlimport_core::LoadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MssqlError {
    #[error("Invalid connection settings: {0}")]
    Config(String),

    #[error("Invalid connection URI: {0}")]
    Uri(#[from] url::ParseError),

    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("SQL Server error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("Statement timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Value(String),
}

impl MssqlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<MssqlError> for LoadError {
    fn from(err: MssqlError) -> Self {
        match err {
            MssqlError::Config(msg) => LoadError::invalid_config(msg),
            MssqlError::Uri(e) => LoadError::invalid_config(format!("Invalid connection URI: {}", e)),
            other => LoadError::database_with(other.to_string(), other),
        }
    }
}
