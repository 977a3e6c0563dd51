//! SQL Server backend for sqlimport.
//!
//! [`MssqlConnection`] implements the loader's `Database` and `BulkCopy`
//! traits on top of a single tiberius client.
//!
//! # Features
//!
//! - `integrated-auth`: integrated (Kerberos) authentication on non-Windows
//!   hosts; Windows builds always have it
//! - `docker-tests`: integration tests against a live server

pub mod config;
pub mod connection;
pub mod error;
mod values;

pub use config::{MssqlAuth, MssqlConfig, DEFAULT_PORT};
pub use connection::MssqlConnection;
pub use error::MssqlError;
