//! sqlimport loader
//!
//! Drives a delimited-file load into SQL Server through one of two
//! strategies:
//!
//! - **row-streaming**: lines are parsed, converted to typed values and sent
//!   through the client bulk-copy API in batches
//! - **server-staged**: the file is preprocessed into a staged copy, a format
//!   file is written next to it and the engine runs `BULK INSERT` itself
//!
//! The database is reached only through the [`Database`] and [`BulkCopy`]
//! traits, and staged files through a [`StagingTransport`].

pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod maintenance;
pub mod orchestrator;
pub mod progress;
pub mod staging;
pub mod statements;
pub mod streaming;
pub mod transport;

pub use catalog::{BulkCopy, BulkCopyOptions, Database};
pub use config::{
    LoadOptions, LoadStrategy, ProgressMode, RemoteShareConfig, TransportConfig,
    DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_EVERY, DEFAULT_SMB_CLIENT, DEFAULT_TIMEOUT_SECS,
};
pub use diagnostics::scan_field_lengths;
pub use orchestrator::{LoadOrchestrator, LoadPhase, LoadReport, LoadRequest};
pub use progress::ProgressReporter;
pub use transport::{
    LocalTransport, OwnedCopy, RemoteShareTransport, StagedLocation, StagingTransport,
};
