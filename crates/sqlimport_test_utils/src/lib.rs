//! sqlimport test utilities
//!
//! - [`MemoryDatabase`]: an in-memory stand-in for SQL Server implementing
//!   the loader's `Database` and `BulkCopy` traits, with failure injection
//! - [`FaultyTransport`]: a local staging transport that can be told to fail
//! - [`fixtures`]: source files and column lists on disk
//! - [`TestDbConfig`]: connection settings for tests against a real server
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlimport_test_utils::{fixtures, MemoryDatabase};
//!
//! #[tokio::test]
//! async fn test_load() {
//!     let mut db = MemoryDatabase::new();
//!     db.create_table(table.clone(), fixtures::columns(&[("id", "int")]));
//!     // run a LoadOrchestrator against &mut db ...
//!     assert_eq!(db.rows(&table).len(), 2);
//! }
//! ```

pub mod config;
pub mod fixtures;
pub mod memory;
pub mod transport;

pub use config::TestDbConfig;
pub use fixtures::SourceFixture;
pub use memory::{BulkInsertRecord, MemoryDatabase};
pub use transport::FaultyTransport;
