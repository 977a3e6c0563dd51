//! Subcommands and their shared plumbing.

pub mod connection;
pub mod error;
pub mod load;
pub mod scan;

use anyhow::Result;
use std::future::Future;

/// Drive one command's async body to completion.
pub(crate) fn block_on<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(future)
}
