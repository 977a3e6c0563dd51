//! Staging transport with injectable failures.

use async_trait::async_trait;
use sqlimport_core::{LoadError, Result};
use sqlimport_loader::{LocalTransport, StagedLocation, StagingTransport};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Copies into a local directory like the real local transport, but can be
/// told to fail the `n`th stage call or every removal.
#[derive(Debug)]
pub struct FaultyTransport {
    inner: LocalTransport,
    fail_stage_at: Option<usize>,
    fail_remove: bool,
    stage_calls: AtomicUsize,
}

impl FaultyTransport {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: LocalTransport::new(Some(staging_dir.into()), None),
            fail_stage_at: None,
            fail_remove: false,
            stage_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the `n`th (1-based) call to `stage`.
    pub fn fail_stage_at(mut self, n: usize) -> Self {
        self.fail_stage_at = Some(n);
        self
    }

    pub fn fail_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }
}

#[async_trait]
impl StagingTransport for FaultyTransport {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn stage(&self, local: &Path, file_name: &str) -> Result<StagedLocation> {
        let call = self.stage_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_stage_at == Some(call) {
            return Err(LoadError::transport(format!(
                "injected failure staging {}",
                file_name
            )));
        }
        self.inner.stage(local, file_name).await
    }

    async fn remove(&self, location: &StagedLocation) -> Result<()> {
        if self.fail_remove {
            return Err(LoadError::transport(format!(
                "injected failure removing {}",
                location.engine_path
            )));
        }
        self.inner.remove(location).await
    }
}
