//! The load state machine.
//!
//! ```text
//! ValidateSource -> Truncate? -> ValidateTable -> DisableConstraints?
//!   -> DisableIndexes? -> StageFile -> BuildDescriptor -> ExecuteLoad
//!   -> RebuildIndexes? -> ReenableConstraints? -> ReportStats -> Cleanup
//! ```
//!
//! Row-streaming loads skip `StageFile` and `BuildDescriptor`. Restoration,
//! the stats summary and cleanup run whether or not the load succeeded.

use crate::catalog::{BulkCopy, BulkCopyOptions, Database};
use crate::config::{LoadOptions, LoadStrategy};
use crate::maintenance::{MaintenancePlan, SchemaMaintenance};
use crate::progress::ProgressReporter;
use crate::staging::{self, StagingPlan};
use crate::statements::{self, BulkInsertStatement};
use crate::streaming::{self, StreamSettings};
use crate::transport::{self, OwnedCopy, StagedLocation, StagingTransport};
use serde::Serialize;
use sqlimport_core::{
    ColumnReconciler, LoadDescriptor, LoadError, LoadStats, Reconciliation, Result, TableName,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempPath;
use tracing::{debug, error, info, warn};

/// What to load and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub source: PathBuf,
    pub table: TableName,
}

impl LoadRequest {
    pub fn new(source: impl Into<PathBuf>, table: TableName) -> Self {
        Self {
            source: source.into(),
            table,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    ValidateSource,
    Truncate,
    ValidateTable,
    DisableConstraints,
    DisableIndexes,
    StageFile,
    BuildDescriptor,
    ExecuteLoad,
    RebuildIndexes,
    ReenableConstraints,
    ReportStats,
    Cleanup,
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub strategy: &'static str,
    pub stats: LoadStats,
    /// Rows skipped because a field could not be converted
    pub rows_rejected: u64,
    pub unmatched_headers: Vec<String>,
    /// Schema maintenance that could not be applied or undone
    pub maintenance_warnings: Vec<String>,
    pub cleanup_warnings: Vec<String>,
    /// Whether a preprocessed copy of the source was written
    pub staged_copy: bool,
    pub phases: Vec<LoadPhase>,
}

impl LoadReport {
    /// Indexes or constraints may be left disabled.
    pub fn is_degraded(&self) -> bool {
        !self.maintenance_warnings.is_empty()
    }
}

/// Temporary files owned by one run.
enum Artifact {
    Temp(TempPath),
    Staged(StagedLocation),
}

#[derive(Default)]
struct RunState {
    phases: Vec<LoadPhase>,
    artifacts: Vec<Artifact>,
    maintenance: Option<SchemaMaintenance>,
    unmatched_headers: Vec<String>,
    staged_copy: bool,
}

impl RunState {
    fn enter(&mut self, phase: LoadPhase) {
        debug!("Load phase: {:?}", phase);
        self.phases.push(phase);
    }
}

struct Executed {
    rows: u64,
    rows_rejected: u64,
}

/// Drives one load against a database that supports both statements and
/// bulk copy.
pub struct LoadOrchestrator<'a, D: Database + BulkCopy + ?Sized> {
    db: &'a mut D,
    options: LoadOptions,
    transport: Option<Box<dyn StagingTransport>>,
    work_dir: PathBuf,
}

impl<'a, D: Database + BulkCopy + ?Sized> LoadOrchestrator<'a, D> {
    pub fn new(db: &'a mut D, options: LoadOptions) -> Self {
        let transport = match &options.strategy {
            LoadStrategy::ServerStaged { transport } => Some(transport::from_config(transport)),
            LoadStrategy::RowStreaming => None,
        };
        Self {
            db,
            options,
            transport,
            work_dir: std::env::temp_dir(),
        }
    }

    /// Replace the transport built from the options.
    pub fn with_transport(mut self, transport: Box<dyn StagingTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Directory for staged copies and descriptor files (default: system temp).
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub async fn run(&mut self, request: &LoadRequest) -> Result<LoadReport> {
        self.options.validate()?;
        let started = Instant::now();
        let mut state = RunState::default();
        let label = format!("Loading {}", request.table);
        let mut progress =
            ProgressReporter::new(self.options.progress, self.options.progress_every, &label);

        info!(
            "Loading {} into {} ({})",
            request.source.display(),
            request.table,
            self.options.strategy.name()
        );
        let result = self.execute(request, &mut state, &mut progress).await;

        if let Some(mut maintenance) = state.maintenance.take() {
            if self.options.manage_indexes {
                state.enter(LoadPhase::RebuildIndexes);
            }
            if self.options.manage_constraints {
                state.enter(LoadPhase::ReenableConstraints);
            }
            maintenance.restore(&mut *self.db).await;
            state.maintenance = Some(maintenance);
        }

        state.enter(LoadPhase::ReportStats);
        let rows = match &result {
            Ok(executed) => executed.rows,
            Err(LoadError::Execution { rows_committed, .. }) => *rows_committed,
            Err(_) => 0,
        };
        let stats = LoadStats::compute(rows, started.elapsed());
        match &result {
            Ok(_) => {
                progress.finish(&stats);
                info!("Loaded {} into {}: {}", request.source.display(), request.table, stats);
            }
            Err(e) => {
                progress.abandon();
                error!("Load into {} failed ({}): {}", request.table, stats, e);
            }
        }

        state.enter(LoadPhase::Cleanup);
        let cleanup_warnings = self.cleanup(&request.source, &mut state).await;

        let maintenance_warnings = state
            .maintenance
            .take()
            .map(SchemaMaintenance::into_warnings)
            .unwrap_or_default();
        if !maintenance_warnings.is_empty() {
            error!(
                "Schema of {} is in a degraded state; review indexes and constraints",
                request.table
            );
        }

        let executed = result?;
        Ok(LoadReport {
            table: request.table.to_string(),
            strategy: self.options.strategy.name(),
            stats,
            rows_rejected: executed.rows_rejected,
            unmatched_headers: state.unmatched_headers,
            maintenance_warnings,
            cleanup_warnings,
            staged_copy: state.staged_copy,
            phases: state.phases,
        })
    }

    async fn execute(
        &mut self,
        request: &LoadRequest,
        state: &mut RunState,
        progress: &mut ProgressReporter,
    ) -> Result<Executed> {
        state.enter(LoadPhase::ValidateSource);
        validate_source(&request.source).await?;

        if self.options.truncate {
            state.enter(LoadPhase::Truncate);
            self.db.execute(&statements::truncate(&request.table)).await?;
            info!("Truncated {}", request.table);
        }

        state.enter(LoadPhase::ValidateTable);
        let reconciliation = self.reconcile(request).await?;
        state.unmatched_headers = reconciliation.unmatched_headers().to_vec();

        let plan = MaintenancePlan {
            indexes: self.options.manage_indexes,
            constraints: self.options.manage_constraints,
        };
        if plan.constraints || plan.indexes {
            if plan.constraints {
                state.enter(LoadPhase::DisableConstraints);
            }
            if plan.indexes {
                state.enter(LoadPhase::DisableIndexes);
            }
            let mut maintenance = SchemaMaintenance::new(request.table.clone(), plan);
            maintenance.suspend(&mut *self.db).await;
            state.maintenance = Some(maintenance);
        }

        if matches!(self.options.strategy, LoadStrategy::RowStreaming) {
            self.load_streaming(request, &reconciliation, state, progress)
                .await
        } else {
            self.load_staged(request, reconciliation, state).await
        }
    }

    async fn reconcile(&mut self, request: &LoadRequest) -> Result<Reconciliation> {
        let columns = self.db.table_columns(&request.table).await?;
        if columns.is_empty() {
            return Err(LoadError::table_not_found(request.table.to_string()));
        }
        debug!("{} has {} columns", request.table, columns.len());

        let header = if self.options.header_mode.has_header_row() {
            let source = request.source.clone();
            let delimiter = self.options.delimiter;
            tokio::task::spawn_blocking(move || staging::read_header(&source, delimiter))
                .await
                .map_err(|e| LoadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??
        } else {
            None
        };
        let header_refs: Option<Vec<&str>> = header
            .as_ref()
            .map(|fields| fields.iter().map(String::as_str).collect());

        ColumnReconciler::new(self.options.header_mode)
            .with_header_match(self.options.header_match)
            .strict(self.options.strict_header)
            .reconcile(
                &request.table.to_string(),
                &columns,
                header_refs.as_deref(),
            )
    }

    async fn load_streaming(
        &mut self,
        request: &LoadRequest,
        reconciliation: &Reconciliation,
        state: &mut RunState,
        progress: &mut ProgressReporter,
    ) -> Result<Executed> {
        state.enter(LoadPhase::ExecuteLoad);
        let settings = StreamSettings {
            delimiter: self.options.delimiter,
            skip_header: self.options.header_mode.has_header_row(),
            batch_size: self.options.batch_size,
            keep_nulls: self.options.keep_nulls,
            quote_policy: self.options.quote_policy,
            bulk: BulkCopyOptions {
                table_lock: self.options.table_lock,
                check_constraints: self.options.check_constraints,
                keep_nulls: self.options.keep_nulls,
                keep_identity: self.options.keep_identity,
                timeout: self.options.timeout(),
            },
        };
        let outcome = streaming::stream_rows(
            &mut *self.db,
            &request.table,
            &request.source,
            reconciliation,
            &settings,
            progress,
        )
        .await?;
        if outcome.rows_rejected > 0 {
            warn!(
                "{} rows rejected while loading {}",
                outcome.rows_rejected, request.table
            );
        }
        Ok(Executed {
            rows: outcome.rows_written,
            rows_rejected: outcome.rows_rejected,
        })
    }

    async fn load_staged(
        &mut self,
        request: &LoadRequest,
        reconciliation: Reconciliation,
        state: &mut RunState,
    ) -> Result<Executed> {
        let Some(transport) = self.transport.as_deref() else {
            return Err(LoadError::invalid_config(
                "Server-staged load requires a staging transport",
            ));
        };
        let base_name = staged_base_name(&request.table);
        let delimiter = self.options.delimiter;

        state.enter(LoadPhase::StageFile);
        let plan = StagingPlan::new(&reconciliation, delimiter, self.options.repair_rows)
            .with_progress_every(self.options.progress_every);
        let mut rows_rejected = 0;
        let local_data = {
            let source = request.source.clone();
            let check_plan = plan.clone();
            let needs = tokio::task::spawn_blocking(move || {
                staging::needs_staging(&source, &check_plan)
            })
            .await
            .map_err(|e| LoadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

            if needs {
                let (path, staged) = staging::stage_source(
                    request.source.clone(),
                    self.work_dir.clone(),
                    plan,
                    reconciliation.clone(),
                )
                .await?;
                rows_rejected = staged.rejected;
                if rows_rejected > 0 {
                    warn!(
                        "{} lines of {} are not valid UTF-8 and were left out",
                        rows_rejected,
                        request.source.display()
                    );
                }
                let local = path.to_path_buf();
                state.artifacts.push(Artifact::Temp(path));
                state.staged_copy = true;
                local
            } else {
                info!("{} is already in load format; staging in place", request.source.display());
                request.source.clone()
            }
        };
        let data_location = transport
            .stage(&local_data, &format!("{}.csv", base_name))
            .await?;
        let data_path = data_location.engine_path.clone();
        state.artifacts.push(Artifact::Staged(data_location));

        state.enter(LoadPhase::BuildDescriptor);
        let descriptor = LoadDescriptor::build(
            reconciliation.targets(),
            delimiter,
            self.options.descriptor_options(),
        )?;
        let descriptor_path = write_descriptor(&descriptor, &self.work_dir)?;
        let local_descriptor = descriptor_path.to_path_buf();
        state.artifacts.push(Artifact::Temp(descriptor_path));
        let format_location = transport
            .stage(&local_descriptor, &format!("{}.xml", base_name))
            .await?;
        let format_path = format_location.engine_path.clone();
        state.artifacts.push(Artifact::Staged(format_location));

        state.enter(LoadPhase::ExecuteLoad);
        let statement = BulkInsertStatement {
            table: request.table.clone(),
            data_path,
            format_path,
            table_lock: self.options.table_lock,
            keep_nulls: self.options.keep_nulls,
            utf8: self.options.utf8,
            check_constraints: self.options.check_constraints,
            keep_identity: self.options.keep_identity,
        };
        let sql = statement.render();
        self.db.execute(statements::SET_ARITHABORT).await?;
        debug!("Executing: {}", sql);
        let rows = self
            .db
            .execute_with_timeout(&sql, self.options.timeout())
            .await
            .map_err(|e| {
                LoadError::execution(
                    format!("BULK INSERT into {} failed", request.table),
                    0,
                    Some(Box::new(e)),
                )
            })?;
        info!("BULK INSERT into {} completed", request.table);

        Ok(Executed { rows, rows_rejected })
    }

    /// Remove staged copies and temp files. Never touches `source`.
    async fn cleanup(&self, source: &Path, state: &mut RunState) -> Vec<String> {
        let mut warnings = Vec::new();
        // Staged copies first; they may be uploads of the temp files.
        let artifacts = std::mem::take(&mut state.artifacts);
        let (staged, temps): (Vec<_>, Vec<_>) = artifacts
            .into_iter()
            .partition(|a| matches!(a, Artifact::Staged(_)));

        for artifact in staged.into_iter().chain(temps) {
            match artifact {
                Artifact::Staged(location) => {
                    if let Some(OwnedCopy::Local(path)) = &location.owned {
                        if path == source {
                            continue;
                        }
                    }
                    if location.owned.is_none() {
                        continue;
                    }
                    let Some(transport) = self.transport.as_deref() else {
                        continue;
                    };
                    if let Err(e) = transport.remove(&location).await {
                        let message = format!("Failed to remove {}: {}", location.engine_path, e);
                        warn!("{}", message);
                        warnings.push(message);
                    }
                }
                Artifact::Temp(path) => {
                    let display = path.display().to_string();
                    if let Err(e) = path.close() {
                        let message = format!("Failed to delete {}: {}", display, e);
                        warn!("{}", message);
                        warnings.push(message);
                    }
                }
            }
        }
        warnings
    }
}

async fn validate_source(source: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| LoadError::source_not_found(source, e))?;
    if metadata.is_dir() {
        return Err(LoadError::source_not_found(
            source,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path is a directory"),
        ));
    }
    tokio::fs::File::open(source)
        .await
        .map_err(|e| LoadError::source_not_found(source, e))?;
    Ok(())
}

fn write_descriptor(descriptor: &LoadDescriptor, work_dir: &Path) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("sqlimport_")
        .suffix(".xml")
        .tempfile_in(work_dir)?;
    file.write_all(descriptor.to_xml().as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// File stem shared by the staged data and format files of one load.
fn staged_base_name(table: &TableName) -> String {
    let stem: String = table
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("sqlimport_{}_{}", stem, uuid::Uuid::new_v4().simple())
}
