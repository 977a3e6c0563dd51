//! Best-effort suspension of indexes and constraints around a load.
//!
//! Nothing here fails a load. Problems are logged at `error` level and kept
//! as warnings so the caller can report the degraded schema state.

use crate::catalog::Database;
use crate::statements;
use sqlimport_core::TableName;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenancePlan {
    pub indexes: bool,
    pub constraints: bool,
}

/// Tracks what was suspended so only that gets restored.
#[derive(Debug)]
pub struct SchemaMaintenance {
    table: TableName,
    plan: MaintenancePlan,
    constraints_disabled: bool,
    indexes_disabled: bool,
    warnings: Vec<String>,
}

impl SchemaMaintenance {
    pub fn new(table: TableName, plan: MaintenancePlan) -> Self {
        Self {
            table,
            plan,
            constraints_disabled: false,
            indexes_disabled: false,
            warnings: Vec::new(),
        }
    }

    pub async fn suspend<D: Database + ?Sized>(&mut self, db: &mut D) {
        if self.plan.constraints {
            match db.execute(&statements::disable_constraints(&self.table)).await {
                Ok(_) => {
                    info!("Disabled constraints on {}", self.table);
                    self.constraints_disabled = true;
                }
                Err(e) => self.warn(format!("Failed to disable constraints on {}: {}", self.table, e)),
            }
        }
        if self.plan.indexes {
            match db.execute(&statements::disable_indexes(&self.table)).await {
                Ok(_) => {
                    info!("Disabled nonclustered indexes on {}", self.table);
                    self.indexes_disabled = true;
                }
                Err(e) => self.warn(format!("Failed to disable indexes on {}: {}", self.table, e)),
            }
        }
    }

    /// Rebuild indexes, then re-enable constraints.
    pub async fn restore<D: Database + ?Sized>(&mut self, db: &mut D) {
        if self.indexes_disabled {
            match db.execute(&statements::rebuild_indexes(&self.table)).await {
                Ok(_) => {
                    info!("Rebuilt indexes on {}", self.table);
                    self.indexes_disabled = false;
                }
                Err(e) => self.warn(format!(
                    "Failed to rebuild indexes on {}; they remain disabled: {}",
                    self.table, e
                )),
            }
        }
        if self.constraints_disabled {
            match db.execute(&statements::enable_constraints(&self.table)).await {
                Ok(_) => {
                    info!("Re-enabled constraints on {}", self.table);
                    self.constraints_disabled = false;
                }
                Err(e) => self.warn(format!(
                    "Failed to re-enable constraints on {}; they remain disabled: {}",
                    self.table, e
                )),
            }
        }
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    fn warn(&mut self, message: String) {
        error!("{}", message);
        self.warnings.push(message);
    }
}
