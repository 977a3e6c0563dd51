//! Progress output for a running load.

use crate::config::ProgressMode;
use indicatif::{ProgressBar, ProgressStyle};
use sqlimport_core::LoadStats;
use std::time::Duration;
use tracing::info;

/// Reports row counts as a load advances.
///
/// `Log` mode writes an `info!` line each time another `every` rows are
/// read and after every committed batch. `Bar` drives a terminal spinner.
pub struct ProgressReporter {
    mode: ProgressMode,
    every: u64,
    next_mark: u64,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(mode: ProgressMode, every: u64, label: &str) -> Self {
        let bar = match mode {
            ProgressMode::Bar => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg} {pos} rows ({per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.set_message(label.to_string());
                pb.enable_steady_tick(Duration::from_millis(120));
                Some(pb)
            }
            ProgressMode::Silent | ProgressMode::Log => None,
        };
        let every = every.max(1);
        Self {
            mode,
            every,
            next_mark: every,
            bar,
        }
    }

    pub fn silent() -> Self {
        Self::new(ProgressMode::Silent, u64::MAX, "")
    }

    /// `rows` lines have been read so far.
    pub fn rows_read(&mut self, rows: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(rows);
        }
        if rows >= self.next_mark {
            if self.mode == ProgressMode::Log {
                info!("Read {} rows...", rows);
            }
            self.next_mark = rows.saturating_add(self.every);
        }
    }

    /// A batch was committed; `total` rows are in the table so far.
    pub fn batch_committed(&self, batch_rows: u64, total: u64) {
        if self.mode == ProgressMode::Log {
            info!("Committed batch of {} rows ({} total)", batch_rows, total);
        }
    }

    pub fn finish(&self, stats: &LoadStats) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!("Loaded {}", stats));
        }
    }

    pub fn abandon(&self) {
        if let Some(bar) = &self.bar {
            bar.abandon_with_message("Load failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_advance_by_threshold() {
        let mut reporter = ProgressReporter::new(ProgressMode::Log, 100, "t");
        reporter.rows_read(50);
        assert_eq!(reporter.next_mark, 100);
        reporter.rows_read(100);
        assert_eq!(reporter.next_mark, 200);
        reporter.rows_read(450);
        assert_eq!(reporter.next_mark, 550);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let reporter = ProgressReporter::new(ProgressMode::Silent, 0, "t");
        assert_eq!(reporter.every, 1);
    }
}
