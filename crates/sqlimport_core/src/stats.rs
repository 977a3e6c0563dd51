//! Row counts and throughput for a load.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Final statistics of one load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadStats {
    pub rows_processed: u64,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub rows_per_second: f64,
}

impl LoadStats {
    pub fn compute(rows_processed: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rows_per_second = if secs > 0.0 {
            rows_processed as f64 / secs
        } else {
            0.0
        };
        Self {
            rows_processed,
            elapsed,
            rows_per_second,
        }
    }
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows in {:.2}s ({:.1} rows/s)",
            self.rows_processed,
            self.elapsed.as_secs_f64(),
            self.rows_per_second
        )
    }
}

/// Monotonic row counter started at the beginning of a load.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    started: Instant,
    rows: u64,
}

impl StatsAccumulator {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            rows: 0,
        }
    }

    pub fn add_rows(&mut self, rows: u64) {
        self.rows = self.rows.saturating_add(rows);
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn snapshot(&self) -> LoadStats {
        LoadStats::compute(self.rows, self.started.elapsed())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
