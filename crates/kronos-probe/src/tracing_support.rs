//! Logging setup and per-session operation timings.
//!
//! ## Toyota Way Application
//!
//! - **Genchi Genbutsu**: Timings show how long the real device took for each step
//! - **Mieruka**: Structured JSON logs for CI dashboards

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::result::ProbeResult;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "kronos_probe=info";

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `filter`. Returns `false` when a
/// subscriber was already installed, so runners and tests may both call it.
pub fn init_tracing(filter: Option<&str>, json: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_LOG_FILTER)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

// =============================================================================
// OPERATION TIMINGS
// =============================================================================

/// Outcome of a timed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Completed successfully
    Ok,
    /// Failed
    Error,
}

/// One timed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedOperation {
    /// Unique id
    pub id: String,
    /// Operation name (`navigate`, `set_field`, `save`, ...)
    pub name: String,
    /// Section the operation targeted, if any
    pub section: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Outcome
    pub status: OperationStatus,
    /// Error message for failed operations
    pub error: Option<String>,
}

/// Timings recorded over one device session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTimings {
    /// Device model the session ran against
    pub model: String,
    /// Session start, seconds since the Unix epoch
    pub started_at: u64,
    /// Completed operations, in order
    pub operations: Vec<TimedOperation>,
}

/// Handle for an operation in flight
#[derive(Debug)]
#[must_use = "finish the operation to record it"]
pub struct OperationClock {
    id: String,
    name: String,
    section: Option<String>,
    started: Instant,
}

impl OperationClock {
    /// Start timing an operation
    pub fn start(name: &str, section: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            section: section.map(str::to_string),
            started: Instant::now(),
        }
    }
}

impl OperationTimings {
    /// Empty timings for a session
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            model: model.into(),
            started_at,
            operations: Vec::new(),
        }
    }

    /// Record a finished operation from its clock and result
    pub fn finish<T>(&mut self, clock: OperationClock, result: &ProbeResult<T>) {
        let elapsed = clock.started.elapsed();
        let (status, error) = match result {
            Ok(_) => (OperationStatus::Ok, None),
            Err(e) => (OperationStatus::Error, Some(e.to_string())),
        };
        tracing::debug!(
            operation = %clock.name,
            section = clock.section.as_deref().unwrap_or("-"),
            elapsed_ms = elapsed.as_millis() as u64,
            ok = error.is_none(),
            "operation finished"
        );
        self.operations.push(TimedOperation {
            id: clock.id,
            name: clock.name,
            section: clock.section,
            duration_ms: elapsed.as_millis() as u64,
            status,
            error,
        });
    }

    /// Operations with the given name
    #[must_use]
    pub fn by_name(&self, name: &str) -> Vec<&TimedOperation> {
        self.operations.iter().filter(|o| o.name == name).collect()
    }

    /// Failed operations
    #[must_use]
    pub fn failures(&self) -> Vec<&TimedOperation> {
        self.operations
            .iter()
            .filter(|o| o.status == OperationStatus::Error)
            .collect()
    }

    /// Total time per operation name
    #[must_use]
    pub fn totals(&self) -> BTreeMap<String, Duration> {
        let mut totals = BTreeMap::new();
        for op in &self.operations {
            *totals.entry(op.name.clone()).or_insert(Duration::ZERO) += Duration::from_millis(op.duration_ms);
        }
        totals
    }

    /// Write timings as pretty JSON
    pub fn save_json(&self, path: &Path) -> ProbeResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read timings written by [`Self::save_json`]
    pub fn load_json(path: &Path) -> ProbeResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
