//! Durable audit trail
//!
//! Three files live in the data directory:
//! - `warden.log`: append-only JSON lines, rotated by size
//! - `incident-history.json`: one entry per incident with its fixes
//! - `metrics.json`: rolling report counters and uptime
//!
//! Writes never fail the caller. Errors are logged, counted and published
//! on a failure channel instead.

mod rotation;
mod store;


pub use store::AuditStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const LOG_FILE: &str = "warden.log";
pub const HISTORY_FILE: &str = "incident-history.json";
pub const METRICS_FILE: &str = "metrics.json";

/// Audit store configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub data_dir: PathBuf,
    /// Size past which the primary log is rotated (default: 10 MB)
    pub max_log_bytes: u64,
    /// Rotated logs kept (default: 10)
    pub max_rotated_files: usize,
    /// Incident history entries kept (default: 1000)
    pub max_history_entries: usize,
    /// Samples kept in each metrics history (default: 1000)
    pub max_metric_samples: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".warden"),
            max_log_bytes: 10 * 1024 * 1024,
            max_rotated_files: 10,
            max_history_entries: 1000,
            max_metric_samples: 1000,
        }
    }
}

impl AuditConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_max_log_bytes(mut self, bytes: u64) -> Self {
        self.max_log_bytes = bytes;
        self
    }

    pub fn with_max_rotated_files(mut self, count: usize) -> Self {
        self.max_rotated_files = count;
        self
    }

    pub fn with_max_history_entries(mut self, count: usize) -> Self {
        self.max_history_entries = count;
        self
    }

    pub fn with_max_metric_samples(mut self, count: usize) -> Self {
        self.max_metric_samples = count;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Log categories written by the pipeline
pub mod categories {
    pub const INCIDENT: &str = "incident";
    pub const FIX: &str = "fix";
    pub const REPORT: &str = "report";
    pub const ESCALATION: &str = "escalation";
    pub const LIFECYCLE: &str = "lifecycle";
}

/// One line of the primary log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A swallowed persistence error
#[derive(Debug, Clone, PartialEq)]
pub struct AuditFailure {
    pub operation: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSample {
    pub timestamp: DateTime<Utc>,
    pub status: crate::models::SystemStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimeSample {
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
}

/// Rolling metrics persisted in `metrics.json`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsDocument {
    pub total_reports: u64,
    /// Reports taken while the service was running
    pub running_reports: u64,
    pub uptime_percentage: f64,
    pub status_history: Vec<StatusSample>,
    pub response_times: Vec<ResponseTimeSample>,
    pub incidents_by_type: BTreeMap<String, u64>,
    pub incidents_by_severity: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MetricsDocument {
    fn recompute_uptime(&mut self) {
        self.uptime_percentage = if self.total_reports == 0 {
            0.0
        } else {
            self.running_reports as f64 / self.total_reports as f64 * 100.0
        };
    }
}

/// Drop the oldest elements beyond `cap`
fn truncate_front<T>(items: &mut Vec<T>, cap: usize) {
    let excess = items.len().saturating_sub(cap);
    items.drain(..excess);
}
