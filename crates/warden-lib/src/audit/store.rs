//! Audit store: serialized writers for the log, history and metrics files

use super::rotation::{list_rotated, rotate_if_needed};
use super::{
    categories, truncate_front, AuditConfig, AuditFailure, LogEntry, LogLevel, MetricsDocument,
    ResponseTimeSample, StatusSample, HISTORY_FILE, LOG_FILE, METRICS_FILE,
};
use crate::error::AuditError;
use crate::events::{Escalation, EVENT_CHANNEL_CAPACITY};
use crate::models::{
    FixAction, Incident, IncidentHistoryEntry, Resolution, SystemReport, SystemStatus,
};
use crate::observability::WardenMetrics;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, warn};

/// Single writer for the audit files
///
/// Concurrent callers are serialized by an internal mutex so log lines and
/// document rewrites never interleave.
pub struct AuditStore {
    config: AuditConfig,
    write_lock: Mutex<()>,
    failures: broadcast::Sender<AuditFailure>,
    metrics: WardenMetrics,
}

impl AuditStore {
    pub fn new(config: AuditConfig) -> Self {
        let (failures, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            write_lock: Mutex::new(()),
            failures,
            metrics: WardenMetrics::new(),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Persistence errors swallowed by the store
    pub fn subscribe_failures(&self) -> broadcast::Receiver<AuditFailure> {
        self.failures.subscribe()
    }

    pub fn log_path(&self) -> PathBuf {
        self.config.data_dir.join(LOG_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.config.data_dir.join(HISTORY_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.config.data_dir.join(METRICS_FILE)
    }

    /// Append one line to the primary log
    pub async fn log(
        &self,
        level: LogLevel,
        category: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            category: category.to_string(),
            message: message.into(),
            data,
        };

        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.append_log(&entry).await {
            self.report_failure("append_log", e);
        }
    }

    pub async fn log_lifecycle(&self, level: LogLevel, message: impl Into<String>) {
        self.log(level, categories::LIFECYCLE, message, None).await;
    }

    /// Log a new incident and open its history entry
    pub async fn record_incident(&self, incident: &Incident) {
        self.log(
            LogLevel::Warn,
            categories::INCIDENT,
            format!(
                "{} [{}] {}",
                incident.incident_type, incident.severity, incident.description
            ),
            to_payload(incident),
        )
        .await;

        let created = self
            .update_history(|history| {
                if history.iter().any(|e| e.incident.id == incident.id) {
                    return false;
                }
                history.push(IncidentHistoryEntry::pending(incident.clone()));
                true
            })
            .await;
        if !created {
            return;
        }

        self.update_metrics(|doc| {
            *doc.incidents_by_type
                .entry(incident.incident_type.as_str().to_string())
                .or_insert(0) += 1;
            *doc.incidents_by_severity
                .entry(incident.severity.as_str().to_string())
                .or_insert(0) += 1;
        })
        .await;
    }

    pub async fn record_fix_attempted(&self, fix: &FixAction) {
        self.log(
            LogLevel::Info,
            categories::FIX,
            format!("Attempting {} for incident {}", fix.action, fix.incident_id),
            to_payload(fix),
        )
        .await;

        self.attach_fix(fix).await;
    }

    pub async fn record_fix_completed(&self, fix: &FixAction) {
        let (level, message) = match fix.success {
            Some(true) => (
                LogLevel::Info,
                format!("{} succeeded for incident {}", fix.action, fix.incident_id),
            ),
            _ => (
                LogLevel::Error,
                format!(
                    "{} failed for incident {}: {}",
                    fix.action,
                    fix.incident_id,
                    fix.error.as_deref().unwrap_or("unknown error")
                ),
            ),
        };
        self.log(level, categories::FIX, message, to_payload(fix)).await;

        self.attach_fix(fix).await;
    }

    /// Mark an incident resolved in its history entry
    pub async fn record_resolution(&self, incident: &Incident, downtime_ms: Option<i64>) {
        self.log(
            LogLevel::Info,
            categories::INCIDENT,
            format!("{} {} resolved", incident.incident_type, incident.id),
            Some(serde_json::json!({
                "incidentId": incident.id,
                "downtimeMs": downtime_ms,
            })),
        )
        .await;

        self.update_history(|history| {
            let Some(entry) = history.iter_mut().find(|e| e.incident.id == incident.id) else {
                return false;
            };
            entry.incident.resolved = true;
            if entry.resolution == Resolution::Pending {
                entry.resolution = Resolution::AutoResolved;
            }
            if entry.total_downtime_ms.is_none() {
                entry.total_downtime_ms = downtime_ms;
            }
            true
        })
        .await;
    }

    pub async fn record_escalation(&self, escalation: &Escalation) {
        self.log(
            LogLevel::Error,
            categories::ESCALATION,
            escalation.summary(),
            to_payload(escalation),
        )
        .await;

        let Some(incident) = &escalation.incident else {
            return;
        };
        self.update_history(|history| {
            match history.iter_mut().find(|e| e.incident.id == incident.id) {
                Some(entry) if entry.resolution == Resolution::Pending => {
                    entry.resolution = Resolution::Escalated;
                    true
                }
                _ => false,
            }
        })
        .await;
    }

    /// Fold a report into the metrics document, logging it when not healthy
    pub async fn record_report(&self, report: &SystemReport) {
        let cap = self.config.max_metric_samples;
        self.update_metrics(|doc| {
            doc.total_reports += 1;
            if report.server_health.is_running {
                doc.running_reports += 1;
            }
            doc.recompute_uptime();

            doc.status_history.push(StatusSample {
                timestamp: report.timestamp,
                status: report.system_status,
            });
            truncate_front(&mut doc.status_history, cap);

            if let Some(response_time_ms) = report.server_health.response_time_ms {
                doc.response_times.push(ResponseTimeSample {
                    timestamp: report.timestamp,
                    response_time_ms,
                });
                truncate_front(&mut doc.response_times, cap);
            }
        })
        .await;

        if report.system_status != SystemStatus::Healthy || !report.active_incidents.is_empty() {
            let level = match report.system_status {
                SystemStatus::Critical | SystemStatus::Down => LogLevel::Error,
                _ => LogLevel::Warn,
            };
            self.log(
                level,
                categories::REPORT,
                format!(
                    "System {} with {} active incident(s)",
                    report.system_status,
                    report.active_incidents.len()
                ),
                Some(serde_json::json!({
                    "systemStatus": report.system_status,
                    "activeIncidents": report.active_incidents.iter().map(|i| &i.id).collect::<Vec<_>>(),
                    "recommendations": report.recommendations,
                })),
            )
            .await;
        }
    }

    /// Persisted incident history, oldest first
    pub async fn history(&self) -> Vec<IncidentHistoryEntry> {
        self.load_json(&self.history_path()).await
    }

    pub async fn metrics_document(&self) -> MetricsDocument {
        self.load_json(&self.metrics_path()).await
    }

    /// Rotated log files, oldest first
    pub async fn rotated_logs(&self) -> Vec<PathBuf> {
        match list_rotated(&self.config.data_dir).await {
            Ok(rotated) => rotated,
            Err(e) => {
                self.report_failure("list_rotated", e);
                Vec::new()
            }
        }
    }

    async fn attach_fix(&self, fix: &FixAction) {
        self.update_history(|history| {
            let Some(entry) = history.iter_mut().find(|e| e.incident.id == fix.incident_id) else {
                debug!(incident_id = %fix.incident_id, "No history entry for fix");
                return false;
            };
            match entry.fixes.iter_mut().find(|f| f.id == fix.id) {
                Some(existing) => *existing = fix.clone(),
                None => entry.fixes.push(fix.clone()),
            }
            true
        })
        .await;
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let dir = &self.config.data_dir;
        fs::create_dir_all(dir)
            .await
            .map_err(|e| AuditError::io(dir, e))?;

        let path = self.log_path();
        rotate_if_needed(
            dir,
            &path,
            self.config.max_log_bytes,
            self.config.max_rotated_files,
        )
        .await?;

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AuditError::io(&path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| AuditError::io(&path, e))?;
        file.flush().await.map_err(|e| AuditError::io(&path, e))?;

        Ok(())
    }

    /// Load, modify and atomically rewrite the history document.
    /// `update` returns whether anything changed; so does this.
    async fn update_history<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut Vec<IncidentHistoryEntry>) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.history_path();

        let mut history: Vec<IncidentHistoryEntry> = self.load_json(&path).await;
        if !update(&mut history) {
            return false;
        }
        truncate_front(&mut history, self.config.max_history_entries);

        if let Err(e) = write_json_atomic(&self.config.data_dir, &path, &history).await {
            self.report_failure("write_history", e);
        }
        true
    }

    async fn update_metrics<F>(&self, update: F)
    where
        F: FnOnce(&mut MetricsDocument),
    {
        let _guard = self.write_lock.lock().await;
        let path = self.metrics_path();

        let mut doc: MetricsDocument = self.load_json(&path).await;
        update(&mut doc);
        doc.last_updated = Some(Utc::now());

        if let Err(e) = write_json_atomic(&self.config.data_dir, &path, &doc).await {
            self.report_failure("write_metrics", e);
        }
    }

    /// Read a JSON document; missing files yield the default, unreadable
    /// ones are reported and replaced on the next write.
    async fn load_json<T>(&self, path: &Path) -> T
    where
        T: DeserializeOwned + Default,
    {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                self.report_failure("read", AuditError::io(path, e));
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse audit document, starting fresh");
                self.report_failure("parse", AuditError::from(e));
                T::default()
            }
        }
    }

    fn report_failure(&self, operation: &str, err: AuditError) {
        error!(operation, error = %err, "Audit store operation failed");
        self.metrics.inc_audit_write_failures();
        let _ = self.failures.send(AuditFailure {
            operation: operation.to_string(),
            error: err.to_string(),
            timestamp: Utc::now(),
        });
    }
}

fn to_payload<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Write via a temp file and rename so readers never see a partial document
async fn write_json_atomic<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), AuditError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| AuditError::io(dir, e))?;

    let json = serde_json::to_vec_pretty(value)?;
    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| AuditError::io(&temp_path, e))?;
    file.write_all(&json)
        .await
        .map_err(|e| AuditError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| AuditError::io(&temp_path, e))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| AuditError::io(path, e))?;
    Ok(())
}
