//! Observability infrastructure for the warden pipeline
//!
//! Provides:
//! - Prometheus metrics (probe latency, incidents, fixes, escalations, status)
//! - Structured logging of lifecycle events with tracing

use crate::events::Escalation;
use crate::models::{FixAction, Incident, SystemReport, SystemStatus};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for probe latency (in seconds)
const PROBE_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 3.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<WardenMetricsInner> = OnceLock::new();

struct WardenMetricsInner {
    probe_latency_seconds: Histogram,
    probe_failures: IntCounter,
    incidents_raised: IntCounterVec,
    incidents_resolved: IntCounter,
    fixes: IntCounterVec,
    escalations: IntCounter,
    active_incidents: IntGauge,
    system_status: IntGauge,
    audit_write_failures: IntCounter,
}

impl WardenMetricsInner {
    fn new() -> Self {
        Self {
            probe_latency_seconds: register_histogram!(
                "warden_probe_latency_seconds",
                "Latency of health probes against the target service",
                PROBE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            probe_failures: register_int_counter!(
                "warden_probe_failures_total",
                "Health probes that failed at the transport level or returned a non-OK status"
            )
            .expect("Failed to register probe_failures"),

            incidents_raised: register_int_counter_vec!(
                "warden_incidents_raised_total",
                "Incidents raised by type",
                &["type"]
            )
            .expect("Failed to register incidents_raised"),

            incidents_resolved: register_int_counter!(
                "warden_incidents_resolved_total",
                "Incidents marked resolved"
            )
            .expect("Failed to register incidents_resolved"),

            fixes: register_int_counter_vec!(
                "warden_fixes_total",
                "Completed remediation attempts by action and outcome",
                &["action", "outcome"]
            )
            .expect("Failed to register fixes"),

            escalations: register_int_counter!(
                "warden_escalations_total",
                "Human escalations emitted"
            )
            .expect("Failed to register escalations"),

            active_incidents: register_int_gauge!(
                "warden_active_incidents",
                "Unresolved incidents at the last report"
            )
            .expect("Failed to register active_incidents"),

            system_status: register_int_gauge!(
                "warden_system_status",
                "Overall status at the last report (0 healthy, 1 degraded, 2 critical, 3 down)"
            )
            .expect("Failed to register system_status"),

            audit_write_failures: register_int_counter!(
                "warden_audit_write_failures_total",
                "Audit store writes that failed and were swallowed"
            )
            .expect("Failed to register audit_write_failures"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct WardenMetrics {
    _private: (),
}

impl Default for WardenMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WardenMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(WardenMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &WardenMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_probe_latency(&self, duration_secs: f64) {
        self.inner().probe_latency_seconds.observe(duration_secs);
    }

    pub fn inc_probe_failures(&self) {
        self.inner().probe_failures.inc();
    }

    pub fn inc_incidents_raised(&self, incident_type: &str) {
        self.inner()
            .incidents_raised
            .with_label_values(&[incident_type])
            .inc();
    }

    pub fn inc_incidents_resolved(&self) {
        self.inner().incidents_resolved.inc();
    }

    pub fn inc_fixes(&self, action: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner().fixes.with_label_values(&[action, outcome]).inc();
    }

    pub fn inc_escalations(&self) {
        self.inner().escalations.inc();
    }

    pub fn set_report_state(&self, status: SystemStatus, active_incidents: usize) {
        self.inner().system_status.set(status.level());
        self.inner().active_incidents.set(active_incidents as i64);
    }

    pub fn inc_audit_write_failures(&self) {
        self.inner().audit_write_failures.inc();
    }
}

/// Structured logger for pipeline events
///
/// Gives every significant event one consistent tracing record, tagged with
/// the monitored service so several wardens can share a log sink.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_incident_raised(&self, incident: &Incident) {
        warn!(
            event = "incident_raised",
            service = %self.service,
            incident_id = %incident.id,
            incident_type = %incident.incident_type,
            severity = %incident.severity,
            description = %incident.description,
            "Incident raised"
        );
    }

    pub fn log_incident_resolved(&self, incident: &Incident, downtime_ms: Option<i64>) {
        info!(
            event = "incident_resolved",
            service = %self.service,
            incident_id = %incident.id,
            incident_type = %incident.incident_type,
            downtime_ms = ?downtime_ms,
            "Incident resolved"
        );
    }

    pub fn log_fix_attempted(&self, fix: &FixAction) {
        info!(
            event = "fix_attempted",
            service = %self.service,
            fix_id = %fix.id,
            incident_id = %fix.incident_id,
            action = %fix.action,
            "Attempting automated fix"
        );
    }

    pub fn log_fix_completed(&self, fix: &FixAction) {
        if fix.success == Some(true) {
            info!(
                event = "fix_completed",
                service = %self.service,
                fix_id = %fix.id,
                incident_id = %fix.incident_id,
                action = %fix.action,
                success = true,
                "Automated fix completed"
            );
        } else {
            warn!(
                event = "fix_completed",
                service = %self.service,
                fix_id = %fix.id,
                incident_id = %fix.incident_id,
                action = %fix.action,
                success = false,
                error = ?fix.error,
                "Automated fix failed"
            );
        }
    }

    pub fn log_escalation(&self, escalation: &Escalation) {
        error!(
            event = "escalation_required",
            service = %self.service,
            incident_id = ?escalation.incident.as_ref().map(|i| i.id.as_str()),
            reason = %escalation.reason,
            summary = %escalation.summary(),
            "Human intervention required"
        );
    }

    pub fn log_report(&self, report: &SystemReport) {
        info!(
            event = "report_generated",
            service = %self.service,
            status = %report.system_status,
            active_incidents = report.active_incidents.len(),
            recent_fixes = report.recent_fixes.len(),
            "System report generated"
        );
    }

    /// Periodic heartbeat so long healthy stretches stay visible
    pub fn log_status(&self, status: SystemStatus, active_incidents: usize, total_fixes: usize) {
        info!(
            event = "status",
            service = %self.service,
            status = %status,
            active_incidents = active_incidents,
            total_fixes = total_fixes,
            "Warden status"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "warden_started",
            service = %self.service,
            warden_version = %version,
            "Warden started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "warden_shutdown",
            service = %self.service,
            reason = %reason,
            "Warden shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warden_metrics_creation() {
        // Metrics live in the global registry; repeated construction reuses them.
        let metrics = WardenMetrics::new();
        let again = WardenMetrics::new();

        metrics.observe_probe_latency(0.12);
        metrics.inc_probe_failures();
        metrics.inc_incidents_raised("SERVER_DOWN");
        again.inc_incidents_resolved();
        again.inc_fixes("RESTART_SERVER", true);
        again.inc_escalations();
        metrics.set_report_state(SystemStatus::Degraded, 3);
        metrics.inc_audit_write_failures();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("localhost:3000");
        assert_eq!(logger.service, "localhost:3000");
    }
}
