//! Typed events published by each pipeline component
//!
//! Every component owns a `tokio::sync::broadcast` channel carrying its own
//! closed set of variants. The orchestrator re-publishes all of them as
//! [`WardenEvent`] for outside consumers (notifiers, dashboards).

use crate::models::{
    DiagnosticResult, FixAction, Incident, ServerHealth, SystemReport,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default capacity for component event channels
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the health monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// A probe completed and the health snapshot was replaced
    HealthChecked(ServerHealth),
    IncidentRaised(Incident),
    IncidentResolved(Incident),
}

/// Events emitted by the remediation engine
#[derive(Debug, Clone, PartialEq)]
pub enum RemediationEvent {
    FixAttempted(FixAction),
    FixCompleted(FixAction),
    /// Verification confirmed the service is healthy again
    IncidentResolved {
        incident: Incident,
        downtime_ms: i64,
    },
    /// Automated remediation cannot handle this incident
    EscalationRequested(Escalation),
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    ReportGenerated(SystemReport),
    /// A human must intervene
    EscalationRequired(Escalation),
}

/// Union of every event observable from outside the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum WardenEvent {
    Monitor(MonitorEvent),
    Remediation(RemediationEvent),
    Orchestrator(OrchestratorEvent),
}

/// Events emitted by the supervised service process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Output line matching a build-failure marker
    BuildFailure(String),
    /// The process exited without being asked to
    UnexpectedExit { code: Option<i32> },
}

/// Why a human is being paged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    /// Diagnosis found no safe automated remedy
    NotAutoFixable,
    /// Running the remediation itself failed
    FixFailed { error: String },
    /// The fix ran but the service was still unhealthy afterwards
    VerificationFailed,
    /// Too many failed fixes inside the rolling window
    RepeatedFixFailures { failed_fixes: usize, window_secs: i64 },
    /// A critical incident stayed open past the allowed age
    ProlongedCritical { incident_id: String, open_secs: i64 },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::NotAutoFixable => write!(f, "incident is not auto-fixable"),
            EscalationReason::FixFailed { error } => write!(f, "automated fix failed: {}", error),
            EscalationReason::VerificationFailed => write!(f, "fix verification failed"),
            EscalationReason::RepeatedFixFailures {
                failed_fixes,
                window_secs,
            } => write!(
                f,
                "{} automated fixes failed within the last {} minutes",
                failed_fixes,
                window_secs / 60
            ),
            EscalationReason::ProlongedCritical {
                incident_id,
                open_secs,
            } => write!(
                f,
                "critical incident {} open for {} minutes",
                incident_id,
                open_secs / 60
            ),
        }
    }
}

/// Request for human intervention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    pub reason: EscalationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident: Option<Incident>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<DiagnosticResult>,
    pub timestamp: DateTime<Utc>,
}

impl Escalation {
    pub fn new(reason: EscalationReason) -> Self {
        Self {
            reason,
            incident: None,
            diagnostic: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_incident(mut self, incident: Incident) -> Self {
        self.incident = Some(incident);
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: DiagnosticResult) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    /// Human-readable summary used in logs and notifications
    pub fn summary(&self) -> String {
        match (&self.incident, &self.diagnostic) {
            (Some(incident), Some(diag)) => format!(
                "{} [{}] {}: {} (suggested: {})",
                incident.incident_type, diag.severity, self.reason, diag.issue, diag.suggested_fix
            ),
            (Some(incident), None) => format!(
                "{} [{}] {}: {}",
                incident.incident_type, incident.severity, self.reason, incident.description
            ),
            _ => self.reason.to_string(),
        }
    }
}
