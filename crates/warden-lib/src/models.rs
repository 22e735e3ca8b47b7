//! Core data models for the self-healing pipeline

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of the target service, replaced wholesale on every probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    pub is_running: bool,
    pub port: u16,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub errors: Vec<String>,
}

impl ServerHealth {
    /// Health before the first probe has completed
    pub fn unknown(port: u16) -> Self {
        Self {
            is_running: false,
            port,
            last_check: Utc::now(),
            response_time_ms: None,
            errors: Vec::new(),
        }
    }
}

/// Incident classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    ServerDown,
    SlowResponse,
    BuildError,
    Crash,
}

impl IncidentType {
    pub const ALL: [IncidentType; 4] = [
        IncidentType::ServerDown,
        IncidentType::SlowResponse,
        IncidentType::BuildError,
        IncidentType::Crash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::ServerDown => "SERVER_DOWN",
            IncidentType::SlowResponse => "SLOW_RESPONSE",
            IncidentType::BuildError => "BUILD_ERROR",
            IncidentType::Crash => "CRASH",
        }
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected deviation from healthy service operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

impl Incident {
    pub fn new(
        incident_type: IncidentType,
        severity: Severity,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id("inc", timestamp),
            incident_type,
            severity,
            description: description.into(),
            timestamp,
            resolved: false,
        }
    }

    /// Time the incident has been open as of `now`
    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.timestamp
    }
}

/// Outcome of diagnosing a single incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResult {
    pub issue: String,
    pub severity: Severity,
    pub suggested_fix: String,
    pub auto_fixable: bool,
    /// Remediation to run when `auto_fixable` holds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<FixActionType>,
}

/// Kind of remediation attempted for an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixActionType {
    RestartServer,
    InstallDeps,
    FixConfig,
    ClearCache,
    KillProcess,
}

impl FixActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixActionType::RestartServer => "RESTART_SERVER",
            FixActionType::InstallDeps => "INSTALL_DEPS",
            FixActionType::FixConfig => "FIX_CONFIG",
            FixActionType::ClearCache => "CLEAR_CACHE",
            FixActionType::KillProcess => "KILL_PROCESS",
        }
    }
}

impl fmt::Display for FixActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete remediation attempt tied to one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixAction {
    pub id: String,
    pub incident_id: String,
    pub action: FixActionType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixAction {
    pub fn new(
        incident_id: impl Into<String>,
        action: FixActionType,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id("fix", timestamp),
            incident_id: incident_id.into(),
            action,
            description: description.into(),
            timestamp,
            success: None,
            error: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.success.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.success == Some(false)
    }
}

/// Overall status derived from health and active incidents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    Healthy,
    Degraded,
    Critical,
    Down,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Healthy => "HEALTHY",
            SystemStatus::Degraded => "DEGRADED",
            SystemStatus::Critical => "CRITICAL",
            SystemStatus::Down => "DOWN",
        }
    }

    /// Numeric level used by the status gauge
    pub fn level(&self) -> i64 {
        match self {
            SystemStatus::Healthy => 0,
            SystemStatus::Degraded => 1,
            SystemStatus::Critical => 2,
            SystemStatus::Down => 3,
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time aggregate of health, incidents and fixes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReport {
    pub timestamp: DateTime<Utc>,
    pub server_health: ServerHealth,
    pub active_incidents: Vec<Incident>,
    pub recent_fixes: Vec<FixAction>,
    pub system_status: SystemStatus,
    pub recommendations: Vec<String>,
}

/// How an incident was ultimately handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    AutoResolved,
    Escalated,
    Pending,
}

/// Durable join of an incident and the fixes attempted for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentHistoryEntry {
    pub incident: Incident,
    pub fixes: Vec<FixAction>,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_downtime_ms: Option<i64>,
}

impl IncidentHistoryEntry {
    pub fn pending(incident: Incident) -> Self {
        Self {
            incident,
            fixes: Vec::new(),
            resolution: Resolution::Pending,
            total_downtime_ms: None,
        }
    }
}

/// Build a time-ordered identifier with a random suffix, e.g. `inc_1704067200000_3f2a9c1b`
pub fn generate_id(prefix: &str, at: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, at.timestamp_millis(), &random[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_serializes_with_wire_names() {
        let incident = Incident::new(
            IncidentType::ServerDown,
            Severity::Critical,
            "Server returned HTTP 500",
            Utc::now(),
        );

        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["type"], "SERVER_DOWN");
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["resolved"], false);
        assert!(json["id"].as_str().unwrap().starts_with("inc_"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let now = Utc::now();
        let a = generate_id("fix", now);
        let b = generate_id("fix", now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_fix_action_flags() {
        let mut fix = FixAction::new("inc_1", FixActionType::RestartServer, "restart", Utc::now());
        assert!(fix.is_in_flight());
        assert!(!fix.is_failed());

        fix.success = Some(false);
        assert!(!fix.is_in_flight());
        assert!(fix.is_failed());
    }
}
