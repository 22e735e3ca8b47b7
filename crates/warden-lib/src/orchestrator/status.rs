//! Status derivation and report recommendations
//!
//! Both functions are pure: the same inputs always give the same output,
//! with no dependence on earlier reports.

use crate::models::{Incident, IncidentType, ServerHealth, Severity, SystemStatus};

/// Unresolved incidents beyond which the system counts as degraded
const DEGRADED_INCIDENT_COUNT: usize = 2;

/// Derive overall status, first match wins:
/// not running, any CRITICAL, any HIGH or more than two incidents, healthy.
pub fn compute_status(health: &ServerHealth, active: &[Incident]) -> SystemStatus {
    let open = || active.iter().filter(|i| !i.resolved);

    if !health.is_running {
        SystemStatus::Down
    } else if open().any(|i| i.severity == Severity::Critical) {
        SystemStatus::Critical
    } else if open().any(|i| i.severity == Severity::High)
        || open().count() > DEGRADED_INCIDENT_COUNT
    {
        SystemStatus::Degraded
    } else {
        SystemStatus::Healthy
    }
}

/// Situational advice for a report
pub fn recommendations(active: &[Incident], recent_failed_fixes: usize) -> Vec<String> {
    let present = |t: IncidentType| active.iter().any(|i| !i.resolved && i.incident_type == t);
    let mut out = Vec::new();

    if present(IncidentType::ServerDown) {
        out.push("Server is down; an automatic restart will be attempted".to_string());
    }
    if present(IncidentType::Crash) {
        out.push("Server crashed; it will be restarted after a short grace period".to_string());
    }
    if present(IncidentType::BuildError) {
        out.push(
            "Build errors detected; dependencies will be reinstalled if the manifest is intact"
                .to_string(),
        );
    }
    if present(IncidentType::SlowResponse) {
        out.push(
            "Responses are slow; check CPU and memory usage and recently changed endpoints"
                .to_string(),
        );
    }
    if recent_failed_fixes > 0 {
        out.push(format!(
            "{} automated fix(es) failed recently; manual investigation may be required",
            recent_failed_fixes
        ));
    }
    if out.is_empty() {
        out.push("All systems operational".to_string());
    }

    out
}
