//! Incident diagnosis
//!
//! Pure mapping from an incident (type + description) and the state of the
//! project manifest to a cause, a suggested fix and the remediation to run.

use crate::models::{DiagnosticResult, FixActionType, Incident, IncidentType, Severity};
use std::path::Path;

/// Readability of the project manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    Valid,
    Missing,
    Corrupt(String),
}

/// Read and parse the project manifest.
///
/// `.toml` manifests are parsed as TOML, everything else as JSON.
pub fn inspect_manifest(path: &Path) -> ManifestStatus {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ManifestStatus::Missing,
        Err(e) => return ManifestStatus::Corrupt(e.to_string()),
    };

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let parsed = if is_toml {
        toml::from_str::<toml::Value>(&content).map(|_| ()).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<serde_json::Value>(&content)
            .map(|_| ())
            .map_err(|e| e.to_string())
    };

    match parsed {
        Ok(()) => ManifestStatus::Valid,
        Err(reason) => ManifestStatus::Corrupt(reason),
    }
}

/// What the engine should do with a diagnosed incident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    AttemptFix(FixActionType),
    Escalate,
    /// Left to the orchestrator's escalation policy
    Defer,
}

/// Diagnose an incident.
///
/// `manifest` is only consulted for build errors.
pub fn diagnose(incident: &Incident, manifest: impl FnOnce() -> ManifestStatus) -> DiagnosticResult {
    let description = incident.description.to_lowercase();

    match incident.incident_type {
        IncidentType::ServerDown if description.contains("connection refused") => DiagnosticResult {
            issue: "Server process is not running".to_string(),
            severity: incident.severity,
            suggested_fix: "Restart the server".to_string(),
            auto_fixable: true,
            action: Some(FixActionType::RestartServer),
        },
        IncidentType::ServerDown => DiagnosticResult {
            issue: "Server process may be running but is not responding".to_string(),
            severity: incident.severity,
            suggested_fix: "Kill the unresponsive process and restart the server".to_string(),
            auto_fixable: true,
            action: Some(FixActionType::KillProcess),
        },
        IncidentType::BuildError => match manifest() {
            ManifestStatus::Valid if description.contains("cache") => DiagnosticResult {
                issue: "Build cache appears to be stale or corrupted".to_string(),
                severity: incident.severity,
                suggested_fix: "Clear build caches and restart the server".to_string(),
                auto_fixable: true,
                action: Some(FixActionType::ClearCache),
            },
            ManifestStatus::Valid => DiagnosticResult {
                issue: "Build failed, likely due to missing or broken dependencies".to_string(),
                severity: incident.severity,
                suggested_fix: "Reinstall dependencies and restart the server".to_string(),
                auto_fixable: true,
                action: Some(FixActionType::InstallDeps),
            },
            ManifestStatus::Missing => manifest_unusable("Project manifest is missing"),
            ManifestStatus::Corrupt(reason) => {
                manifest_unusable(&format!("Project manifest is corrupt: {}", reason))
            }
        },
        IncidentType::Crash => DiagnosticResult {
            issue: "Server process crashed".to_string(),
            severity: incident.severity,
            suggested_fix: "Restart the server after a short grace period".to_string(),
            auto_fixable: true,
            action: Some(FixActionType::RestartServer),
        },
        IncidentType::SlowResponse => DiagnosticResult {
            issue: "Server is responding slowly".to_string(),
            severity: incident.severity,
            suggested_fix: "Check CPU and memory usage, recent deployments and slow endpoints"
                .to_string(),
            auto_fixable: false,
            action: None,
        },
    }
}

fn manifest_unusable(issue: &str) -> DiagnosticResult {
    DiagnosticResult {
        issue: issue.to_string(),
        severity: Severity::Critical,
        suggested_fix: "Restore the project manifest from version control, then reinstall dependencies"
            .to_string(),
        auto_fixable: false,
        action: None,
    }
}

/// Decide between fixing, escalating and deferring
pub fn disposition(incident_type: IncidentType, diagnostic: &DiagnosticResult) -> Disposition {
    if incident_type == IncidentType::SlowResponse {
        return Disposition::Defer;
    }

    match diagnostic.action {
        Some(action) if diagnostic.auto_fixable && diagnostic.severity > Severity::Low => {
            Disposition::AttemptFix(action)
        }
        _ => Disposition::Escalate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn incident(incident_type: IncidentType, severity: Severity, description: &str) -> Incident {
        Incident::new(incident_type, severity, description, Utc::now())
    }

    fn unreachable_manifest() -> ManifestStatus {
        panic!("manifest must not be read for this incident type")
    }

    #[test]
    fn test_connection_refused_selects_restart() {
        let inc = incident(
            IncidentType::ServerDown,
            Severity::Critical,
            "Server on port 3000 is not reachable: connection refused",
        );
        let diag = diagnose(&inc, unreachable_manifest);

        assert!(diag.auto_fixable);
        assert_eq!(diag.action, Some(FixActionType::RestartServer));
        assert_eq!(diag.issue, "Server process is not running");
        assert_eq!(
            disposition(inc.incident_type, &diag),
            Disposition::AttemptFix(FixActionType::RestartServer)
        );
    }

    #[test]
    fn test_unresponsive_server_selects_kill_then_restart() {
        let inc = incident(
            IncidentType::ServerDown,
            Severity::Critical,
            "Server returned HTTP 500 on port 3000",
        );
        let diag = diagnose(&inc, unreachable_manifest);

        assert!(diag.auto_fixable);
        assert_eq!(diag.action, Some(FixActionType::KillProcess));
    }

    #[test]
    fn test_build_error_with_valid_manifest_reinstalls_dependencies() {
        let inc = incident(IncidentType::BuildError, Severity::High, "Module not found: 'left-pad'");
        let diag = diagnose(&inc, || ManifestStatus::Valid);

        assert!(diag.auto_fixable);
        assert_eq!(diag.action, Some(FixActionType::InstallDeps));
        assert_eq!(diag.severity, Severity::High);
    }

    #[test]
    fn test_build_error_mentioning_cache_clears_cache() {
        let inc = incident(IncidentType::BuildError, Severity::High, "Corrupted build cache entry");
        let diag = diagnose(&inc, || ManifestStatus::Valid);

        assert_eq!(diag.action, Some(FixActionType::ClearCache));
    }

    #[test]
    fn test_build_error_with_missing_manifest_is_critical_and_not_fixable() {
        let inc = incident(IncidentType::BuildError, Severity::High, "Failed to compile");
        let diag = diagnose(&inc, || ManifestStatus::Missing);

        assert!(!diag.auto_fixable);
        assert_eq!(diag.severity, Severity::Critical);
        assert_eq!(diag.action, None);
        assert_eq!(disposition(inc.incident_type, &diag), Disposition::Escalate);
    }

    #[test]
    fn test_crash_is_always_fixable() {
        let inc = incident(IncidentType::Crash, Severity::High, "Process exited with code 1");
        let diag = diagnose(&inc, unreachable_manifest);

        assert!(diag.auto_fixable);
        assert_eq!(diag.action, Some(FixActionType::RestartServer));
    }

    #[test]
    fn test_slow_response_is_deferred() {
        let inc = incident(IncidentType::SlowResponse, Severity::Medium, "took 3500ms");
        let diag = diagnose(&inc, unreachable_manifest);

        assert!(!diag.auto_fixable);
        assert_eq!(disposition(inc.incident_type, &diag), Disposition::Defer);
    }

    #[test]
    fn test_low_severity_fixable_incident_is_escalated() {
        let inc = incident(IncidentType::Crash, Severity::Low, "exit 0");
        let diag = diagnose(&inc, unreachable_manifest);

        assert!(diag.auto_fixable);
        assert_eq!(disposition(inc.incident_type, &diag), Disposition::Escalate);
    }

    #[test]
    fn test_inspect_manifest_variants() {
        let dir = TempDir::new().unwrap();

        let json = dir.path().join("package.json");
        assert_eq!(inspect_manifest(&json), ManifestStatus::Missing);

        std::fs::write(&json, r#"{"name": "app", "scripts": {"dev": "next dev"}}"#).unwrap();
        assert_eq!(inspect_manifest(&json), ManifestStatus::Valid);

        std::fs::write(&json, "{ not json").unwrap();
        assert!(matches!(inspect_manifest(&json), ManifestStatus::Corrupt(_)));

        let cargo = dir.path().join("Cargo.toml");
        std::fs::write(&cargo, "[package]\nname = \"app\"\n").unwrap();
        assert_eq!(inspect_manifest(&cargo), ManifestStatus::Valid);

        std::fs::write(&cargo, "[package\nname = ").unwrap();
        assert!(matches!(inspect_manifest(&cargo), ManifestStatus::Corrupt(_)));
    }
}
