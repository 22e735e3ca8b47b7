//! Shared incident ledger
//!
//! The health monitor creates incidents here; the remediation engine marks
//! them resolved. Resolution is monotonic: a resolved incident never reopens.

use crate::models::{Incident, IncidentType, Severity};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::RwLock;

/// Resolved incidents kept in memory beyond which the oldest are pruned
pub const DEFAULT_MAX_RETAINED_INCIDENTS: usize = 1000;

/// In-memory store of every incident raised in this process
pub struct IncidentLedger {
    incidents: RwLock<Vec<Incident>>,
    max_retained: usize,
}

impl Default for IncidentLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentLedger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RETAINED_INCIDENTS)
    }

    pub fn with_capacity(max_retained: usize) -> Self {
        Self {
            incidents: RwLock::new(Vec::new()),
            max_retained,
        }
    }

    /// Record a new incident unless an unresolved one of the same type was
    /// raised within `dedup_window` of `now`.
    ///
    /// Returns the created incident, or `None` when suppressed.
    pub fn raise(
        &self,
        incident_type: IncidentType,
        severity: Severity,
        description: impl Into<String>,
        now: DateTime<Utc>,
        dedup_window: ChronoDuration,
    ) -> Option<Incident> {
        let mut incidents = self.incidents.write().unwrap_or_else(|e| e.into_inner());

        let duplicate = incidents.iter().any(|i| {
            i.incident_type == incident_type && !i.resolved && now - i.timestamp < dedup_window
        });
        if duplicate {
            return None;
        }

        let incident = Incident::new(incident_type, severity, description, now);
        incidents.push(incident.clone());
        prune_resolved(&mut incidents, self.max_retained);

        Some(incident)
    }

    /// Mark an incident resolved; `None` if unknown or already resolved
    pub fn resolve(&self, incident_id: &str) -> Option<Incident> {
        let mut incidents = self.incidents.write().unwrap_or_else(|e| e.into_inner());
        let incident = incidents
            .iter_mut()
            .find(|i| i.id == incident_id && !i.resolved)?;
        incident.resolved = true;
        Some(incident.clone())
    }

    /// Resolve every open incident of the given types
    pub fn resolve_types(&self, types: &[IncidentType]) -> Vec<Incident> {
        let mut incidents = self.incidents.write().unwrap_or_else(|e| e.into_inner());
        incidents
            .iter_mut()
            .filter(|i| !i.resolved && types.contains(&i.incident_type))
            .map(|i| {
                i.resolved = true;
                i.clone()
            })
            .collect()
    }

    pub fn get(&self, incident_id: &str) -> Option<Incident> {
        let incidents = self.incidents.read().unwrap_or_else(|e| e.into_inner());
        incidents.iter().find(|i| i.id == incident_id).cloned()
    }

    /// Unresolved incidents, oldest first
    pub fn active(&self) -> Vec<Incident> {
        let incidents = self.incidents.read().unwrap_or_else(|e| e.into_inner());
        incidents.iter().filter(|i| !i.resolved).cloned().collect()
    }

    pub fn all(&self) -> Vec<Incident> {
        self.incidents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.incidents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop the oldest resolved incidents while over capacity; open ones are kept
fn prune_resolved(incidents: &mut Vec<Incident>, max_retained: usize) {
    let mut excess = incidents.len().saturating_sub(max_retained);
    if excess == 0 {
        return;
    }
    incidents.retain(|i| {
        if excess > 0 && i.resolved {
            excess -= 1;
            false
        } else {
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> ChronoDuration {
        ChronoDuration::seconds(60)
    }

    #[test]
    fn test_raise_suppresses_duplicates_inside_window() {
        let ledger = IncidentLedger::new();
        let t0 = Utc::now();

        let first = ledger.raise(IncidentType::ServerDown, Severity::Critical, "down", t0, window());
        assert!(first.is_some());

        for offset in [1, 10, 30, 59] {
            let dup = ledger.raise(
                IncidentType::ServerDown,
                Severity::Critical,
                "down again",
                t0 + ChronoDuration::seconds(offset),
                window(),
            );
            assert!(dup.is_none(), "duplicate at +{}s should be suppressed", offset);
        }

        assert_eq!(ledger.active().len(), 1);
    }

    #[test]
    fn test_raise_allows_other_types() {
        let ledger = IncidentLedger::new();
        let now = Utc::now();

        ledger.raise(IncidentType::ServerDown, Severity::Critical, "down", now, window());
        let slow = ledger.raise(IncidentType::SlowResponse, Severity::Medium, "slow", now, window());

        assert!(slow.is_some());
        assert_eq!(ledger.active().len(), 2);
    }

    #[test]
    fn test_raise_after_resolution_creates_new_incident() {
        let ledger = IncidentLedger::new();
        let now = Utc::now();

        let first = ledger
            .raise(IncidentType::Crash, Severity::High, "exit 1", now, window())
            .unwrap();
        ledger.resolve(&first.id).unwrap();

        let second = ledger.raise(
            IncidentType::Crash,
            Severity::High,
            "exit 1",
            now + ChronoDuration::seconds(5),
            window(),
        );
        assert!(second.is_some());
        assert_ne!(second.unwrap().id, first.id);
    }

    #[test]
    fn test_resolution_is_monotonic() {
        let ledger = IncidentLedger::new();
        let incident = ledger
            .raise(IncidentType::SlowResponse, Severity::Medium, "slow", Utc::now(), window())
            .unwrap();

        assert!(ledger.resolve(&incident.id).is_some());
        // A second resolve is a no-op and the flag stays set.
        assert!(ledger.resolve(&incident.id).is_none());
        assert!(ledger.get(&incident.id).unwrap().resolved);
        assert!(ledger.resolve("inc_unknown").is_none());
    }

    #[test]
    fn test_resolve_types_only_touches_matching_open_incidents() {
        let ledger = IncidentLedger::new();
        let now = Utc::now();

        ledger.raise(IncidentType::ServerDown, Severity::Critical, "down", now, window());
        ledger.raise(IncidentType::BuildError, Severity::High, "build", now, window());

        let cleared = ledger.resolve_types(&[IncidentType::ServerDown, IncidentType::SlowResponse]);
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].incident_type, IncidentType::ServerDown);

        let active = ledger.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].incident_type, IncidentType::BuildError);
    }

    #[test]
    fn test_prunes_oldest_resolved_incidents() {
        let ledger = IncidentLedger::with_capacity(3);
        let now = Utc::now();

        for i in 0..5 {
            let incident = ledger
                .raise(
                    IncidentType::Crash,
                    Severity::High,
                    format!("crash {}", i),
                    now + ChronoDuration::seconds(i),
                    window(),
                )
                .unwrap();
            ledger.resolve(&incident.id);
        }

        let open = ledger
            .raise(IncidentType::ServerDown, Severity::Critical, "down", now, window())
            .unwrap();

        assert_eq!(ledger.len(), 3);
        assert!(ledger.get(&open.id).is_some());
        let kept: Vec<String> = ledger.all().into_iter().map(|i| i.description).collect();
        assert!(kept.contains(&"crash 4".to_string()));
        assert!(!kept.contains(&"crash 0".to_string()));
    }
}
