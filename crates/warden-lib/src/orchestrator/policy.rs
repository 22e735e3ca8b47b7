//! Escalation policy evaluated after every report

use crate::events::{Escalation, EscalationReason};
use crate::models::{FixAction, Incident, Severity};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// When a human must be paged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Failed fixes inside `failure_window` that trigger an escalation (default: 3)
    pub failed_fix_threshold: usize,
    /// Rolling window for counting failed fixes (default: 10 minutes)
    pub failure_window: Duration,
    /// Age past which an open CRITICAL incident is escalated (default: 5 minutes)
    pub critical_max_age: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            failed_fix_threshold: 3,
            failure_window: Duration::from_secs(10 * 60),
            critical_max_age: Duration::from_secs(5 * 60),
        }
    }
}

impl EscalationPolicy {
    pub fn with_failed_fix_threshold(mut self, threshold: usize) -> Self {
        self.failed_fix_threshold = threshold;
        self
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    pub fn with_critical_max_age(mut self, age: Duration) -> Self {
        self.critical_max_age = age;
        self
    }
}

fn chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::weeks(52 * 100))
}

/// Failed fixes whose attempt started within `window` of `now`
pub fn failed_fixes_within(fixes: &[FixAction], now: DateTime<Utc>, window: Duration) -> usize {
    let window = chrono(window);
    fixes
        .iter()
        .filter(|f| f.is_failed() && now - f.timestamp <= window)
        .count()
}

/// Escalations warranted right now.
///
/// At most one escalation for repeated fix failures, plus one per CRITICAL
/// incident open longer than the allowed age. Conditions that still hold on
/// the next evaluation fire again.
pub fn evaluate_escalation(
    active: &[Incident],
    fixes: &[FixAction],
    now: DateTime<Utc>,
    policy: &EscalationPolicy,
) -> Vec<Escalation> {
    let mut out = Vec::new();

    let failed = failed_fixes_within(fixes, now, policy.failure_window);
    if policy.failed_fix_threshold > 0 && failed >= policy.failed_fix_threshold {
        out.push(Escalation {
            timestamp: now,
            ..Escalation::new(EscalationReason::RepeatedFixFailures {
                failed_fixes: failed,
                window_secs: policy.failure_window.as_secs() as i64,
            })
        });
    }

    let max_age = chrono(policy.critical_max_age);
    for incident in active
        .iter()
        .filter(|i| !i.resolved && i.severity == Severity::Critical)
    {
        let age = incident.age(now);
        if age > max_age {
            out.push(Escalation {
                timestamp: now,
                ..Escalation::new(EscalationReason::ProlongedCritical {
                    incident_id: incident.id.clone(),
                    open_secs: age.num_seconds(),
                })
                .for_incident(incident.clone())
            });
        }
    }

    out
}
