//! Per-incident remediation state machine
//!
//! ```text
//! Received -> Diagnosed -> FixAttempted -> Verifying -> Resolved
//!                       |              |            `-> VerifyFailed -> Escalated
//!                       |              `-> Escalated (fix failed)
//!                       |-> Escalated (not auto-fixable)
//!                       `-> Deferred (left to the orchestrator)
//! ```
//!
//! The machine is advanced by discrete events and answers with effects for
//! the engine to perform. It does no I/O and keeps no timers, so the whole
//! workflow can be exercised by feeding synthetic events.

use super::diagnosis::{disposition, Disposition};
use crate::error::TransitionError;
use crate::events::EscalationReason;
use crate::models::{DiagnosticResult, FixActionType, Incident, IncidentType};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemediationState {
    Received,
    Diagnosed,
    FixAttempted,
    Verifying,
    Resolved,
    VerifyFailed,
    Escalated,
    Deferred,
}

impl RemediationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemediationState::Resolved | RemediationState::Escalated | RemediationState::Deferred
        )
    }
}

impl fmt::Display for RemediationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemediationState::Received => "RECEIVED",
            RemediationState::Diagnosed => "DIAGNOSED",
            RemediationState::FixAttempted => "AUTO_FIX_ATTEMPTED",
            RemediationState::Verifying => "VERIFYING",
            RemediationState::Resolved => "RESOLVED",
            RemediationState::VerifyFailed => "VERIFY_FAILED",
            RemediationState::Escalated => "ESCALATED",
            RemediationState::Deferred => "DEFERRED",
        };
        f.write_str(name)
    }
}

/// Inputs that advance a workflow
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Diagnosed(DiagnosticResult),
    FixSucceeded,
    FixFailed(String),
    VerificationPassed,
    VerificationFailed,
}

impl WorkflowEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Diagnosed(_) => "diagnosed",
            WorkflowEvent::FixSucceeded => "fix_succeeded",
            WorkflowEvent::FixFailed(_) => "fix_failed",
            WorkflowEvent::VerificationPassed => "verification_passed",
            WorkflowEvent::VerificationFailed => "verification_failed",
        }
    }
}

/// Work the engine must perform after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEffect {
    /// Run a remediation after `delay`
    ExecuteFix { action: FixActionType, delay: Duration },
    /// Probe the service once after `delay`
    ScheduleVerification(Duration),
    MarkResolved,
    Escalate(EscalationReason),
    Defer,
}

/// Delays applied by the workflow
#[derive(Debug, Clone, Copy)]
pub struct WorkflowTimings {
    /// Grace period before restarting a crashed process
    pub crash_grace: Duration,
    /// Wait between a successful fix and its verification probe
    pub verify_delay: Duration,
}

impl Default for WorkflowTimings {
    fn default() -> Self {
        Self {
            crash_grace: Duration::from_secs(2),
            verify_delay: Duration::from_secs(30),
        }
    }
}

/// Remediation workflow for a single incident
#[derive(Debug, Clone)]
pub struct RemediationWorkflow {
    incident: Incident,
    state: RemediationState,
    diagnostic: Option<DiagnosticResult>,
    timings: WorkflowTimings,
    visited: Vec<RemediationState>,
}

impl RemediationWorkflow {
    pub fn new(incident: Incident, timings: WorkflowTimings) -> Self {
        Self {
            incident,
            state: RemediationState::Received,
            diagnostic: None,
            timings,
            visited: vec![RemediationState::Received],
        }
    }

    pub fn incident(&self) -> &Incident {
        &self.incident
    }

    pub fn state(&self) -> RemediationState {
        self.state
    }

    pub fn diagnostic(&self) -> Option<&DiagnosticResult> {
        self.diagnostic.as_ref()
    }

    /// Every state entered so far, in order
    pub fn visited(&self) -> &[RemediationState] {
        &self.visited
    }

    fn enter(&mut self, state: RemediationState) {
        self.state = state;
        self.visited.push(state);
    }

    pub fn handle(&mut self, event: WorkflowEvent) -> Result<Vec<WorkflowEffect>, TransitionError> {
        use RemediationState as S;

        match (self.state, event) {
            (S::Received, WorkflowEvent::Diagnosed(diagnostic)) => {
                self.enter(S::Diagnosed);
                let decision = disposition(self.incident.incident_type, &diagnostic);
                self.diagnostic = Some(diagnostic);

                match decision {
                    Disposition::AttemptFix(action) => {
                        self.enter(S::FixAttempted);
                        let delay = if self.incident.incident_type == IncidentType::Crash {
                            self.timings.crash_grace
                        } else {
                            Duration::ZERO
                        };
                        Ok(vec![WorkflowEffect::ExecuteFix { action, delay }])
                    }
                    Disposition::Escalate => {
                        self.enter(S::Escalated);
                        Ok(vec![WorkflowEffect::Escalate(EscalationReason::NotAutoFixable)])
                    }
                    Disposition::Defer => {
                        self.enter(S::Deferred);
                        Ok(vec![WorkflowEffect::Defer])
                    }
                }
            }
            (S::FixAttempted, WorkflowEvent::FixSucceeded) => {
                self.enter(S::Verifying);
                Ok(vec![WorkflowEffect::ScheduleVerification(
                    self.timings.verify_delay,
                )])
            }
            (S::FixAttempted, WorkflowEvent::FixFailed(error)) => {
                self.enter(S::Escalated);
                Ok(vec![WorkflowEffect::Escalate(EscalationReason::FixFailed {
                    error,
                })])
            }
            (S::Verifying, WorkflowEvent::VerificationPassed) => {
                self.enter(S::Resolved);
                Ok(vec![WorkflowEffect::MarkResolved])
            }
            (S::Verifying, WorkflowEvent::VerificationFailed) => {
                self.enter(S::VerifyFailed);
                self.enter(S::Escalated);
                Ok(vec![WorkflowEffect::Escalate(
                    EscalationReason::VerificationFailed,
                )])
            }
            (state, event) => Err(TransitionError {
                state: state.to_string(),
                event: event.name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::Utc;

    fn workflow(incident_type: IncidentType, severity: Severity) -> RemediationWorkflow {
        RemediationWorkflow::new(
            Incident::new(incident_type, severity, "test", Utc::now()),
            WorkflowTimings::default(),
        )
    }

    fn fixable(action: FixActionType) -> DiagnosticResult {
        DiagnosticResult {
            issue: "issue".to_string(),
            severity: Severity::Critical,
            suggested_fix: "fix".to_string(),
            auto_fixable: true,
            action: Some(action),
        }
    }

    fn not_fixable() -> DiagnosticResult {
        DiagnosticResult {
            issue: "issue".to_string(),
            severity: Severity::Critical,
            suggested_fix: "manual".to_string(),
            auto_fixable: false,
            action: None,
        }
    }

    #[test]
    fn test_successful_fix_path() {
        let mut wf = workflow(IncidentType::ServerDown, Severity::Critical);

        let effects = wf
            .handle(WorkflowEvent::Diagnosed(fixable(FixActionType::RestartServer)))
            .unwrap();
        assert_eq!(
            effects,
            vec![WorkflowEffect::ExecuteFix {
                action: FixActionType::RestartServer,
                delay: Duration::ZERO,
            }]
        );

        let effects = wf.handle(WorkflowEvent::FixSucceeded).unwrap();
        assert_eq!(
            effects,
            vec![WorkflowEffect::ScheduleVerification(Duration::from_secs(30))]
        );

        let effects = wf.handle(WorkflowEvent::VerificationPassed).unwrap();
        assert_eq!(effects, vec![WorkflowEffect::MarkResolved]);
        assert_eq!(wf.state(), RemediationState::Resolved);
        assert_eq!(
            wf.visited(),
            &[
                RemediationState::Received,
                RemediationState::Diagnosed,
                RemediationState::FixAttempted,
                RemediationState::Verifying,
                RemediationState::Resolved,
            ]
        );
    }

    #[test]
    fn test_verification_failure_escalates() {
        let mut wf = workflow(IncidentType::ServerDown, Severity::Critical);
        wf.handle(WorkflowEvent::Diagnosed(fixable(FixActionType::KillProcess)))
            .unwrap();
        wf.handle(WorkflowEvent::FixSucceeded).unwrap();

        let effects = wf.handle(WorkflowEvent::VerificationFailed).unwrap();
        assert_eq!(
            effects,
            vec![WorkflowEffect::Escalate(EscalationReason::VerificationFailed)]
        );
        assert_eq!(wf.state(), RemediationState::Escalated);
        assert!(wf.visited().contains(&RemediationState::VerifyFailed));
    }

    #[test]
    fn test_fix_failure_escalates_without_verification() {
        let mut wf = workflow(IncidentType::Crash, Severity::High);
        wf.handle(WorkflowEvent::Diagnosed(fixable(FixActionType::RestartServer)))
            .unwrap();

        let effects = wf
            .handle(WorkflowEvent::FixFailed("exit code 1".to_string()))
            .unwrap();
        assert_eq!(
            effects,
            vec![WorkflowEffect::Escalate(EscalationReason::FixFailed {
                error: "exit code 1".to_string()
            })]
        );
        assert!(!wf.visited().contains(&RemediationState::Verifying));
    }

    #[test]
    fn test_crash_restart_waits_for_grace_period() {
        let mut wf = workflow(IncidentType::Crash, Severity::High);
        let effects = wf
            .handle(WorkflowEvent::Diagnosed(fixable(FixActionType::RestartServer)))
            .unwrap();

        assert_eq!(
            effects,
            vec![WorkflowEffect::ExecuteFix {
                action: FixActionType::RestartServer,
                delay: Duration::from_secs(2),
            }]
        );
    }

    #[test]
    fn test_not_fixable_escalates_immediately() {
        let mut wf = workflow(IncidentType::BuildError, Severity::High);
        let effects = wf.handle(WorkflowEvent::Diagnosed(not_fixable())).unwrap();

        assert_eq!(
            effects,
            vec![WorkflowEffect::Escalate(EscalationReason::NotAutoFixable)]
        );
        assert!(wf.state().is_terminal());
    }

    #[test]
    fn test_slow_response_is_deferred() {
        let mut wf = workflow(IncidentType::SlowResponse, Severity::Medium);
        let effects = wf.handle(WorkflowEvent::Diagnosed(not_fixable())).unwrap();

        assert_eq!(effects, vec![WorkflowEffect::Defer]);
        assert_eq!(wf.state(), RemediationState::Deferred);
    }

    #[test]
    fn test_out_of_order_events_are_rejected() {
        let mut wf = workflow(IncidentType::ServerDown, Severity::Critical);

        let err = wf.handle(WorkflowEvent::FixSucceeded).unwrap_err();
        assert_eq!(err.state, "RECEIVED");
        assert_eq!(err.event, "fix_succeeded");
        assert_eq!(wf.state(), RemediationState::Received);

        wf.handle(WorkflowEvent::Diagnosed(fixable(FixActionType::RestartServer)))
            .unwrap();
        assert!(wf.handle(WorkflowEvent::VerificationPassed).is_err());
        assert!(wf
            .handle(WorkflowEvent::Diagnosed(fixable(FixActionType::RestartServer)))
            .is_err());
    }
}
