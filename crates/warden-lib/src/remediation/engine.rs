//! Remediation engine
//!
//! Runs one workflow per incident id. Workflows for different incidents run
//! concurrently on their own tasks; a second request for an incident that
//! already has a workflow is ignored.

use super::diagnosis::{diagnose, inspect_manifest};
use super::state::{RemediationState, RemediationWorkflow, WorkflowEffect, WorkflowEvent, WorkflowTimings};
use super::supervisor::ProcessSupervisor;
use crate::error::{FixError, TransitionError};
use crate::events::{
    Escalation, EscalationReason, RemediationEvent, SupervisorEvent, EVENT_CHANNEL_CAPACITY,
};
use crate::models::{DiagnosticResult, FixAction, FixActionType, Incident, Severity};
use crate::monitor::{HealthProbe, IncidentLedger};
use crate::observability::WardenMetrics;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Fixes and finished workflows kept in memory beyond which the oldest are dropped
pub const DEFAULT_MAX_RETAINED_FIXES: usize = 1000;

/// Configuration for the remediation engine
#[derive(Debug, Clone)]
pub struct RemediationConfig {
    /// Delay before restarting a crashed process (default: 2 seconds)
    pub crash_grace: Duration,
    /// Delay between a fix and its verification probe (default: 30 seconds)
    pub verify_delay: Duration,
    /// Project manifest consulted when diagnosing build errors
    pub manifest_path: PathBuf,
    /// Fixes and finished workflow states kept in memory (default: 1000)
    pub max_retained: usize,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        let timings = WorkflowTimings::default();
        Self {
            crash_grace: timings.crash_grace,
            verify_delay: timings.verify_delay,
            manifest_path: PathBuf::from("package.json"),
            max_retained: DEFAULT_MAX_RETAINED_FIXES,
        }
    }
}

impl RemediationConfig {
    pub fn with_crash_grace(mut self, grace: Duration) -> Self {
        self.crash_grace = grace;
        self
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_max_retained(mut self, max_retained: usize) -> Self {
        self.max_retained = max_retained.max(1);
        self
    }

    fn timings(&self) -> WorkflowTimings {
        WorkflowTimings {
            crash_grace: self.crash_grace,
            verify_delay: self.verify_delay,
        }
    }
}

/// Turns incidents into verified fixes or escalation requests
pub struct RemediationEngine {
    supervisor: Arc<dyn ProcessSupervisor>,
    probe: Arc<dyn HealthProbe>,
    ledger: Arc<IncidentLedger>,
    config: RemediationConfig,
    /// Workflows whose task is still running
    workflows: DashMap<String, RemediationWorkflow>,
    /// Final states of retired workflows, oldest first
    finished: RwLock<VecDeque<(String, RemediationState)>>,
    fixes: RwLock<VecDeque<FixAction>>,
    events: broadcast::Sender<RemediationEvent>,
    active: watch::Sender<bool>,
    metrics: WardenMetrics,
}

impl RemediationEngine {
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        probe: Arc<dyn HealthProbe>,
        ledger: Arc<IncidentLedger>,
        config: RemediationConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (active, _) = watch::channel(true);
        Self {
            supervisor,
            probe,
            ledger,
            config,
            workflows: DashMap::new(),
            finished: RwLock::new(VecDeque::new()),
            fixes: RwLock::new(VecDeque::new()),
            events,
            active,
            metrics: WardenMetrics::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemediationEvent> {
        self.events.subscribe()
    }

    /// Events of the supervised process, when the supervisor provides them
    pub fn supervisor_events(&self) -> Option<broadcast::Receiver<SupervisorEvent>> {
        self.supervisor.events()
    }

    pub fn config(&self) -> &RemediationConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Cancel pending grace and verification timers. Running fixes finish
    /// but their results are discarded.
    pub fn stop(&self) {
        if self.active.send_replace(false) {
            info!("Remediation engine stopped");
        }
    }

    pub fn resume(&self) {
        self.active.send_replace(true);
    }

    /// Current workflow state for an incident, if one was started
    pub fn workflow_state(&self, incident_id: &str) -> Option<RemediationState> {
        if let Some(workflow) = self.workflows.get(incident_id) {
            return Some(workflow.state());
        }
        self.finished
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(id, _)| id == incident_id)
            .map(|(_, state)| *state)
    }

    /// Number of workflows whose task has not finished
    pub fn in_flight(&self) -> usize {
        self.workflows.len()
    }

    /// Retained fixes, oldest first
    pub fn fixes(&self) -> Vec<FixAction> {
        self.fixes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// The last `n` fixes, oldest first
    pub fn recent_fixes(&self, n: usize) -> Vec<FixAction> {
        let fixes = self.fixes.read().unwrap_or_else(|e| e.into_inner());
        let start = fixes.len().saturating_sub(n);
        fixes.iter().skip(start).cloned().collect()
    }

    fn has_workflow(&self, incident_id: &str) -> bool {
        self.workflow_state(incident_id).is_some()
    }

    /// Start remediating `incident` on a background task.
    ///
    /// Returns `false` when the engine is stopped or the incident already has
    /// a workflow.
    pub fn handle_incident(self: &Arc<Self>, incident: Incident) -> bool {
        if !self.is_active() || self.has_workflow(&incident.id) {
            debug!(incident_id = %incident.id, "Skipping incident");
            return false;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.remediate(incident).await;
        });
        true
    }

    /// Drive the full workflow for one incident and return its final state.
    ///
    /// Returns `None` if the incident already had a workflow or the engine
    /// is stopped.
    pub async fn remediate(&self, incident: Incident) -> Option<RemediationState> {
        if !self.is_active() {
            return None;
        }

        match self.workflows.entry(incident.id.clone()) {
            Entry::Occupied(_) => {
                debug!(incident_id = %incident.id, "Remediation already in progress");
                return None;
            }
            Entry::Vacant(_) if self.has_finished(&incident.id) => {
                debug!(incident_id = %incident.id, "Incident already remediated");
                return None;
            }
            Entry::Vacant(slot) => {
                slot.insert(RemediationWorkflow::new(incident.clone(), self.config.timings()));
            }
        }

        let manifest_path = self.config.manifest_path.clone();
        let diagnostic = diagnose(&incident, || inspect_manifest(&manifest_path));
        info!(
            incident_id = %incident.id,
            incident_type = %incident.incident_type,
            issue = %diagnostic.issue,
            severity = %diagnostic.severity,
            auto_fixable = diagnostic.auto_fixable,
            suggested_fix = %diagnostic.suggested_fix,
            "Incident diagnosed"
        );

        let mut pending: VecDeque<WorkflowEffect> =
            match self.advance(&incident.id, WorkflowEvent::Diagnosed(diagnostic.clone())) {
                Ok(effects) => effects.into(),
                Err(e) => {
                    error!(incident_id = %incident.id, error = %e, "Workflow rejected diagnosis");
                    return self.retire(&incident.id);
                }
            };
        let mut current_fix: Option<String> = None;

        while let Some(effect) = pending.pop_front() {
            let next = match effect {
                WorkflowEffect::ExecuteFix { action, delay } => {
                    if !delay.is_zero() && !self.wait_unless_stopped(delay).await {
                        debug!(incident_id = %incident.id, "Engine stopped before fix");
                        break;
                    }

                    let fix = self.record_attempt(&incident, action, &diagnostic);
                    let result = self.execute(action).await;
                    if !self.is_active() {
                        let aborted = FixError::Aborted("engine stopped".to_string());
                        self.complete_fix(&fix.id, false, Some(aborted.to_string()));
                        break;
                    }

                    match result {
                        Ok(()) => {
                            current_fix = Some(fix.id);
                            WorkflowEvent::FixSucceeded
                        }
                        Err(e) => {
                            let message = e.to_string();
                            warn!(incident_id = %incident.id, action = %action, error = %message, "Fix failed");
                            self.complete_fix(&fix.id, false, Some(message.clone()));
                            WorkflowEvent::FixFailed(message)
                        }
                    }
                }
                WorkflowEffect::ScheduleVerification(delay) => {
                    if !self.wait_unless_stopped(delay).await {
                        debug!(incident_id = %incident.id, "Engine stopped before verification");
                        break;
                    }

                    let outcome = self.probe.probe().await;
                    if !self.is_active() {
                        break;
                    }
                    debug!(incident_id = %incident.id, outcome = ?outcome, "Verification probe");
                    if outcome.is_ok() {
                        WorkflowEvent::VerificationPassed
                    } else {
                        WorkflowEvent::VerificationFailed
                    }
                }
                WorkflowEffect::MarkResolved => {
                    if let Some(fix_id) = current_fix.take() {
                        self.complete_fix(&fix_id, true, None);
                    }
                    self.mark_resolved(&incident);
                    continue;
                }
                WorkflowEffect::Escalate(reason) => {
                    let diagnostic = match reason {
                        EscalationReason::VerificationFailed => {
                            if let Some(fix_id) = current_fix.take() {
                                let error = Some("verification failed".to_string());
                                self.complete_fix(&fix_id, false, error);
                            }
                            verification_failed(&incident, &diagnostic)
                        }
                        _ => diagnostic.clone(),
                    };
                    self.request_escalation(&incident, reason, diagnostic);
                    continue;
                }
                WorkflowEffect::Defer => {
                    debug!(
                        incident_id = %incident.id,
                        incident_type = %incident.incident_type,
                        "No automated remedy, deferring to escalation policy"
                    );
                    continue;
                }
            };

            match self.advance(&incident.id, next) {
                Ok(effects) => pending.extend(effects),
                Err(e) => {
                    error!(incident_id = %incident.id, error = %e, "Workflow transition rejected");
                    break;
                }
            }
        }

        self.retire(&incident.id)
    }

    fn has_finished(&self, incident_id: &str) -> bool {
        self.finished
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|(id, _)| id == incident_id)
    }

    /// Move a workflow out of the in-flight map once its task is done.
    ///
    /// The final state is recorded before removal so a concurrent request
    /// for the same incident always sees one of the two.
    fn retire(&self, incident_id: &str) -> Option<RemediationState> {
        let state = self.workflows.get(incident_id).map(|wf| wf.state())?;
        {
            let mut finished = self.finished.write().unwrap_or_else(|e| e.into_inner());
            finished.push_back((incident_id.to_string(), state));
            while finished.len() > self.config.max_retained {
                finished.pop_front();
            }
        }
        self.workflows.remove(incident_id);
        Some(state)
    }

    fn advance(
        &self,
        incident_id: &str,
        event: WorkflowEvent,
    ) -> Result<Vec<WorkflowEffect>, TransitionError> {
        match self.workflows.get_mut(incident_id) {
            Some(mut workflow) => {
                let from = workflow.state();
                let effects = workflow.handle(event)?;
                debug!(incident_id, from = %from, to = %workflow.state(), "Workflow advanced");
                Ok(effects)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Sleep for `delay`; `false` if the engine stopped first
    async fn wait_unless_stopped(&self, delay: Duration) -> bool {
        let mut active = self.active.subscribe();
        if !*active.borrow_and_update() {
            return false;
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return self.is_active(),
                changed = active.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    let still_active = *active.borrow_and_update();
                    if !still_active {
                        return false;
                    }
                }
            }
        }
    }

    async fn execute(&self, action: FixActionType) -> Result<(), FixError> {
        info!(action = %action, "Executing remediation");

        match action {
            FixActionType::RestartServer | FixActionType::KillProcess => {
                self.supervisor.terminate().await?;
            }
            FixActionType::InstallDeps => {
                self.supervisor.terminate().await?;
                self.supervisor.install_dependencies().await?;
            }
            FixActionType::ClearCache => {
                self.supervisor.terminate().await?;
                self.supervisor.clear_cache().await?;
            }
            FixActionType::FixConfig => {
                return Err(FixError::Unsupported(action.to_string()));
            }
        }

        let outcome = self.supervisor.start().await?;
        debug!(action = %action, outcome = ?outcome, "Service restarted");
        Ok(())
    }

    fn record_attempt(
        &self,
        incident: &Incident,
        action: FixActionType,
        diagnostic: &DiagnosticResult,
    ) -> FixAction {
        let fix = FixAction::new(&incident.id, action, &diagnostic.suggested_fix, Utc::now());
        {
            let mut fixes = self.fixes.write().unwrap_or_else(|e| e.into_inner());
            fixes.push_back(fix.clone());
            while fixes.len() > self.config.max_retained {
                fixes.pop_front();
            }
        }

        info!(fix_id = %fix.id, incident_id = %incident.id, action = %action, "Fix attempted");
        let _ = self.events.send(RemediationEvent::FixAttempted(fix.clone()));
        fix
    }

    /// Set the outcome of an in-flight fix; outcomes are written once
    fn complete_fix(&self, fix_id: &str, success: bool, error: Option<String>) {
        let completed = {
            let mut fixes = self.fixes.write().unwrap_or_else(|e| e.into_inner());
            fixes
                .iter_mut()
                .find(|f| f.id == fix_id && f.is_in_flight())
                .map(|fix| {
                    fix.success = Some(success);
                    fix.error = error;
                    fix.clone()
                })
        };

        if let Some(fix) = completed {
            self.metrics.inc_fixes(fix.action.as_str(), success);
            let _ = self.events.send(RemediationEvent::FixCompleted(fix));
        }
    }

    fn mark_resolved(&self, incident: &Incident) {
        let now = Utc::now();
        let downtime_ms = (now - incident.timestamp).num_milliseconds();

        let resolved = match self.ledger.resolve(&incident.id) {
            Some(resolved) => {
                self.metrics.inc_incidents_resolved();
                resolved
            }
            // Already cleared by a healthy probe before verification ran.
            None => {
                let mut resolved = incident.clone();
                resolved.resolved = true;
                resolved
            }
        };

        info!(incident_id = %incident.id, downtime_ms, "Incident resolved by verified fix");
        let _ = self.events.send(RemediationEvent::IncidentResolved {
            incident: resolved,
            downtime_ms,
        });
    }

    fn request_escalation(
        &self,
        incident: &Incident,
        reason: EscalationReason,
        diagnostic: DiagnosticResult,
    ) {
        let escalation = Escalation::new(reason)
            .for_incident(incident.clone())
            .with_diagnostic(diagnostic);

        warn!(
            incident_id = %incident.id,
            summary = %escalation.summary(),
            "Requesting escalation"
        );
        let _ = self.events.send(RemediationEvent::EscalationRequested(escalation));
    }
}

fn verification_failed(incident: &Incident, diagnostic: &DiagnosticResult) -> DiagnosticResult {
    DiagnosticResult {
        issue: "Fix verification failed".to_string(),
        severity: incident.severity.max(Severity::High),
        suggested_fix: format!(
            "Service still unhealthy after \"{}\"; investigate manually",
            diagnostic.suggested_fix
        ),
        auto_fixable: false,
        action: None,
    }
}
