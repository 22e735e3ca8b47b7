//! The orchestrator: owns the pipeline and decides when to page a human
//!
//! A single pump task consumes the events of every component in arrival
//! order, so audit records for one incident are written in the order the
//! incident progressed. A second task drives the periodic report and status
//! timers.

use super::policy::{evaluate_escalation, failed_fixes_within};
use super::status::{compute_status, recommendations};
use super::{OrchestratorConfig, WardenConfig};
use crate::audit::{categories, AuditFailure, AuditStore, LogLevel, MetricsDocument};
use crate::events::{
    Escalation, MonitorEvent, OrchestratorEvent, RemediationEvent, SupervisorEvent, WardenEvent,
    EVENT_CHANNEL_CAPACITY,
};
use crate::health::{components, HealthRegistry, HealthResponse};
use crate::models::{
    FixAction, Incident, IncidentHistoryEntry, IncidentType, ServerHealth, Severity, SystemReport,
    SystemStatus,
};
use crate::monitor::{HealthMonitor, HttpProbe, IncidentLedger, MonitorConfig, MIN_TIMER_PERIOD};
use crate::observability::{StructuredLogger, WardenMetrics};
use crate::remediation::{CommandSupervisor, RemediationEngine};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

const WARDEN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Combined snapshot for deep inspection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedReport {
    pub generated_at: DateTime<Utc>,
    pub server_health: ServerHealth,
    pub system_status: SystemStatus,
    pub active_incidents: Vec<Incident>,
    /// Every incident still held in memory, resolved or not
    pub incidents: Vec<Incident>,
    pub fixes: Vec<FixAction>,
    pub history: Vec<IncidentHistoryEntry>,
    pub metrics: MetricsDocument,
    pub latest_report: Option<SystemReport>,
    pub components: HealthResponse,
}

/// Top-level owner of the monitor, the remediation engine and the audit store
pub struct Orchestrator {
    monitor: Arc<HealthMonitor>,
    engine: Arc<RemediationEngine>,
    audit: Arc<AuditStore>,
    config: OrchestratorConfig,
    reports: RwLock<VecDeque<SystemReport>>,
    events: broadcast::Sender<WardenEvent>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: WardenMetrics,
    running: AtomicBool,
    shutdown: Mutex<Option<broadcast::Sender<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Assemble from already-built components.
    ///
    /// The monitor and the engine must share one incident ledger.
    pub fn new(
        monitor: Arc<HealthMonitor>,
        engine: Arc<RemediationEngine>,
        audit: Arc<AuditStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            monitor,
            engine,
            audit,
            logger: StructuredLogger::new(&config.service_name),
            reports: RwLock::new(VecDeque::with_capacity(config.max_reports)),
            config,
            events,
            health: HealthRegistry::new(),
            metrics: WardenMetrics::new(),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build the whole pipeline for one target service
    pub fn from_config(config: WardenConfig) -> Result<Arc<Self>> {
        let probe = Arc::new(HttpProbe::with_timeout(
            &config.target_url,
            config.probe_timeout,
        )?);
        let monitor_config = MonitorConfig {
            port: probe.port(),
            ..config.monitor
        };

        let ledger = Arc::new(IncidentLedger::new());
        let monitor = Arc::new(HealthMonitor::new(
            probe.clone(),
            ledger.clone(),
            monitor_config,
        ));
        let supervisor = Arc::new(CommandSupervisor::new(config.supervisor));
        let engine = Arc::new(RemediationEngine::new(
            supervisor,
            probe,
            ledger,
            config.remediation,
        ));
        let audit = Arc::new(AuditStore::new(config.audit));

        Ok(Arc::new(Self::new(
            monitor,
            engine,
            audit,
            config.orchestrator,
        )))
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn engine(&self) -> &Arc<RemediationEngine> {
        &self.engine
    }

    pub fn audit(&self) -> &Arc<AuditStore> {
        &self.audit
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn health_registry(&self) -> HealthRegistry {
        self.health.clone()
    }

    /// Every pipeline event, re-published after it has been handled
    pub fn subscribe(&self) -> broadcast::Receiver<WardenEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start monitoring, remediation and reporting. Returns `false` if
    /// already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Orchestrator already running");
            return false;
        }

        self.engine.resume();
        self.health.register_all().await;

        // Subscribe before the monitor's immediate probe can publish anything.
        let monitor_rx = self.monitor.subscribe();
        let engine_rx = self.engine.subscribe();
        let supervisor_rx = self.engine.supervisor_events();
        let failures_rx = self.audit.subscribe_failures();

        let (shutdown_tx, _) = broadcast::channel(1);
        let pump = tokio::spawn(Arc::clone(self).pump(
            monitor_rx,
            engine_rx,
            supervisor_rx,
            failures_rx,
            shutdown_tx.subscribe(),
        ));
        let timers = tokio::spawn(Arc::clone(self).run_timers(shutdown_tx.subscribe()));

        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([pump, timers]);

        self.monitor.start_monitoring();

        self.logger.log_startup(WARDEN_VERSION);
        self.audit
            .log_lifecycle(
                LogLevel::Info,
                format!(
                    "Warden {} started, monitoring port {}",
                    WARDEN_VERSION,
                    self.monitor.config().port
                ),
            )
            .await;
        self.health.set_ready(true).await;
        true
    }

    /// Stop every timer and wait for the pipeline tasks to exit.
    ///
    /// In-flight probes and fixes complete, but their results are discarded.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.health.set_ready(false).await;
        self.monitor.stop_monitoring();
        self.engine.stop();
        for name in [components::MONITOR, components::REMEDIATION] {
            self.health.set_unhealthy(name, "stopped").await;
        }

        if let Some(tx) = self.shutdown.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(());
        }
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Pipeline task ended abnormally");
            }
        }

        self.logger.log_shutdown("stop requested");
        self.audit
            .log_lifecycle(LogLevel::Info, "Warden stopped")
            .await;
    }

    /// Record a fatal error in the audit trail before the host exits
    pub async fn log_fatal(&self, message: impl Into<String>) {
        let message = message.into();
        self.audit
            .log(
                LogLevel::Error,
                categories::LIFECYCLE,
                message.clone(),
                Some(serde_json::json!({ "fatal": true })),
            )
            .await;
        self.health
            .set_unhealthy(components::ORCHESTRATOR, message)
            .await;
    }

    /// Current overall status, derived from live health and incidents
    pub fn system_status(&self) -> SystemStatus {
        compute_status(&self.monitor.server_health(), &self.monitor.active_incidents())
    }

    pub fn latest_report(&self) -> Option<SystemReport> {
        self.reports
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .back()
            .cloned()
    }

    /// Up to `limit` most recent reports, oldest first
    pub fn reports(&self, limit: usize) -> Vec<SystemReport> {
        let reports = self.reports.read().unwrap_or_else(|e| e.into_inner());
        let skip = reports.len().saturating_sub(limit);
        reports.iter().skip(skip).cloned().collect()
    }

    pub async fn detailed_report(&self) -> DetailedReport {
        let server_health = self.monitor.server_health();
        let active_incidents = self.monitor.active_incidents();

        DetailedReport {
            generated_at: Utc::now(),
            system_status: compute_status(&server_health, &active_incidents),
            server_health,
            active_incidents,
            incidents: self.monitor.incidents(),
            fixes: self.engine.fixes(),
            history: self.audit.history().await,
            metrics: self.audit.metrics_document().await,
            latest_report: self.latest_report(),
            components: self.health.health().await,
        }
    }

    /// Build a report, retain it, persist it and apply the escalation policy
    pub async fn generate_report(&self) -> SystemReport {
        let now = Utc::now();
        let server_health = self.monitor.server_health();
        let active_incidents = self.monitor.active_incidents();
        let fixes = self.engine.fixes();
        let recent_failed = failed_fixes_within(&fixes, now, self.config.policy.failure_window);

        let report = SystemReport {
            timestamp: now,
            system_status: compute_status(&server_health, &active_incidents),
            recommendations: recommendations(&active_incidents, recent_failed),
            recent_fixes: self.engine.recent_fixes(self.config.recent_fix_count),
            server_health,
            active_incidents,
        };

        {
            let mut reports = self.reports.write().unwrap_or_else(|e| e.into_inner());
            reports.push_back(report.clone());
            while reports.len() > self.config.max_reports {
                reports.pop_front();
            }
        }

        self.metrics
            .set_report_state(report.system_status, report.active_incidents.len());
        self.logger.log_report(&report);
        self.audit.record_report(&report).await;
        self.publish(WardenEvent::Orchestrator(OrchestratorEvent::ReportGenerated(
            report.clone(),
        )));

        for escalation in
            evaluate_escalation(&report.active_incidents, &fixes, now, &self.config.policy)
        {
            self.escalate(escalation).await;
        }

        report
    }

    /// Page a human
    async fn escalate(&self, escalation: Escalation) {
        self.metrics.inc_escalations();
        self.logger.log_escalation(&escalation);
        self.audit.record_escalation(&escalation).await;
        self.publish(WardenEvent::Orchestrator(
            OrchestratorEvent::EscalationRequired(escalation),
        ));
    }

    async fn log_status(&self) {
        let status = self.system_status();
        let active = self.monitor.active_incidents().len();
        let total_fixes = self.engine.fixes().len();

        self.logger.log_status(status, active, total_fixes);
        self.audit
            .log_lifecycle(
                LogLevel::Info,
                format!(
                    "Status {}: {} active incident(s), {} fix(es) attempted",
                    status, active, total_fixes
                ),
            )
            .await;
    }

    fn publish(&self, event: WardenEvent) {
        let _ = self.events.send(event);
    }

    async fn run_timers(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let now = Instant::now();
        let report_every = self.config.report_interval.max(MIN_TIMER_PERIOD);
        let status_every = self.config.status_interval.max(MIN_TIMER_PERIOD);
        let mut reports = interval_at(now + report_every, report_every);
        let mut status = interval_at(now + status_every, status_every);

        loop {
            tokio::select! {
                _ = reports.tick() => {
                    self.generate_report().await;
                }
                _ = status.tick() => {
                    self.log_status().await;
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        debug!("Orchestrator timers exited");
    }

    async fn pump(
        self: Arc<Self>,
        mut monitor_rx: broadcast::Receiver<MonitorEvent>,
        mut engine_rx: broadcast::Receiver<RemediationEvent>,
        mut supervisor_rx: Option<broadcast::Receiver<SupervisorEvent>>,
        mut failures_rx: broadcast::Receiver<AuditFailure>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Orchestrator event pump started");

        loop {
            tokio::select! {
                event = monitor_rx.recv() => match event {
                    Ok(event) => self.on_monitor_event(event).await,
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Monitor events lagged"),
                    Err(RecvError::Closed) => break,
                },
                event = engine_rx.recv() => match event {
                    Ok(event) => self.on_remediation_event(event).await,
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Remediation events lagged"),
                    Err(RecvError::Closed) => break,
                },
                event = recv_optional(&mut supervisor_rx) => match event {
                    Ok(event) => self.on_supervisor_event(event),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Supervisor events lagged"),
                    Err(RecvError::Closed) => supervisor_rx = None,
                },
                failure = failures_rx.recv() => match failure {
                    Ok(failure) => self.on_audit_failure(failure).await,
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Audit failures lagged"),
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }

        debug!("Orchestrator event pump exited");
    }

    async fn on_monitor_event(&self, event: MonitorEvent) {
        match &event {
            MonitorEvent::HealthChecked(_) => {}
            MonitorEvent::IncidentRaised(incident) => {
                self.logger.log_incident_raised(incident);
                self.audit.record_incident(incident).await;
                self.engine.handle_incident(incident.clone());
            }
            MonitorEvent::IncidentResolved(incident) => {
                let downtime_ms = incident.age(Utc::now()).num_milliseconds();
                self.logger.log_incident_resolved(incident, Some(downtime_ms));
                self.audit
                    .record_resolution(incident, Some(downtime_ms))
                    .await;
            }
        }
        self.publish(WardenEvent::Monitor(event));
    }

    async fn on_remediation_event(&self, event: RemediationEvent) {
        match &event {
            RemediationEvent::FixAttempted(fix) => {
                self.logger.log_fix_attempted(fix);
                self.audit.record_fix_attempted(fix).await;
            }
            RemediationEvent::FixCompleted(fix) => {
                self.logger.log_fix_completed(fix);
                self.audit.record_fix_completed(fix).await;
                if fix.is_failed() {
                    // Re-evaluate the policy as soon as a failure lands.
                    self.generate_report().await;
                }
            }
            RemediationEvent::IncidentResolved {
                incident,
                downtime_ms,
            } => {
                self.logger
                    .log_incident_resolved(incident, Some(*downtime_ms));
                self.audit
                    .record_resolution(incident, Some(*downtime_ms))
                    .await;
            }
            RemediationEvent::EscalationRequested(escalation) => {
                self.escalate(escalation.clone()).await;
            }
        }
        self.publish(WardenEvent::Remediation(event));
    }

    fn on_supervisor_event(&self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::BuildFailure(line) => {
                self.monitor.report_incident(
                    IncidentType::BuildError,
                    Severity::High,
                    format!("Build failed: {}", line),
                );
            }
            SupervisorEvent::UnexpectedExit { code } => {
                let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
                self.monitor.report_incident(
                    IncidentType::Crash,
                    Severity::High,
                    format!("Server process exited unexpectedly with code {}", code),
                );
            }
        }
    }

    async fn on_audit_failure(&self, failure: AuditFailure) {
        self.health
            .set_degraded(
                components::AUDIT_STORE,
                format!("{} failed: {}", failure.operation, failure.error),
            )
            .await;
    }
}

/// Receive from an optional channel; never resolves when there is none
async fn recv_optional<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
