//! Health monitor polling loop
//!
//! Probes the target service on a fixed interval (plus one immediate probe
//! on start), replaces the health snapshot and raises or clears incidents.

use super::{HealthProbe, IncidentLedger, ProbeOutcome};
use crate::events::{MonitorEvent, EVENT_CHANNEL_CAPACITY};
use crate::models::{Incident, IncidentType, ServerHealth, Severity};
use crate::observability::WardenMetrics;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Shortest period accepted by the probe and report timers
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Configuration for the health monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between probes (default: 10 seconds)
    pub interval: Duration,
    /// Latency above which a SLOW_RESPONSE incident is raised (default: 3000 ms)
    pub slow_threshold: Duration,
    /// Window in which an open incident of the same type suppresses a new one (default: 60 seconds)
    pub dedup_window: Duration,
    /// Port of the target service, reported in the health snapshot
    pub port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            slow_threshold: Duration::from_millis(3000),
            dedup_window: Duration::from_secs(60),
            port: 3000,
        }
    }
}

/// Watches the target service and owns incident creation
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    config: MonitorConfig,
    ledger: Arc<IncidentLedger>,
    health: RwLock<ServerHealth>,
    active: AtomicBool,
    shutdown: Mutex<Option<broadcast::Sender<()>>>,
    events: broadcast::Sender<MonitorEvent>,
    metrics: WardenMetrics,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>, ledger: Arc<IncidentLedger>, config: MonitorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            probe,
            health: RwLock::new(ServerHealth::unknown(config.port)),
            config,
            ledger,
            active: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            events,
            metrics: WardenMetrics::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn ledger(&self) -> Arc<IncidentLedger> {
        self.ledger.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start the polling loop. Returns `false` if it was already running.
    pub fn start_monitoring(self: &Arc<Self>) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("Health monitor already running");
            return false;
        }

        let (tx, rx) = broadcast::channel(1);
        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run(rx).await });
        true
    }

    /// Cancel future probes; an in-flight probe completes but is discarded
    pub fn stop_monitoring(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.shutdown.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(());
        }
        info!("Health monitor stopped");
    }

    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            port = self.config.port,
            "Starting health monitor"
        );

        // First tick fires immediately. A zero period would panic the timer.
        let mut ticker = interval(self.config.interval.max(MIN_TIMER_PERIOD));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.probe.probe().await;
                    if !self.is_active() {
                        debug!("Discarding probe result after stop");
                        break;
                    }
                    self.apply_probe(outcome, Utc::now());
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        debug!("Health monitor loop exited");
    }

    /// Probe once and apply the result, regardless of whether the loop runs
    pub async fn check_now(&self) -> ServerHealth {
        let outcome = self.probe.probe().await;
        self.apply_probe(outcome, Utc::now())
    }

    /// Fold one probe outcome into the health snapshot and incident set
    pub fn apply_probe(&self, outcome: ProbeOutcome, now: DateTime<Utc>) -> ServerHealth {
        let port = self.config.port;
        let mut health = ServerHealth {
            is_running: false,
            port,
            last_check: now,
            response_time_ms: None,
            errors: Vec::new(),
        };

        match outcome {
            ProbeOutcome::Responded { status, latency } => {
                let latency_ms = latency.as_millis() as u64;
                health.is_running = true;
                health.response_time_ms = Some(latency_ms);
                self.metrics.observe_probe_latency(latency.as_secs_f64());

                if (200..300).contains(&status) {
                    self.clear(&[IncidentType::ServerDown]);

                    if latency > self.config.slow_threshold {
                        let description = format!(
                            "Server response took {}ms (threshold {}ms)",
                            latency_ms,
                            self.config.slow_threshold.as_millis()
                        );
                        health.errors.push(description.clone());
                        self.raise(IncidentType::SlowResponse, Severity::Medium, description, now);
                    } else {
                        self.clear(&[IncidentType::SlowResponse]);
                    }
                } else {
                    self.metrics.inc_probe_failures();
                    let description = format!("Server returned HTTP {} on port {}", status, port);
                    health.errors.push(description.clone());
                    self.raise(IncidentType::ServerDown, Severity::Critical, description, now);
                }
            }
            ProbeOutcome::ConnectionRefused { detail } => {
                self.metrics.inc_probe_failures();
                debug!(detail = %detail, "Connection refused");
                let description = format!("Server on port {} is not reachable: connection refused", port);
                health.errors.push(description.clone());
                self.raise(IncidentType::ServerDown, Severity::Critical, description, now);
            }
            ProbeOutcome::TimedOut { after } => {
                self.metrics.inc_probe_failures();
                let description = format!(
                    "Server on port {} did not respond within {}s",
                    port,
                    after.as_secs()
                );
                health.errors.push(description.clone());
                self.raise(IncidentType::ServerDown, Severity::Critical, description, now);
            }
            ProbeOutcome::Failed { detail } => {
                self.metrics.inc_probe_failures();
                let description = format!("Server health check failed on port {}: {}", port, detail);
                health.errors.push(description.clone());
                self.raise(IncidentType::ServerDown, Severity::Critical, description, now);
            }
        }

        *self.health.write().unwrap_or_else(|e| e.into_inner()) = health.clone();
        let _ = self.events.send(MonitorEvent::HealthChecked(health.clone()));
        health
    }

    /// Raise an incident on behalf of a collaborator (supervisor, build watcher)
    pub fn report_incident(
        &self,
        incident_type: IncidentType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Option<Incident> {
        self.raise(incident_type, severity, description.into(), Utc::now())
    }

    fn raise(
        &self,
        incident_type: IncidentType,
        severity: Severity,
        description: String,
        now: DateTime<Utc>,
    ) -> Option<Incident> {
        let window = ChronoDuration::from_std(self.config.dedup_window)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));

        match self.ledger.raise(incident_type, severity, description, now, window) {
            Some(incident) => {
                warn!(
                    incident_id = %incident.id,
                    incident_type = %incident.incident_type,
                    severity = %incident.severity,
                    "Incident raised"
                );
                self.metrics.inc_incidents_raised(incident_type.as_str());
                let _ = self.events.send(MonitorEvent::IncidentRaised(incident.clone()));
                Some(incident)
            }
            None => {
                debug!(incident_type = %incident_type, "Suppressed duplicate incident");
                None
            }
        }
    }

    fn clear(&self, types: &[IncidentType]) {
        for incident in self.ledger.resolve_types(types) {
            info!(
                incident_id = %incident.id,
                incident_type = %incident.incident_type,
                "Incident cleared by healthy probe"
            );
            self.metrics.inc_incidents_resolved();
            let _ = self.events.send(MonitorEvent::IncidentResolved(incident));
        }
    }

    pub fn server_health(&self) -> ServerHealth {
        self.health.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn active_incidents(&self) -> Vec<Incident> {
        self.ledger.active()
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.ledger.all()
    }
}
