//! Test doubles shared by the unit test suites

use crate::error::FixError;
use crate::events::SupervisorEvent;
use crate::monitor::{HealthProbe, ProbeOutcome};
use crate::remediation::{ProcessSupervisor, StartOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Probe whose health can be flipped at runtime
pub(crate) struct SwitchProbe {
    healthy: AtomicBool,
    latency_ms: AtomicUsize,
    calls: AtomicUsize,
}

impl SwitchProbe {
    pub(crate) fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
            latency_ms: AtomicUsize::new(5),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub(crate) fn set_latency_ms(&self, latency_ms: usize) {
        self.latency_ms.store(latency_ms, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for SwitchProbe {
    async fn probe(&self) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            ProbeOutcome::Responded {
                status: 200,
                latency: Duration::from_millis(self.latency_ms.load(Ordering::SeqCst) as u64),
            }
        } else {
            ProbeOutcome::ConnectionRefused {
                detail: "tcp connect error: Connection refused (os error 111)".to_string(),
            }
        }
    }
}

/// Supervisor that records calls and fails on demand
pub(crate) struct MockSupervisor {
    calls: Mutex<Vec<&'static str>>,
    start_error: Mutex<Option<FixError>>,
    install_error: Mutex<Option<FixError>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl MockSupervisor {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            calls: Mutex::new(Vec::new()),
            start_error: Mutex::new(None),
            install_error: Mutex::new(None),
            events,
        }
    }

    /// Make every subsequent start fail with `error`
    pub(crate) fn fail_start(&self, error: FixError) {
        *self.start_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_install(&self, error: FixError) {
        *self.install_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn emit(&self, event: SupervisorEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ProcessSupervisor for MockSupervisor {
    async fn terminate(&self) -> Result<(), FixError> {
        self.record("terminate");
        Ok(())
    }

    async fn install_dependencies(&self) -> Result<(), FixError> {
        self.record("install");
        match self.install_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn clear_cache(&self) -> Result<(), FixError> {
        self.record("clear_cache");
        Ok(())
    }

    async fn start(&self) -> Result<StartOutcome, FixError> {
        self.record("start");
        match self.start_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(StartOutcome::Ready),
        }
    }

    fn events(&self) -> Option<broadcast::Receiver<SupervisorEvent>> {
        Some(self.events.subscribe())
    }
}
