//! Health monitoring of the target service
//!
//! Polls the service on a fixed interval, tracks liveness and latency, and
//! raises or clears incidents:
//! - `SERVER_DOWN` on transport failure or non-OK status
//! - `SLOW_RESPONSE` when latency exceeds the threshold
//! - anything reported by collaborators through [`HealthMonitor::report_incident`]

mod health_monitor;
mod ledger;
mod probe;

pub use health_monitor::{HealthMonitor, MonitorConfig, MIN_TIMER_PERIOD};
pub use ledger::{IncidentLedger, DEFAULT_MAX_RETAINED_INCIDENTS};
pub use probe::{HttpProbe, DEFAULT_PROBE_TIMEOUT};

use async_trait::async_trait;
use std::time::Duration;

/// Result of a single probe against the target service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service answered with an HTTP status
    Responded { status: u16, latency: Duration },
    /// Nothing is listening on the target port
    ConnectionRefused { detail: String },
    /// No response within the probe timeout
    TimedOut { after: Duration },
    /// Any other transport failure
    Failed { detail: String },
}

impl ProbeOutcome {
    /// True for a 2xx response
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Responded { status, .. } if (200..300).contains(status))
    }
}

/// Something that can check the target service once
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}
