//! Orchestrator and whole-pipeline configuration

use super::EscalationPolicy;
use crate::audit::AuditConfig;
use crate::monitor::{MonitorConfig, DEFAULT_PROBE_TIMEOUT};
use crate::remediation::{RemediationConfig, SupervisorConfig};
use std::time::Duration;

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Interval between periodic reports (default: 60 seconds)
    pub report_interval: Duration,
    /// Interval between status summary lines (default: 300 seconds)
    pub status_interval: Duration,
    /// Reports kept in memory (default: 100)
    pub max_reports: usize,
    /// Fixes included in each report (default: 5)
    pub recent_fix_count: usize,
    pub policy: EscalationPolicy,
    /// Name of the watched service, attached to structured log records
    pub service_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(60),
            status_interval: Duration::from_secs(300),
            max_reports: 100,
            recent_fix_count: 5,
            policy: EscalationPolicy::default(),
            service_name: "localhost:3000".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_max_reports(mut self, max: usize) -> Self {
        self.max_reports = max;
        self
    }

    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }
}

/// Everything needed to assemble a pipeline against one target service
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// URL probed by the health monitor and by fix verification
    pub target_url: String,
    /// Hard timeout of every probe (default: 5 seconds)
    pub probe_timeout: Duration,
    /// Monitor settings; the port is taken from `target_url`
    pub monitor: MonitorConfig,
    pub remediation: RemediationConfig,
    pub supervisor: SupervisorConfig,
    pub audit: AuditConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:3000".to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            monitor: MonitorConfig::default(),
            remediation: RemediationConfig::default(),
            supervisor: SupervisorConfig::default(),
            audit: AuditConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}
