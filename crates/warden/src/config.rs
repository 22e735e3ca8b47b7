//! Daemon configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_lib::{
    audit::AuditConfig,
    monitor::MonitorConfig,
    orchestrator::{EscalationPolicy, OrchestratorConfig, WardenConfig},
    remediation::{RemediationConfig, SupervisorConfig},
};

/// Default config file, looked up in the current directory without extension
const DEFAULT_CONFIG_FILE: &str = "warden";

/// Daemon configuration
///
/// Read from `WARDEN_*` environment variables layered over an optional
/// `warden.toml`. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// API server port for health/metrics/status
    pub api_port: u16,

    /// URL of the watched service
    pub target_url: String,

    /// Project directory the service runs in
    pub working_dir: PathBuf,

    /// Command that starts the service
    pub start_command: String,

    /// Command that installs the service's dependencies
    pub install_command: String,

    /// Optional command that kills stray service processes
    pub kill_command: Option<String>,

    /// Project manifest, relative to `working_dir`
    pub manifest: PathBuf,

    /// Audit data directory, relative to `working_dir`
    pub data_dir: PathBuf,

    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub slow_threshold_ms: u64,
    pub dedup_window_secs: u64,
    pub ready_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub crash_grace_secs: u64,
    pub verify_delay_secs: u64,
    pub report_interval_secs: u64,
    pub status_interval_secs: u64,
    pub failed_fix_threshold: usize,
    pub max_log_bytes: u64,
    pub max_rotated_files: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            target_url: "http://localhost:3000".to_string(),
            working_dir: PathBuf::from("."),
            start_command: "npm run dev".to_string(),
            install_command: "npm install".to_string(),
            kill_command: None,
            manifest: PathBuf::from("package.json"),
            data_dir: PathBuf::from(".warden"),
            probe_interval_secs: 10,
            probe_timeout_secs: 5,
            slow_threshold_ms: 3000,
            dedup_window_secs: 60,
            ready_timeout_secs: 10,
            install_timeout_secs: 300,
            crash_grace_secs: 2,
            verify_delay_secs: 30,
            report_interval_secs: 60,
            status_interval_secs: 300,
            failed_fix_threshold: 3,
            max_log_bytes: 10 * 1024 * 1024,
            max_rotated_files: 10,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from environment and config file
    pub fn load() -> Result<Self> {
        let file = std::env::var("WARDEN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::build(config::File::with_name(&file).required(false))
    }

    /// Load from a specific file, still honouring environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::build(config::File::from(path).required(true))
    }

    fn build<F>(file: F) -> Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let daemon: Self = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("WARDEN").try_parsing(true))
            .build()
            .context("Failed to read warden configuration")?
            .try_deserialize()
            .context("Invalid warden configuration")?;
        daemon.validate()?;
        Ok(daemon)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("probe_interval_secs", self.probe_interval_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("report_interval_secs", self.report_interval_secs),
            ("status_interval_secs", self.status_interval_secs),
            ("failed_fix_threshold", self.failed_fix_threshold as u64),
        ];
        let errors: Vec<String> = positive
            .iter()
            .filter(|(_, value)| *value == 0)
            .map(|(field, _)| format!("{} must be greater than 0", field))
            .collect();

        if !errors.is_empty() {
            anyhow::bail!("Invalid warden configuration: {}", errors.join("; "));
        }
        Ok(())
    }

    /// Resolve a path against the project directory
    fn project_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    pub fn to_warden_config(&self) -> WardenConfig {
        let monitor = MonitorConfig {
            interval: Duration::from_secs(self.probe_interval_secs),
            slow_threshold: Duration::from_millis(self.slow_threshold_ms),
            dedup_window: Duration::from_secs(self.dedup_window_secs),
            ..Default::default()
        };

        let mut supervisor = SupervisorConfig::default()
            .with_start_command(&self.start_command)
            .with_install_command(&self.install_command)
            .with_working_dir(&self.working_dir)
            .with_ready_timeout(Duration::from_secs(self.ready_timeout_secs))
            .with_install_timeout(Duration::from_secs(self.install_timeout_secs));
        if let Some(kill) = &self.kill_command {
            supervisor = supervisor.with_kill_command(kill);
        }

        let remediation = RemediationConfig::default()
            .with_crash_grace(Duration::from_secs(self.crash_grace_secs))
            .with_verify_delay(Duration::from_secs(self.verify_delay_secs))
            .with_manifest_path(self.project_path(&self.manifest));

        let audit = AuditConfig::new(self.project_path(&self.data_dir))
            .with_max_log_bytes(self.max_log_bytes)
            .with_max_rotated_files(self.max_rotated_files);

        let orchestrator = OrchestratorConfig::default()
            .with_report_interval(Duration::from_secs(self.report_interval_secs))
            .with_status_interval(Duration::from_secs(self.status_interval_secs))
            .with_policy(
                EscalationPolicy::default().with_failed_fix_threshold(self.failed_fix_threshold),
            )
            .with_service_name(&self.target_url);

        WardenConfig {
            target_url: self.target_url.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            monitor,
            remediation,
            supervisor,
            audit,
            orchestrator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = DaemonConfig::default().to_warden_config();

        assert_eq!(config.target_url, "http://localhost:3000");
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.monitor.interval, Duration::from_secs(10));
        assert_eq!(config.remediation.verify_delay, Duration::from_secs(30));
        assert_eq!(config.remediation.manifest_path, Path::new("./package.json"));
        assert_eq!(config.audit.data_dir, Path::new("./.warden"));
        assert_eq!(config.orchestrator.policy.failed_fix_threshold, 3);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(
            &path,
            r#"
target_url = "http://127.0.0.1:5173"
working_dir = "/srv/app"
start_command = "npm run preview"
kill_command = "pkill -f vite"
data_dir = "/var/lib/warden"
verify_delay_secs = 45
"#,
        )
        .unwrap();

        let daemon = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(daemon.api_port, 8080);

        let config = daemon.to_warden_config();
        assert_eq!(config.target_url, "http://127.0.0.1:5173");
        assert_eq!(config.supervisor.start_command, "npm run preview");
        assert_eq!(config.supervisor.kill_command.as_deref(), Some("pkill -f vite"));
        assert_eq!(config.remediation.manifest_path, Path::new("/srv/app/package.json"));
        assert_eq!(config.audit.data_dir, Path::new("/var/lib/warden"));
        assert_eq!(config.remediation.verify_delay, Duration::from_secs(45));
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "probe_interval_secs = 0\nreport_interval_secs = 0\n").unwrap();

        let err = DaemonConfig::from_file(&path).unwrap_err().to_string();
        assert!(err.contains("probe_interval_secs"));
        assert!(err.contains("report_interval_secs"));
        assert!(!err.contains("status_interval_secs"));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(DaemonConfig::default().validate().is_ok());

        let config = DaemonConfig {
            failed_fix_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(DaemonConfig::from_file(&dir.path().join("absent.toml")).is_err());
    }
}
