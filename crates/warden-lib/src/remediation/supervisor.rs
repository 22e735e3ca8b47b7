//! Supervision of the target service process
//!
//! The remediation engine is the only owner of the supervised process. It
//! drives it through the [`ProcessSupervisor`] trait so workflows can be
//! tested without spawning anything.

use crate::error::FixError;
use crate::events::{SupervisorEvent, EVENT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Characters of command output kept in a fix error
const OUTPUT_TAIL_CHARS: usize = 1000;

/// How a start attempt finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A readiness marker appeared in the service output
    Ready,
    /// No marker before the readiness timeout; treated as started
    TimedOut,
}

/// Control surface over the supervised service process
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Stop the service. Nothing to stop is not an error.
    async fn terminate(&self) -> Result<(), FixError>;

    /// Run the dependency installation command to completion
    async fn install_dependencies(&self) -> Result<(), FixError>;

    /// Remove the configured build caches
    async fn clear_cache(&self) -> Result<(), FixError>;

    /// Spawn the service and wait for readiness or the readiness timeout
    async fn start(&self) -> Result<StartOutcome, FixError>;

    /// Output and exit notifications of the supervised process, if supported
    fn events(&self) -> Option<broadcast::Receiver<SupervisorEvent>> {
        None
    }
}

/// Configuration for [`CommandSupervisor`]
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Shell command that starts the service (default: `npm run dev`)
    pub start_command: String,
    /// Shell command that installs dependencies (default: `npm install`)
    pub install_command: String,
    /// Extra command that kills stray service processes not spawned here
    pub kill_command: Option<String>,
    pub working_dir: PathBuf,
    /// Cache directories removed by CLEAR_CACHE, relative to `working_dir`
    pub cache_dirs: Vec<PathBuf>,
    /// Case-insensitive output fragments meaning the service is ready
    pub ready_markers: Vec<String>,
    /// Case-insensitive output fragments meaning the build failed
    pub build_error_markers: Vec<String>,
    /// Time to wait for a readiness marker (default: 10 seconds)
    pub ready_timeout: Duration,
    /// Upper bound for dependency installation (default: 5 minutes)
    pub install_timeout: Duration,
    /// Time the service group gets to exit after SIGTERM before SIGKILL (default: 5 seconds)
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_command: "npm run dev".to_string(),
            install_command: "npm install".to_string(),
            kill_command: None,
            working_dir: PathBuf::from("."),
            cache_dirs: vec![PathBuf::from(".next/cache"), PathBuf::from("node_modules/.cache")],
            ready_markers: vec![
                "ready".to_string(),
                "listening on".to_string(),
                "started server".to_string(),
                "compiled successfully".to_string(),
            ],
            build_error_markers: vec![
                "failed to compile".to_string(),
                "module not found".to_string(),
                "cannot find module".to_string(),
                "build error".to_string(),
                "syntaxerror".to_string(),
            ],
            ready_timeout: Duration::from_secs(10),
            install_timeout: Duration::from_secs(300),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl SupervisorConfig {
    pub fn with_start_command(mut self, command: impl Into<String>) -> Self {
        self.start_command = command.into();
        self
    }

    pub fn with_install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = command.into();
        self
    }

    pub fn with_kill_command(mut self, command: impl Into<String>) -> Self {
        self.kill_command = Some(command.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_cache_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.cache_dirs = dirs;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

struct OutputMarkers {
    ready: Vec<String>,
    build_error: Vec<String>,
}

impl OutputMarkers {
    fn from_config(config: &SupervisorConfig) -> Self {
        let lower = |markers: &[String]| markers.iter().map(|m| m.to_lowercase()).collect();
        Self {
            ready: lower(&config.ready_markers),
            build_error: lower(&config.build_error_markers),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Signal every process in the group led by `pgid`
#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) -> bool {
    let signal = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    // SAFETY: killpg takes plain integers; a group that no longer exists yields ESRCH.
    unsafe { libc::killpg(pgid, signal) == 0 }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: GroupSignal) -> bool {
    false
}

/// Kills the service's whole process group when dropped while armed
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.0 {
            signal_group(pgid, GroupSignal::Kill);
        }
    }
}

/// Shared between `start` and the watcher so an exit is reported exactly once:
/// either as a startup failure or as an unexpected exit.
#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    exit: Option<Option<i32>>,
}

struct RunningProcess {
    pid: Option<u32>,
    kill: oneshot::Sender<()>,
    watcher: JoinHandle<()>,
    group: GroupGuard,
}

/// Supervises the service through `sh -c` commands
pub struct CommandSupervisor {
    config: SupervisorConfig,
    markers: Arc<OutputMarkers>,
    running: Mutex<Option<RunningProcess>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl CommandSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            markers: Arc::new(OutputMarkers::from_config(&config)),
            config,
            running: Mutex::new(None),
            events,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Whether a process spawned by this supervisor is currently tracked
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|p| !p.watcher.is_finished())
            .unwrap_or(false)
    }

    async fn stop_owned(&self) {
        let Some(process) = self.running.lock().await.take() else {
            debug!("No owned service process to stop");
            return;
        };

        // The watcher kills the child; a send error means it already exited.
        let _ = process.kill.send(());
        if let Err(e) = process.watcher.await {
            warn!(error = %e, "Process watcher task failed");
        }
        process.group.disarm();
        info!(pid = ?process.pid, "Stopped supervised process");
    }
}

/// `sh -c command`, leading its own process group so everything it spawns
/// can be signalled together
fn shell(command: &str, working_dir: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// SIGTERM the group, give it `grace` to exit, then SIGKILL whatever is left
async fn stop_process(child: &mut Child, pgid: Option<u32>, grace: Duration) {
    match pgid {
        Some(pgid) if signal_group(pgid, GroupSignal::Terminate) => {
            let exited = tokio::time::timeout(grace, child.wait()).await.is_ok();
            // Members that ignored SIGTERM or outlived the shell.
            signal_group(pgid, GroupSignal::Kill);
            if exited {
                return;
            }
            warn!(pgid, grace_secs = grace.as_secs(), "Service group ignored SIGTERM");
        }
        _ => {}
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill supervised process");
    }
}

fn spawn_error(command: &str, err: std::io::Error) -> FixError {
    FixError::Spawn {
        command: command.to_string(),
        reason: err.to_string(),
    }
}

/// Trailing part of a command's output, preferring stderr
fn output_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(OUTPUT_TAIL_CHARS);
    text.chars().skip(skip).collect()
}

async fn pump_output<R>(
    reader: R,
    stream: &'static str,
    markers: Arc<OutputMarkers>,
    ready: Arc<Notify>,
    events: broadcast::Sender<SupervisorEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(stream, line = %line, "Service output");
        let lower = line.to_lowercase();

        if markers.ready.iter().any(|m| lower.contains(m.as_str())) {
            ready.notify_one();
        }
        if markers.build_error.iter().any(|m| lower.contains(m.as_str())) {
            let _ = events.send(SupervisorEvent::BuildFailure(line.trim().to_string()));
        }
    }
}

struct WatchContext {
    pgid: Option<u32>,
    stop_timeout: Duration,
    lifecycle: Arc<StdMutex<Lifecycle>>,
    events: broadcast::Sender<SupervisorEvent>,
}

async fn watch_process(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    exited: oneshot::Sender<Option<i32>>,
    ctx: WatchContext,
) {
    tokio::select! {
        status = child.wait() => {
            let code = status.ok().and_then(|s| s.code());
            // Leftovers of a dead shell would hold the port on restart.
            if let Some(pgid) = ctx.pgid {
                signal_group(pgid, GroupSignal::Kill);
            }

            let unexpected = {
                let mut lifecycle = ctx.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
                lifecycle.exit = Some(code);
                lifecycle.started
            };
            if unexpected {
                warn!(code = ?code, "Supervised process exited unexpectedly");
                let _ = ctx.events.send(SupervisorEvent::UnexpectedExit { code });
            }
            let _ = exited.send(code);
        }
        _ = kill => stop_process(&mut child, ctx.pgid, ctx.stop_timeout).await,
    }
}

#[async_trait]
impl ProcessSupervisor for CommandSupervisor {
    async fn terminate(&self) -> Result<(), FixError> {
        self.stop_owned().await;

        if let Some(kill_command) = &self.config.kill_command {
            let output = shell(kill_command, &self.config.working_dir)
                .output()
                .await
                .map_err(|e| spawn_error(kill_command, e))?;

            if output.status.success() {
                info!(command = %kill_command, "Killed stray service processes");
            } else {
                debug!(
                    command = %kill_command,
                    code = ?output.status.code(),
                    "Kill command found nothing to kill"
                );
            }
        }

        Ok(())
    }

    async fn install_dependencies(&self) -> Result<(), FixError> {
        let command = &self.config.install_command;
        info!(command = %command, "Installing dependencies");

        let child = shell(command, &self.config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(command, e))?;
        let group = GroupGuard(child.id());

        let output = tokio::time::timeout(self.config.install_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                FixError::Aborted(format!(
                    "`{}` did not finish within {}s",
                    command,
                    self.config.install_timeout.as_secs()
                ))
            })?
            .map_err(|e| spawn_error(command, e))?;
        group.disarm();

        if !output.status.success() {
            return Err(FixError::NonZeroExit {
                command: command.clone(),
                code: output.status.code(),
                output: output_tail(&output),
            });
        }

        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), FixError> {
        for dir in &self.config.cache_dirs {
            let path = self.config.working_dir.join(dir);
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => info!(path = %path.display(), "Cleared cache directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Cache directory absent")
                }
                Err(e) => {
                    return Err(FixError::CacheClear {
                        path,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    async fn start(&self) -> Result<StartOutcome, FixError> {
        self.stop_owned().await;

        let command = &self.config.start_command;
        let mut child = shell(command, &self.config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(command, e))?;
        let pid = child.id();
        info!(pid = ?pid, command = %command, "Spawned service process");

        let ready = Arc::new(Notify::new());
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_output(
                stdout,
                "stdout",
                self.markers.clone(),
                ready.clone(),
                self.events.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_output(
                stderr,
                "stderr",
                self.markers.clone(),
                ready.clone(),
                self.events.clone(),
            ));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, mut exit_rx) = oneshot::channel();
        let lifecycle = Arc::new(StdMutex::new(Lifecycle::default()));
        let watcher = tokio::spawn(watch_process(
            child,
            kill_rx,
            exit_tx,
            WatchContext {
                pgid: pid,
                stop_timeout: self.config.stop_timeout,
                lifecycle: lifecycle.clone(),
                events: self.events.clone(),
            },
        ));

        let outcome = tokio::select! {
            _ = ready.notified() => StartOutcome::Ready,
            code = &mut exit_rx => {
                let code = code.ok().flatten();
                warn!(code = ?code, "Service exited during startup");
                return Err(FixError::ExitedEarly { code });
            }
            _ = tokio::time::sleep(self.config.ready_timeout) => StartOutcome::TimedOut,
        };

        // An exit the watcher recorded before this point is a startup failure;
        // any later one is reported by the watcher as unexpected.
        let raced_exit = {
            let mut lifecycle = lifecycle.lock().unwrap_or_else(|e| e.into_inner());
            lifecycle.started = true;
            lifecycle.exit
        };
        if let Some(code) = raced_exit {
            warn!(code = ?code, "Service exited during startup");
            return Err(FixError::ExitedEarly { code });
        }

        *self.running.lock().await = Some(RunningProcess {
            pid,
            kill: kill_tx,
            watcher,
            group: GroupGuard(pid),
        });

        match outcome {
            StartOutcome::Ready => info!(pid = ?pid, "Service reported ready"),
            StartOutcome::TimedOut => info!(
                pid = ?pid,
                timeout_secs = self.config.ready_timeout.as_secs(),
                "No readiness marker before timeout, assuming started"
            ),
        }
        Ok(outcome)
    }

    fn events(&self) -> Option<broadcast::Receiver<SupervisorEvent>> {
        Some(self.events.subscribe())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supervisor(dir: &TempDir, start: &str) -> CommandSupervisor {
        CommandSupervisor::new(
            SupervisorConfig::default()
                .with_working_dir(dir.path())
                .with_start_command(start)
                .with_ready_timeout(Duration::from_millis(500)),
        )
    }

    #[tokio::test]
    async fn test_start_detects_ready_marker() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "echo 'Server ready on :3000'; sleep 30");

        assert_eq!(sup.start().await.unwrap(), StartOutcome::Ready);
        assert!(sup.is_running().await);

        sup.terminate().await.unwrap();
        assert!(!sup.is_running().await);
    }

    #[tokio::test]
    async fn test_start_without_marker_is_soft_success() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "sleep 30");

        assert_eq!(sup.start().await.unwrap(), StartOutcome::TimedOut);
        sup.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_reports_early_exit() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "exit 3");

        let err = sup.start().await.unwrap_err();
        assert_eq!(err, FixError::ExitedEarly { code: Some(3) });
    }

    #[tokio::test]
    async fn test_deliberate_kill_is_not_a_crash() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "echo ready; sleep 30");
        let mut events = sup.events().unwrap();

        sup.start().await.unwrap();
        sup.terminate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_unexpected_exit_after_start_is_reported() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "echo ready; sleep 0.3; exit 2");
        let mut events = sup.events().unwrap();

        sup.start().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SupervisorEvent::UnexpectedExit { code: Some(2) });
    }

    #[tokio::test]
    async fn test_exit_right_after_ready_is_reported_once() {
        for _ in 0..20 {
            let dir = TempDir::new().unwrap();
            let sup = supervisor(&dir, "echo ready; exit 4");
            let mut events = sup.events().unwrap();

            match sup.start().await {
                Err(err) => assert_eq!(err, FixError::ExitedEarly { code: Some(4) }),
                Ok(_) => {
                    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                        .await
                        .unwrap()
                        .unwrap();
                    assert_eq!(event, SupervisorEvent::UnexpectedExit { code: Some(4) });
                }
            }
        }
    }

    /// Live, non-zombie process
    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| stat.rsplit(')').next().map(|rest| rest.trim_start().to_string()))
            .map(|rest| !rest.starts_with('Z'))
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    async fn wait_until_gone(pid: u32) -> bool {
        tokio::time::timeout(Duration::from_secs(5), async {
            while process_alive(pid) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    #[cfg(target_os = "linux")]
    fn server_pid(dir: &TempDir) -> u32 {
        std::fs::read_to_string(dir.path().join("server.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_terminate_stops_processes_spawned_by_the_shell() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "sleep 300 & echo $! > server.pid; echo ready; wait");

        assert_eq!(sup.start().await.unwrap(), StartOutcome::Ready);
        let pid = server_pid(&dir);
        assert!(process_alive(pid));

        sup.terminate().await.unwrap();

        assert!(wait_until_gone(pid).await, "server {} survived terminate", pid);
        assert!(!sup.is_running().await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_terminate_kills_group_that_ignores_sigterm() {
        let dir = TempDir::new().unwrap();
        let sup = CommandSupervisor::new(
            SupervisorConfig::default()
                .with_working_dir(dir.path())
                .with_start_command("trap '' TERM; sleep 300 & echo $! > server.pid; echo ready; wait")
                .with_stop_timeout(Duration::from_millis(200)),
        );

        sup.start().await.unwrap();
        let pid = server_pid(&dir);

        sup.terminate().await.unwrap();

        assert!(wait_until_gone(pid).await, "server {} survived SIGKILL", pid);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_crashed_shell_leaves_no_server_behind() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "sleep 300 & echo $! > server.pid; echo ready; sleep 0.3; exit 2");
        let mut events = sup.events().unwrap();

        sup.start().await.unwrap();
        let pid = server_pid(&dir);

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SupervisorEvent::UnexpectedExit { code: Some(2) });
        assert!(wait_until_gone(pid).await);
    }

    #[tokio::test]
    async fn test_build_failure_lines_are_published() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, "echo 'Failed to compile ./app/page.tsx' >&2; sleep 30");
        let mut events = sup.events().unwrap();

        sup.start().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SupervisorEvent::BuildFailure(ref line) if line.contains("page.tsx")));

        sup.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_install_failure_captures_output() {
        let dir = TempDir::new().unwrap();
        let sup = CommandSupervisor::new(
            SupervisorConfig::default()
                .with_working_dir(dir.path())
                .with_install_command("echo 'ERESOLVE unable to resolve' >&2; exit 1"),
        );

        match sup.install_dependencies().await.unwrap_err() {
            FixError::NonZeroExit { code, output, .. } => {
                assert_eq!(code, Some(1));
                assert!(output.contains("ERESOLVE"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_install_success() {
        let dir = TempDir::new().unwrap();
        let sup = CommandSupervisor::new(
            SupervisorConfig::default()
                .with_working_dir(dir.path())
                .with_install_command("true"),
        );
        assert!(sup.install_dependencies().await.is_ok());
    }

    #[tokio::test]
    async fn test_install_timeout_aborts() {
        let dir = TempDir::new().unwrap();
        let sup = CommandSupervisor::new(
            SupervisorConfig::default()
                .with_working_dir(dir.path())
                .with_install_command("sleep 30")
                .with_install_timeout(Duration::from_millis(100)),
        );
        assert!(matches!(
            sup.install_dependencies().await,
            Err(FixError::Aborted(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_cache_tolerates_missing_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".next/cache/webpack")).unwrap();
        std::fs::write(dir.path().join(".next/cache/webpack/0.pack"), b"stale").unwrap();

        let sup = CommandSupervisor::new(SupervisorConfig::default().with_working_dir(dir.path()));
        sup.clear_cache().await.unwrap();

        assert!(!dir.path().join(".next/cache").exists());
        assert!(dir.path().join(".next").exists());
    }

    #[tokio::test]
    async fn test_terminate_with_nothing_running() {
        let dir = TempDir::new().unwrap();
        let sup = CommandSupervisor::new(
            SupervisorConfig::default()
                .with_working_dir(dir.path())
                .with_kill_command("exit 1"),
        );
        assert!(sup.terminate().await.is_ok());
    }
}
