//! dnsmasq process supervision.
//!
//! Status is never cached: every query re-reads the process table, because
//! the daemon may have been started by someone else (or by a previous run of
//! this manager), may fork into the background, or may die at any time.

use crate::domain::model::ProcessStatus;
use crate::domain::ports::{ProcessEntry, ProcessTable, SettingsStore, Signal};
use crate::utils::error::{AutoHostsError, ErrorKind, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const NO_LOGS: &str = "No logs available";
pub const LOG_READ_ERROR: &str = "Error reading logs";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Prefix joined with the hosts path, e.g. `--addn-hosts=`.
    pub hosts_flag: String,
    /// Substring of the command line that identifies the daemon.
    pub process_pattern: String,
    pub log_file: PathBuf,
    pub resolver_port: u16,
    pub settle_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "dnsmasq".to_string(),
            args: Vec::new(),
            hosts_flag: "--addn-hosts=".to_string(),
            process_pattern: "dnsmasq".to_string(),
            log_file: PathBuf::from("dnsmasq.log"),
            resolver_port: 53,
            settle_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopOutcome {
    Stopped,
    ForceStopped,
}

impl StopOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Stopped => "DNSMasq stopped successfully",
            Self::ForceStopped => "DNSMasq force stopped",
        }
    }
}

/// Everything the status decision depends on, captured at one instant.
#[derive(Debug, Clone, Copy)]
pub struct OsSnapshot<'a> {
    /// Pid of our own spawned child, if it has not exited.
    pub handle_pid: Option<u32>,
    pub processes: &'a [ProcessEntry],
    pub self_pid: u32,
    pub port_bound: bool,
}

fn status_for(entry: Option<&ProcessEntry>, pid: u32, pattern: &str, port: Option<u16>) -> ProcessStatus {
    ProcessStatus {
        is_running: true,
        pid: Some(pid),
        start_time: entry.and_then(|e| e.start_time),
        command: Some(
            entry
                .map(|e| e.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| pattern.to_string()),
        ),
        bound_port: port,
    }
}

/// Pure status derivation.
///
/// A live child handle wins; otherwise the first non-zombie process (lowest
/// pid) whose command line contains `pattern` is reported. The manager's own
/// process never counts.
pub fn derive_status(snapshot: &OsSnapshot<'_>, pattern: &str, resolver_port: u16) -> ProcessStatus {
    let port = snapshot.port_bound.then_some(resolver_port);

    if let Some(pid) = snapshot.handle_pid {
        let entry = snapshot.processes.iter().find(|e| e.pid == pid);
        return status_for(entry, pid, pattern, port);
    }

    snapshot
        .processes
        .iter()
        .find(|e| !e.is_zombie && e.pid != snapshot.self_pid && e.command_line.contains(pattern))
        .map(|e| status_for(Some(e), e.pid, pattern, port))
        .unwrap_or_else(ProcessStatus::stopped)
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    table: Arc<dyn ProcessTable>,
    settings: Arc<dyn SettingsStore>,
    child: Mutex<Option<Child>>,
    control: Mutex<()>,
}

/// Appending stdout/stderr handles on the daemon log, parent dirs created.
async fn open_log(log_file: PathBuf) -> std::io::Result<(File, File)> {
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let stdout = OpenOptions::new().create(true).append(true).open(&log_file)?;
        let stderr = stdout.try_clone()?;
        Ok((stdout, stderr))
    })
    .await
    .map_err(std::io::Error::other)?
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        table: Arc<dyn ProcessTable>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            config,
            table,
            settings,
            child: Mutex::new(None),
            control: Mutex::new(()),
        }
    }

    /// Never fails; introspection problems are logged and read as stopped.
    pub async fn status(&self) -> ProcessStatus {
        let handle_pid = self.live_child_pid().await;

        // process 掃描與 /proc/net 讀取都是 blocking I/O
        let table = self.table.clone();
        let port = self.config.resolver_port;
        let (listing, port_bound) =
            tokio::task::spawn_blocking(move || (table.processes(), table.port_bound(port)))
                .await
                .unwrap_or_else(|e| {
                    (
                        Err(AutoHostsError::introspection(ErrorKind::Unknown, e.to_string())),
                        false,
                    )
                });

        let processes = match listing {
            Ok(processes) => processes,
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), "⚠️ Error getting dnsmasq status: {}", e);
                if handle_pid.is_none() {
                    return ProcessStatus::stopped();
                }
                Vec::new()
            }
        };

        let snapshot = OsSnapshot {
            handle_pid,
            processes: &processes,
            self_pid: std::process::id(),
            port_bound,
        };
        derive_status(&snapshot, &self.config.process_pattern, self.config.resolver_port)
    }

    pub async fn start(&self) -> Result<u32> {
        let _guard = self.control.lock().await;
        self.start_locked().await
    }

    pub async fn stop(&self) -> Result<StopOutcome> {
        let _guard = self.control.lock().await;
        self.stop_locked().await
    }

    /// Stop (tolerating "not running"), wait the settle interval, start.
    pub async fn restart(&self) -> Result<u32> {
        let _guard = self.control.lock().await;

        match self.stop_locked().await {
            Ok(_) | Err(AutoHostsError::NotRunningError) => {}
            Err(e) => {
                tracing::error!("❌ Failed to stop dnsmasq during restart: {}", e);
                return Err(e);
            }
        }

        tokio::time::sleep(self.config.settle_interval).await;
        self.start_locked().await
    }

    pub async fn logs(&self) -> String {
        match tokio::fs::read_to_string(&self.config.log_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => NO_LOGS.to_string(),
            Err(e) => {
                tracing::error!("❌ Error reading logs: {}", e);
                LOG_READ_ERROR.to_string()
            }
        }
    }

    /// Pid of the spawned child if it is still alive. A child that has
    /// exited is reaped and the handle dropped.
    async fn live_child_pid(&self) -> Option<u32> {
        let mut slot = self.child.lock().await;
        let child = slot.as_mut()?;

        let pid = match child.try_wait() {
            Ok(None) => child.id(),
            Ok(Some(exit)) => {
                tracing::debug!("DNSMasq child exited: {}", exit);
                None
            }
            Err(e) => {
                tracing::warn!("⚠️ Cannot poll dnsmasq child: {}", e);
                None
            }
        };
        if pid.is_none() {
            *slot = None;
        }
        pid
    }

    async fn start_locked(&self) -> Result<u32> {
        let current = self.status().await;
        if current.is_running {
            return Err(AutoHostsError::AlreadyRunningError {
                pid: current.pid.unwrap_or_default(),
            });
        }

        let hosts_file = self.settings.settings().await.hosts_file_path;
        let hosts_arg = format!("{}{}", self.config.hosts_flag, hosts_file.display());

        let (stdout, stderr) = open_log(self.config.log_file.clone()).await?;

        tracing::info!("🚀 Starting {} {}", self.config.program, hosts_arg);
        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(&hosts_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| AutoHostsError::StartFailedError {
                message: format!("cannot spawn {}: {}", self.config.program, e),
            })?;
        *self.child.lock().await = Some(child);

        tokio::time::sleep(self.config.settle_interval).await;

        let status = self.status().await;
        match status.pid.filter(|_| status.is_running) {
            Some(pid) => {
                tracing::info!("✅ DNSMasq started with PID: {}", pid);
                Ok(pid)
            }
            None => {
                self.child.lock().await.take();
                Err(AutoHostsError::StartFailedError {
                    message: "process not found after launch".to_string(),
                })
            }
        }
    }

    async fn stop_locked(&self) -> Result<StopOutcome> {
        let status = self.status().await;
        let pid = match status.pid.filter(|_| status.is_running) {
            Some(pid) => pid,
            None => return Err(AutoHostsError::NotRunningError),
        };

        self.deliver(pid, Signal::Terminate)?;
        if !self.wait_until_stopped().await.is_running {
            tracing::info!("🛑 DNSMasq stopped (PID: {})", pid);
            return Ok(StopOutcome::Stopped);
        }

        tracing::warn!("⚠️ DNSMasq (PID: {}) ignored SIGTERM, sending SIGKILL", pid);
        self.deliver(pid, Signal::Kill)?;
        let after = self.wait_until_stopped().await;
        if after.is_running {
            return Err(AutoHostsError::StopFailedError {
                pid: after.pid.unwrap_or(pid),
            });
        }

        tracing::info!("🛑 DNSMasq force stopped (PID: {})", pid);
        Ok(StopOutcome::ForceStopped)
    }

    /// A target that is already gone counts as delivered.
    fn deliver(&self, pid: u32, signal: Signal) -> Result<()> {
        match self.table.signal(pid, signal) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("PID {} already gone before {:?}", pid, signal);
                Ok(())
            }
            other => other,
        }
    }

    /// Polls until the daemon is gone or the settle interval elapses, and
    /// returns the last observed status.
    async fn wait_until_stopped(&self) -> ProcessStatus {
        let deadline = Instant::now() + self.config.settle_interval;
        loop {
            let status = self.status().await;
            if !status.is_running || Instant::now() >= deadline {
                return status;
            }
            tokio::time::sleep(POLL_INTERVAL.min(self.config.settle_interval)).await;
        }
    }
}
