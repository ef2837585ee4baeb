#![cfg(target_os = "linux")]

use autohosts::adapters::memory::MemorySettingsStore;
use autohosts::adapters::procfs::SysinfoProcessTable;
use autohosts::config::settings::default_settings;
use autohosts::core::supervisor::{ProcessSupervisor, StopOutcome, SupervisorConfig, NO_LOGS};
use autohosts::AutoHostsError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A stand-in daemon: a shell loop whose command line carries a unique
/// marker so the process scan can find it among everything else running.
struct FakeDaemon {
    dir: TempDir,
    marker: String,
}

impl FakeDaemon {
    fn new(ignore_term: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let marker = format!("fake-dnsmasq-{}", uuid::Uuid::new_v4());
        let trap = if ignore_term { "trap '' TERM\n" } else { "" };
        let script = format!(
            "{}echo \"fake daemon up: $1\"\nwhile true; do sleep 1; done\n",
            trap
        );
        std::fs::write(dir.path().join(format!("{}.sh", marker)), script).unwrap();
        Self { dir, marker }
    }

    fn supervisor(&self) -> ProcessSupervisor {
        let config = SupervisorConfig {
            program: "/bin/sh".to_string(),
            args: vec![self
                .dir
                .path()
                .join(format!("{}.sh", self.marker))
                .to_string_lossy()
                .into_owned()],
            hosts_flag: "--addn-hosts=".to_string(),
            process_pattern: self.marker.clone(),
            log_file: self.dir.path().join("logs").join("dnsmasq.log"),
            resolver_port: 1,
            settle_interval: Duration::from_millis(300),
        };
        let settings = Arc::new(MemorySettingsStore::new(default_settings(
            self.dir.path().join("extra_hosts.conf"),
        )));
        ProcessSupervisor::new(config, Arc::new(SysinfoProcessTable::new()), settings)
    }
}

#[tokio::test]
async fn test_start_status_stop_cycle() {
    let daemon = FakeDaemon::new(false);
    let supervisor = daemon.supervisor();

    assert!(!supervisor.status().await.is_running);
    assert_eq!(supervisor.logs().await, NO_LOGS);
    assert!(matches!(
        supervisor.stop().await,
        Err(AutoHostsError::NotRunningError)
    ));

    let pid = supervisor.start().await.unwrap();
    let status = supervisor.status().await;
    assert!(status.is_running);
    assert_eq!(status.pid, Some(pid));
    assert!(status.start_time.is_some());
    assert!(status.bound_port.is_none());

    assert!(matches!(
        supervisor.start().await,
        Err(AutoHostsError::AlreadyRunningError { pid: running }) if running == pid
    ));

    // 啟動參數帶著目前設定的 hosts 路徑
    let logs = supervisor.logs().await;
    assert!(logs.contains("fake daemon up: --addn-hosts="));
    assert!(logs.contains("extra_hosts.conf"));

    assert_eq!(supervisor.stop().await.unwrap(), StopOutcome::Stopped);
    assert!(!supervisor.status().await.is_running);
}

#[tokio::test]
async fn test_restart_from_stopped_and_running() {
    let daemon = FakeDaemon::new(false);
    let supervisor = daemon.supervisor();

    let first = supervisor.restart().await.unwrap();
    assert!(supervisor.status().await.is_running);

    let second = supervisor.restart().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(supervisor.status().await.pid, Some(second));

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_escalates_when_term_is_ignored() {
    let daemon = FakeDaemon::new(true);
    let supervisor = daemon.supervisor();

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.stop().await.unwrap(), StopOutcome::ForceStopped);
    assert!(!supervisor.status().await.is_running);
}

#[tokio::test]
async fn test_start_failure_when_process_exits_immediately() {
    let dir = TempDir::new().unwrap();
    let marker = format!("fake-dnsmasq-{}", uuid::Uuid::new_v4());
    let config = SupervisorConfig {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), format!("exit 3 # {}", marker)],
        process_pattern: marker,
        log_file: dir.path().join("dnsmasq.log"),
        resolver_port: 1,
        settle_interval: Duration::from_millis(200),
        ..SupervisorConfig::default()
    };
    let settings = Arc::new(MemorySettingsStore::new(default_settings(
        dir.path().join("extra_hosts.conf"),
    )));
    let supervisor = ProcessSupervisor::new(config, Arc::new(SysinfoProcessTable::new()), settings);

    assert!(matches!(
        supervisor.start().await,
        Err(AutoHostsError::StartFailedError { .. })
    ));
    assert!(!supervisor.status().await.is_running);
}
