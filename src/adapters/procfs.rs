use crate::domain::ports::{ProcessEntry, ProcessTable, Signal};
use crate::utils::error::{AutoHostsError, ErrorKind, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Mutex;
use sysinfo::{
    ProcessRefreshKind, ProcessStatus as OsProcessStatus, ProcessesToUpdate, System, UpdateKind,
};

const SOCKET_TABLES: [&str; 4] = ["tcp", "tcp6", "udp", "udp6"];

/// Live process table read through `sysinfo`, socket tables read from
/// `/proc/net`, signals delivered with `kill(2)`.
pub struct SysinfoProcessTable {
    system: Mutex<System>,
    proc_net_dir: PathBuf,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self::with_proc_net_dir("/proc/net")
    }

    pub fn with_proc_net_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            proc_net_dir: dir.into(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let mut system = self.system.lock().map_err(|_| {
            AutoHostsError::introspection(ErrorKind::Unknown, "process table lock poisoned")
        })?;

        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let mut entries: Vec<ProcessEntry> = system
            .processes()
            .values()
            .filter(|process| process.thread_kind().is_none())
            .map(|process| {
                let command_line = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                // start_time() 是 epoch 秒，0 代表讀不到
                let start_time = Some(process.start_time())
                    .filter(|secs| *secs > 0)
                    .and_then(|secs| i64::try_from(secs).ok())
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

                ProcessEntry {
                    pid: process.pid().as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    command_line,
                    start_time,
                    is_zombie: process.status() == OsProcessStatus::Zombie,
                }
            })
            .collect();

        if entries.is_empty() {
            return Err(AutoHostsError::introspection(
                ErrorKind::PermissionDenied,
                "process table is empty",
            ));
        }

        entries.sort_by_key(|e| e.pid);
        Ok(entries)
    }

    fn port_bound(&self, port: u16) -> bool {
        SOCKET_TABLES.iter().any(|table| {
            let path = self.proc_net_dir.join(table);
            match std::fs::read_to_string(&path) {
                Ok(content) => socket_table_binds_port(&content, port),
                Err(e) => {
                    tracing::debug!("Cannot read {}: {}", path.display(), e);
                    false
                }
            }
        })
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        let raw_pid = match libc::pid_t::try_from(pid) {
            Ok(p) if p > 0 => p,
            _ => {
                return Err(AutoHostsError::introspection(
                    ErrorKind::NotFound,
                    format!("invalid pid {}", pid),
                ))
            }
        };
        let raw_signal = match signal {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };

        // SAFETY: kill(2) 只送訊號，pid 已確認為正數，不會打到整個 process group
        let rc = unsafe { libc::kill(raw_pid, raw_signal) };
        if rc == 0 {
            return Ok(());
        }

        let error = std::io::Error::last_os_error();
        Err(AutoHostsError::introspection(
            ErrorKind::from_io(&error),
            format!("kill({}, {:?}) failed: {}", pid, signal, error),
        ))
    }
}

/// Checks the `local_address` column of a `/proc/net/{tcp,udp}[6]` table
/// for `port` (hex encoded, e.g. `0100007F:0035`).
pub fn socket_table_binds_port(table: &str, port: u16) -> bool {
    table.lines().skip(1).any(|line| {
        line.split_whitespace()
            .nth(1)
            .and_then(|local| local.rsplit_once(':'))
            .and_then(|(_, hex)| u16::from_str_radix(hex, 16).ok())
            == Some(port)
    })
}
