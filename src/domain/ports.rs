use crate::domain::model::{Settings, Source, SourceUpdate};
use crate::utils::error::{FetchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Durable list of hosts sources.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// All sources in registry order. Read failures yield an empty list.
    async fn list_all(&self) -> Vec<Source>;

    async fn list_enabled(&self) -> Vec<Source> {
        self.list_all()
            .await
            .into_iter()
            .filter(|s| s.enabled)
            .collect()
    }

    async fn add(&self, url: &str, name: Option<&str>) -> Result<Source>;
    async fn update(&self, id: &str, update: SourceUpdate) -> Result<Source>;
    async fn remove(&self, id: &str) -> Result<Source>;
    async fn toggle(&self, id: &str) -> Result<Source>;

    /// Clears `last_error` and stamps `last_fetch`.
    async fn record_success(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Stores the failure detail; `last_fetch` is left untouched.
    async fn record_error(&self, id: &str, message: &str) -> Result<()>;
}

/// Durable runtime settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings. Read failures fall back to defaults.
    async fn settings(&self) -> Settings;

    async fn set_cron_expression(&self, expression: &str) -> Result<()>;

    /// Blank input resets to the default path. Returns the stored path.
    async fn set_hosts_file_path(&self, path: &str) -> Result<PathBuf>;

    async fn set_fetch_timeout_ms(&self, timeout_ms: u64) -> Result<()>;
}

/// Bounded-timeout retrieval of one hosts document.
#[async_trait]
pub trait HostsFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<String, FetchError>;
}

/// One row of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub command_line: String,
    pub start_time: Option<DateTime<Utc>>,
    pub is_zombie: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

/// OS process introspection and control.
pub trait ProcessTable: Send + Sync {
    /// Snapshot of all processes, ordered by pid.
    fn processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Whether `port` appears as a local port in the TCP or UDP socket tables.
    fn port_bound(&self, port: u16) -> bool;

    fn signal(&self, pid: u32, signal: Signal) -> Result<()>;
}
