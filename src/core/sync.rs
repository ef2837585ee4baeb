use crate::config::settings::{DEFAULT_FETCH_TIMEOUT_MS, MIN_FETCH_TIMEOUT_MS};
use crate::core::{hosts_parser, hosts_writer};
use crate::domain::model::{FetchNowReport, HostsLine, SyncResult};
use crate::domain::ports::{HostsFetcher, SettingsStore, SourceRegistry};
use crate::utils::error::{AutoHostsError, Result};
use crate::utils::fs::FileLock;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Effective per-source timeout: override, then settings, then the default,
/// never below the floor. Zero counts as "not set".
pub fn effective_timeout(override_ms: Option<u64>, settings_ms: Option<u64>) -> Duration {
    let ms = override_ms
        .filter(|ms| *ms > 0)
        .or(settings_ms.filter(|ms| *ms > 0))
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_MS)
        .max(MIN_FETCH_TIMEOUT_MS);
    Duration::from_millis(ms)
}

/// Runs fetch-all-enabled-sources-then-publish passes, one at a time.
///
/// With a lock file configured, "one at a time" also holds across
/// processes sharing the same data directory.
pub struct SyncOrchestrator {
    registry: Arc<dyn SourceRegistry>,
    settings: Arc<dyn SettingsStore>,
    fetcher: Arc<dyn HostsFetcher>,
    pass_lock: Mutex<()>,
    lock_file: Option<PathBuf>,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<dyn SourceRegistry>,
        settings: Arc<dyn SettingsStore>,
        fetcher: Arc<dyn HostsFetcher>,
    ) -> Self {
        Self {
            registry,
            settings,
            fetcher,
            pass_lock: Mutex::new(()),
            lock_file: None,
        }
    }

    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Runs one pass, waiting for any pass already in flight.
    pub async fn run_once(&self, timeout_override_ms: Option<u64>) -> Result<SyncResult> {
        let _pass = self.pass_lock.lock().await;
        let _file_lock = match &self.lock_file {
            Some(path) => Some(FileLock::lock(path).await?),
            None => None,
        };
        self.run_pass(timeout_override_ms).await
    }

    /// Runs one pass, or fails with `SyncBusyError` if one is in flight
    /// here or in another process.
    pub async fn try_run_once(&self, timeout_override_ms: Option<u64>) -> Result<SyncResult> {
        let _pass = self
            .pass_lock
            .try_lock()
            .map_err(|_| AutoHostsError::SyncBusyError)?;
        let _file_lock = match &self.lock_file {
            Some(path) => Some(
                FileLock::try_lock(path)
                    .await?
                    .ok_or(AutoHostsError::SyncBusyError)?,
            ),
            None => None,
        };
        self.run_pass(timeout_override_ms).await
    }

    /// Manual trigger.
    pub async fn fetch_now(&self, timeout_override_ms: Option<u64>) -> Result<FetchNowReport> {
        tracing::info!("👆 Manual hosts fetch triggered...");
        if self.registry.list_enabled().await.is_empty() {
            return Ok(FetchNowReport {
                message: "No enabled URLs to fetch".to_string(),
                hosts_count: 0,
                errors_count: 0,
            });
        }
        let result = self.try_run_once(timeout_override_ms).await?;
        Ok(result.into())
    }

    async fn run_pass(&self, timeout_override_ms: Option<u64>) -> Result<SyncResult> {
        tracing::info!("🔄 Starting hosts fetch...");

        let sources = self.registry.list_enabled().await;
        if sources.is_empty() {
            tracing::info!("No enabled URLs to fetch");
            return Ok(SyncResult::default());
        }

        let settings = self.settings.settings().await;
        let timeout = effective_timeout(timeout_override_ms, Some(settings.fetch_timeout_ms));

        let mut all_hosts: Vec<HostsLine> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for source in &sources {
            tracing::info!("🌐 Fetching hosts from: {}", source.url);

            match self.fetcher.fetch(&source.url, timeout).await {
                Ok(body) => {
                    let hosts = hosts_parser::parse(&body);
                    tracing::info!("✅ Fetched {} hosts from {}", hosts.len(), source.url);
                    all_hosts.extend(hosts);

                    if let Err(e) = self.registry.record_success(&source.id, Utc::now()).await {
                        tracing::warn!("⚠️ Could not record fetch time for {}: {}", source.url, e);
                    }
                }
                Err(fetch_error) => {
                    let details = fetch_error.detail();
                    let message = format!("Failed to fetch from {}: {}", source.url, details);
                    tracing::error!(kind = ?fetch_error.kind, "❌ {}", message);
                    errors.push(message);

                    if let Err(e) = self.registry.record_error(&source.id, &details).await {
                        tracing::warn!("⚠️ Could not record error for {}: {}", source.url, e);
                    }
                }
            }
        }

        if !all_hosts.is_empty() {
            hosts_writer::publish(&settings.hosts_file_path, &all_hosts).await?;
        }

        if !errors.is_empty() {
            tracing::warn!("⚠️ Completed with {} errors", errors.len());
        }

        Ok(SyncResult {
            hosts_count: all_hosts.len(),
            errors_count: errors.len(),
        })
    }
}
