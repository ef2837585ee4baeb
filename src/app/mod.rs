//! Wires the concrete adapters into the sync pipeline, the scheduler and
//! the process supervisor.

use crate::adapters::http::ReqwestFetcher;
use crate::adapters::procfs::SysinfoProcessTable;
use crate::adapters::storage::JsonSourceRegistry;
use crate::config::settings::{default_hosts_path, DEFAULT_CRON_EXPRESSION};
use crate::config::{AppConfig, JsonSettingsStore};
use crate::core::hosts_writer;
use crate::core::scheduler::Scheduler;
use crate::core::supervisor::ProcessSupervisor;
use crate::core::sync::SyncOrchestrator;
use crate::domain::model::{HostsFileStats, Settings};
use crate::domain::ports::{HostsFetcher, ProcessTable, SettingsStore, SourceRegistry};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use std::path::PathBuf;
use std::sync::Arc;

pub struct AutoHosts {
    pub settings: Arc<dyn SettingsStore>,
    pub registry: Arc<dyn SourceRegistry>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub scheduler: Scheduler,
    pub supervisor: ProcessSupervisor,
}

impl AutoHosts {
    /// Builds the production stack: JSON stores, reqwest, sysinfo.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        // dnsmasq 與其他 autohosts 行程不共用工作目錄
        let config = config.clone().with_absolute_data_dir()?;

        let settings: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::new(
            config.settings_path(),
            default_hosts_path(&config.storage.data_dir),
        ));
        let registry: Arc<dyn SourceRegistry> =
            Arc::new(JsonSourceRegistry::new(config.sources_path()));
        let fetcher: Arc<dyn HostsFetcher> = Arc::new(ReqwestFetcher::new(&config.fetch.user_agent)?);
        let table: Arc<dyn ProcessTable> = Arc::new(SysinfoProcessTable::new());

        tracing::debug!(
            "Using settings {} and sources {}",
            config.settings_path().display(),
            config.sources_path().display()
        );

        Ok(Self::with_parts(&config, settings, registry, fetcher, table))
    }

    /// Same wiring with caller-supplied collaborators.
    pub fn with_parts(
        config: &AppConfig,
        settings: Arc<dyn SettingsStore>,
        registry: Arc<dyn SourceRegistry>,
        fetcher: Arc<dyn HostsFetcher>,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        let orchestrator = Arc::new(
            SyncOrchestrator::new(registry.clone(), settings.clone(), fetcher)
                .with_lock_file(config.sync_lock_path()),
        );
        let scheduler = Scheduler::new(orchestrator.clone());
        let supervisor = ProcessSupervisor::new(config.supervisor_config(), table, settings.clone());

        Self {
            settings,
            registry,
            orchestrator,
            scheduler,
            supervisor,
        }
    }

    /// Registers the persisted cron expression. A stored expression that no
    /// longer parses is replaced by the default schedule.
    pub async fn start_schedule(&self) -> Result<String> {
        let stored = self.settings.settings().await.cron_expression;
        match self.scheduler.register(&stored).await {
            Ok(()) => Ok(stored),
            Err(e) => {
                tracing::warn!(
                    "⚠️ Stored cron expression '{}' rejected ({}), using {}",
                    stored,
                    e,
                    DEFAULT_CRON_EXPRESSION
                );
                self.scheduler.register(DEFAULT_CRON_EXPRESSION).await?;
                Ok(DEFAULT_CRON_EXPRESSION.to_string())
            }
        }
    }

    /// Picks up a cron expression changed in the settings file by another
    /// process. Returns whether the timer was swapped.
    pub async fn reload_schedule(&self) -> Result<bool> {
        let stored = self.settings.settings().await.cron_expression;
        if self.scheduler.current_expression().await.as_deref() == Some(stored.trim()) {
            return Ok(false);
        }
        self.scheduler.register(&stored).await?;
        tracing::info!("🔄 Schedule reloaded from settings: {}", stored);
        Ok(true)
    }

    pub async fn current_settings(&self) -> Settings {
        self.settings.settings().await
    }

    pub async fn hosts_path(&self) -> PathBuf {
        self.settings.settings().await.hosts_file_path
    }

    pub async fn set_hosts_path(&self, path: &str) -> Result<PathBuf> {
        let stored = self.settings.set_hosts_file_path(path).await?;
        tracing::info!("📁 Hosts file path set to {}", stored.display());
        Ok(stored)
    }

    pub async fn hosts_content(&self) -> String {
        hosts_writer::read_content(&self.hosts_path().await).await
    }

    pub async fn hosts_stats(&self) -> HostsFileStats {
        hosts_writer::stats(&self.hosts_path().await).await
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
