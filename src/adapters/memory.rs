//! In-memory collaborator stores, for embedding and tests.

use crate::config::settings::{checked_cron_expression, checked_fetch_timeout, resolve_hosts_path};
use crate::domain::model::{Settings, Source, SourceUpdate};
use crate::domain::ports::{SettingsStore, SourceRegistry};
use crate::domain::registry;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemorySourceRegistry {
    sources: Mutex<Vec<Source>>,
}

impl MemorySourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceRegistry for MemorySourceRegistry {
    async fn list_all(&self) -> Vec<Source> {
        self.sources.lock().await.clone()
    }

    async fn add(&self, url: &str, name: Option<&str>) -> Result<Source> {
        registry::add(&mut *self.sources.lock().await, url, name)
    }

    async fn update(&self, id: &str, update: SourceUpdate) -> Result<Source> {
        registry::update(&mut self.sources.lock().await, id, update)
    }

    async fn remove(&self, id: &str) -> Result<Source> {
        registry::remove(&mut *self.sources.lock().await, id)
    }

    async fn toggle(&self, id: &str) -> Result<Source> {
        registry::toggle(&mut self.sources.lock().await, id)
    }

    async fn record_success(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        registry::record_success(&mut self.sources.lock().await, id, at)
    }

    async fn record_error(&self, id: &str, message: &str) -> Result<()> {
        registry::record_error(&mut self.sources.lock().await, id, message)
    }
}

#[derive(Debug)]
pub struct MemorySettingsStore {
    default_hosts_path: PathBuf,
    settings: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            default_hosts_path: settings.hosts_file_path.clone(),
            settings: Mutex::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn settings(&self) -> Settings {
        self.settings.lock().await.clone()
    }

    async fn set_cron_expression(&self, expression: &str) -> Result<()> {
        let expression = checked_cron_expression(expression)?;
        self.settings.lock().await.cron_expression = expression;
        Ok(())
    }

    async fn set_hosts_file_path(&self, path: &str) -> Result<PathBuf> {
        let resolved = resolve_hosts_path(path, &self.default_hosts_path)?;
        self.settings.lock().await.hosts_file_path = resolved.clone();
        Ok(resolved)
    }

    async fn set_fetch_timeout_ms(&self, timeout_ms: u64) -> Result<()> {
        self.settings.lock().await.fetch_timeout_ms = checked_fetch_timeout(timeout_ms)?;
        Ok(())
    }
}
