use crate::domain::model::Settings;
use crate::domain::ports::SettingsStore;
use crate::utils::error::{AutoHostsError, Result};
use crate::utils::fs::{lock_path_for, write_atomic, FileLock};
use crate::utils::validation::{parse_cron_expression, validate_minimum, validate_path};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const DEFAULT_CRON_EXPRESSION: &str = "*/5 * * * *";
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const MIN_FETCH_TIMEOUT_MS: u64 = 1_000;
pub const HOSTS_PATH_ENV: &str = "DNSMASQ_HOSTS";

/// `$DNSMASQ_HOSTS`，否則 `<data_dir>/extra_hosts.conf`
///
/// A relative `$DNSMASQ_HOSTS` is taken relative to `data_dir`.
pub fn default_hosts_path(data_dir: &Path) -> PathBuf {
    std::env::var(HOSTS_PATH_ENV)
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .map(|p| data_dir.join(p))
        .unwrap_or_else(|| data_dir.join("extra_hosts.conf"))
}

pub fn default_settings(hosts_file_path: PathBuf) -> Settings {
    Settings {
        cron_expression: DEFAULT_CRON_EXPRESSION.to_string(),
        hosts_file_path,
        fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
    }
}

/// Validated, trimmed cron expression ready to store.
pub fn checked_cron_expression(expression: &str) -> Result<String> {
    let expression = expression.trim();
    parse_cron_expression(expression)?;
    Ok(expression.to_string())
}

/// Blank input falls back to `default`. Anything else must be absolute,
/// since dnsmasq is started from a different working directory.
pub fn resolve_hosts_path(path: &str, default: &Path) -> Result<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Ok(default.to_path_buf());
    }
    validate_path("hosts_file_path", path)?;
    let resolved = PathBuf::from(path);
    if !resolved.is_absolute() {
        return Err(AutoHostsError::InvalidConfigValueError {
            field: "hosts_file_path".to_string(),
            value: path.to_string(),
            reason: "Path must be absolute".to_string(),
        });
    }
    Ok(resolved)
}

pub fn checked_fetch_timeout(timeout_ms: u64) -> Result<u64> {
    validate_minimum("fetch_timeout_ms", timeout_ms, MIN_FETCH_TIMEOUT_MS)?;
    Ok(timeout_ms)
}

/// Stored shape; any field may be missing in older files.
#[derive(Debug, Default, Deserialize)]
struct StoredSettings {
    #[serde(rename = "hostsFetchCron")]
    cron_expression: Option<String>,
    #[serde(rename = "hostsFilePath")]
    hosts_file_path: Option<PathBuf>,
    #[serde(rename = "hostsFetchTimeout")]
    fetch_timeout_ms: Option<u64>,
}

impl StoredSettings {
    fn merge_over(self, defaults: &Settings) -> Settings {
        Settings {
            cron_expression: self
                .cron_expression
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| defaults.cron_expression.clone()),
            hosts_file_path: self
                .hosts_file_path
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| defaults.hosts_file_path.clone()),
            fetch_timeout_ms: self
                .fetch_timeout_ms
                .unwrap_or(defaults.fetch_timeout_ms),
        }
    }
}

/// Settings store backed by `config.json`.
///
/// Writes (including creating the default file) happen under the
/// `config.json.lock` file lock, so separate processes never drop each
/// other's changes.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    defaults: Settings,
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>, default_hosts_path: PathBuf) -> Self {
        Self {
            path: path.into(),
            defaults: default_settings(default_hosts_path),
            write_lock: Mutex::new(()),
        }
    }

    /// `None` when the file does not exist yet.
    async fn read_stored(&self) -> Result<Option<Settings>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let stored: StoredSettings = serde_json::from_str(&raw)?;
                Ok(Some(stored.merge_over(&self.defaults)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        let data = serde_json::to_string_pretty(settings)?;
        write_atomic(&self.path, data.as_bytes()).await?;
        Ok(())
    }

    /// Writes the defaults unless another writer created the file first.
    async fn initialize(&self) -> Result<Settings> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = FileLock::lock(&lock_path_for(&self.path)).await?;
        if let Some(existing) = self.read_stored().await? {
            return Ok(existing);
        }
        tracing::info!("📝 Creating default settings at {}", self.path.display());
        self.save(&self.defaults).await?;
        Ok(self.defaults.clone())
    }

    async fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Settings) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let _file_lock = FileLock::lock(&lock_path_for(&self.path)).await?;
        let mut current = match self.read_stored().await {
            Ok(Some(settings)) => settings,
            Ok(None) => self.defaults.clone(),
            Err(e) => {
                tracing::warn!(
                    "⚠️ Replacing unreadable {}: {}",
                    self.path.display(),
                    e
                );
                self.defaults.clone()
            }
        };
        f(&mut current);
        self.save(&current).await
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn settings(&self) -> Settings {
        let loaded = match self.read_stored().await {
            Ok(Some(settings)) => Ok(settings),
            Ok(None) => self.initialize().await,
            Err(e) => Err(e),
        };
        match loaded {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(
                    "❌ Failed to read {}, using defaults: {}",
                    self.path.display(),
                    e
                );
                self.defaults.clone()
            }
        }
    }

    async fn set_cron_expression(&self, expression: &str) -> Result<()> {
        let expression = checked_cron_expression(expression)?;
        self.modify(|s| s.cron_expression = expression).await
    }

    async fn set_hosts_file_path(&self, path: &str) -> Result<PathBuf> {
        let resolved = resolve_hosts_path(path, &self.defaults.hosts_file_path)?;
        let stored = resolved.clone();
        self.modify(|s| s.hosts_file_path = stored).await?;
        Ok(resolved)
    }

    async fn set_fetch_timeout_ms(&self, timeout_ms: u64) -> Result<()> {
        let timeout_ms = checked_fetch_timeout(timeout_ms)?;
        self.modify(|s| s.fetch_timeout_ms = timeout_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> JsonSettingsStore {
        JsonSettingsStore::new(
            dir.path().join("config.json"),
            dir.path().join("extra_hosts.conf"),
        )
    }

    #[tokio::test]
    async fn test_first_read_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let settings = store.settings().await;
        assert_eq!(settings.cron_expression, DEFAULT_CRON_EXPRESSION);
        assert_eq!(settings.fetch_timeout_ms, DEFAULT_FETCH_TIMEOUT_MS);
        assert!(dir.path().join("config.json").exists());
    }

    #[tokio::test]
    async fn test_partial_file_merges_over_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"hostsFetchCron": "0 * * * *"}"#,
        )
        .unwrap();

        let settings = store(&dir).settings().await;
        assert_eq!(settings.cron_expression, "0 * * * *");
        assert_eq!(settings.hosts_file_path, dir.path().join("extra_hosts.conf"));
        assert_eq!(settings.fetch_timeout_ms, DEFAULT_FETCH_TIMEOUT_MS);
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{{{").unwrap();

        let settings = store(&dir).settings().await;
        assert_eq!(settings.cron_expression, DEFAULT_CRON_EXPRESSION);
    }

    #[tokio::test]
    async fn test_invalid_cron_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.set_cron_expression("*/10 * * * *").await.unwrap();

        let err = store.set_cron_expression("every five minutes").await.unwrap_err();
        assert!(matches!(err, AutoHostsError::InvalidCronError { .. }));
        assert_eq!(store.settings().await.cron_expression, "*/10 * * * *");
    }

    #[tokio::test]
    async fn test_timeout_floor() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.set_fetch_timeout_ms(999).await.is_err());
        store.set_fetch_timeout_ms(1000).await.unwrap();
        assert_eq!(store.settings().await.fetch_timeout_ms, 1000);
    }

    #[tokio::test]
    async fn test_blank_hosts_path_resets_to_default() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let custom = store.set_hosts_file_path(" /etc/dnsmasq.d/hosts ").await.unwrap();
        assert_eq!(custom, PathBuf::from("/etc/dnsmasq.d/hosts"));

        let reset = store.set_hosts_file_path("   ").await.unwrap();
        assert_eq!(reset, dir.path().join("extra_hosts.conf"));
        assert_eq!(store.settings().await.hosts_file_path, reset);
    }

    #[tokio::test]
    async fn test_relative_hosts_path_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store.set_hosts_file_path("dnsmasq.d/hosts").await.unwrap_err();
        assert!(matches!(err, AutoHostsError::InvalidConfigValueError { .. }));
        assert_eq!(
            store.settings().await.hosts_file_path,
            dir.path().join("extra_hosts.conf")
        );
    }

    #[tokio::test]
    async fn test_modify_waits_for_file_lock() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(store(&dir));
        store.settings().await;

        // 另一個行程握著 config.json.lock
        let held = FileLock::acquire(&lock_path_for(&dir.path().join("config.json"))).unwrap();
        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.set_fetch_timeout_ms(5000).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!writer.is_finished());
        assert_eq!(store.settings().await.fetch_timeout_ms, DEFAULT_FETCH_TIMEOUT_MS);

        drop(held);
        writer.await.unwrap().unwrap();
        assert_eq!(store.settings().await.fetch_timeout_ms, 5000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_keep_both_changes() {
        let dir = TempDir::new().unwrap();
        for round in 0..20u64 {
            let first = store(&dir);
            let second = store(&dir);
            let cron = format!("{} * * * *", round % 60);
            let (a, b) = tokio::join!(
                first.set_cron_expression(&cron),
                second.set_fetch_timeout_ms(2000 + round)
            );
            a.unwrap();
            b.unwrap();

            let settings = store(&dir).settings().await;
            assert_eq!(settings.cron_expression, cron);
            assert_eq!(settings.fetch_timeout_ms, 2000 + round);
        }
    }
}
