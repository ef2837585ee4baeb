use crate::domain::model::{Source, SourceUpdate};
use crate::domain::ports::SourceRegistry;
use crate::domain::registry;
use crate::utils::error::Result;
use crate::utils::fs::{lock_path_for, write_atomic, FileLock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Source registry backed by a pretty-printed JSON array file.
#[derive(Debug)]
pub struct JsonSourceRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSourceRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<Source>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, sources: &[Source]) -> Result<()> {
        let data = serde_json::to_string_pretty(sources)?;
        write_atomic(&self.path, data.as_bytes()).await?;
        Ok(())
    }

    /// Read-modify-write under the in-process lock and the `urls.json.lock`
    /// file lock, so a CLI edit and a running pass never lose each other's
    /// update. A corrupt file aborts the mutation instead of being overwritten.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut Vec<Source>) -> Result<T> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let _file_lock = FileLock::lock(&lock_path_for(&self.path)).await?;
        let mut sources = self.load().await?;
        let out = f(&mut sources)?;
        self.save(&sources).await?;
        Ok(out)
    }
}

#[async_trait]
impl SourceRegistry for JsonSourceRegistry {
    async fn list_all(&self) -> Vec<Source> {
        match self.load().await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!("❌ Error reading URLs file {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    async fn add(&self, url: &str, name: Option<&str>) -> Result<Source> {
        let source = self.mutate(|sources| registry::add(sources, url, name)).await?;
        tracing::info!("➕ Added URL: {}", source.url);
        Ok(source)
    }

    async fn update(&self, id: &str, update: SourceUpdate) -> Result<Source> {
        let source = self
            .mutate(|sources| registry::update(sources, id, update))
            .await?;
        tracing::info!("✏️ Updated URL: {}", id);
        Ok(source)
    }

    async fn remove(&self, id: &str) -> Result<Source> {
        let source = self.mutate(|sources| registry::remove(sources, id)).await?;
        tracing::info!("🗑️ Deleted URL: {}", source.url);
        Ok(source)
    }

    async fn toggle(&self, id: &str) -> Result<Source> {
        let source = self.mutate(|sources| registry::toggle(sources, id)).await?;
        let state = if source.enabled { "enabled" } else { "disabled" };
        tracing::info!("🔀 URL {}: {}", state, source.url);
        Ok(source)
    }

    async fn record_success(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|sources| registry::record_success(sources, id, at))
            .await
    }

    async fn record_error(&self, id: &str, message: &str) -> Result<()> {
        self.mutate(|sources| registry::record_error(sources, id, message))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::AutoHostsError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty_registry() {
        let dir = TempDir::new().unwrap();
        let registry = JsonSourceRegistry::new(dir.path().join("urls.json"));
        assert!(registry.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_changes_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.json");

        let registry = JsonSourceRegistry::new(&path);
        let a = registry.add("https://a.example/hosts", Some("A")).await.unwrap();
        registry.add("https://b.example/hosts", None).await.unwrap();
        registry.toggle(&a.id).await.unwrap();

        let reopened = JsonSourceRegistry::new(&path);
        let all = reopened.list_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name.as_deref(), Some("A"));
        assert!(!all[0].enabled);

        let enabled = reopened.list_enabled().await;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].url, "https://b.example/hosts");
    }

    #[tokio::test]
    async fn test_duplicate_add_does_not_touch_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.json");
        let registry = JsonSourceRegistry::new(&path);
        registry.add("https://a.example/hosts", None).await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = registry.add("https://a.example/hosts", None).await.unwrap_err();
        assert!(matches!(err, AutoHostsError::DuplicateUrlError { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.json");
        std::fs::write(&path, "{ not json").unwrap();

        let registry = JsonSourceRegistry::new(&path);
        assert!(registry.list_all().await.is_empty());
        assert!(registry.add("https://a.example/hosts", None).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_on_one_file_keep_every_add() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.json");
        // 兩個 handle 互不共用 Mutex，等同兩個行程
        let first = std::sync::Arc::new(JsonSourceRegistry::new(&path));
        let second = std::sync::Arc::new(JsonSourceRegistry::new(&path));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let registry = if i % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                registry
                    .add(&format!("https://lists.example/{}.txt", i), None)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(JsonSourceRegistry::new(&path).list_all().await.len(), 20);
    }
}
