//! 扁平文件存储
//!
//! 设备清单与计划定义各自保存在一个 JSON 数组文件中。
//! 读写通过读写锁串行化，写入先落临时文件再原子替换，读者不会看到写了一半的集合。

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{KeeperError, Result};
use crate::models::{DeviceRecord, ScheduleDefinition};

/// 有序集合存储
#[async_trait]
pub trait CollectionStore<T>: Send + Sync {
    /// 读取整个集合；文件不存在或为空时返回空集合，内容损坏时返回 `Data` 错误
    async fn load(&self) -> Result<Vec<T>>;

    /// 整体覆盖保存
    async fn save(&self, items: &[T]) -> Result<()>;
}

pub type DeviceStore = Arc<dyn CollectionStore<DeviceRecord>>;
pub type ScheduleStore = Arc<dyn CollectionStore<ScheduleDefinition>>;

/// 读取集合，出错时记录日志并降级为空集合
pub async fn load_or_empty<T>(store: &dyn CollectionStore<T>, label: &str) -> Vec<T> {
    match store.load().await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("加载{}失败，按空集合处理: {}", label, e);
            Vec::new()
        }
    }
}

/// JSON 文件存储
#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    lock: RwLock<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl<T> CollectionStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self) -> Result<Vec<T>> {
        let _guard = self.lock.read().await;

        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = tokio::fs::read_to_string(&self.path).await?;
        let content = raw.trim_start_matches('\u{feff}').trim();
        if content.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str::<Vec<T>>(content).map_err(|e| {
            KeeperError::data(format!("{} 不是合法的集合: {e}", self.path.display()))
        })
    }

    async fn save(&self, items: &[T]) -> Result<()> {
        let _guard = self.lock.write().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(items)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn device(hostname: &str) -> DeviceRecord {
        DeviceRecord {
            id: format!("id-{hostname}"),
            hostname: hostname.to_string(),
            ip: "10.0.0.1".to_string(),
            username: "admin".to_string(),
            password: "enc".to_string(),
            enable_password: "enc".to_string(),
            device_type: "cisco_ios".to_string(),
            backup_command: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let temp_dir = tempdir().unwrap();
        let store: JsonFileStore<DeviceRecord> =
            JsonFileStore::new(temp_dir.path().join("devices.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_order() {
        let temp_dir = tempdir().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("nested").join("devices.json"));
        store.save(&[device("b"), device("a")]).await.unwrap();

        let loaded: Vec<DeviceRecord> = store.load().await.unwrap();
        let names: Vec<_> = loaded.iter().map(|d| d.hostname.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_malformed_collection_is_data_error_and_degrades() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("devices.json");
        std::fs::write(&path, r#"{"hostname": "not-a-list"}"#).unwrap();

        let store: JsonFileStore<DeviceRecord> = JsonFileStore::new(&path);
        assert!(matches!(store.load().await, Err(KeeperError::Data(_))));
        assert!(load_or_empty(&store, "设备").await.is_empty());
    }

    #[tokio::test]
    async fn test_bom_and_blank_content() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("devices.json");
        std::fs::write(&path, "\u{feff}   \n").unwrap();

        let store: JsonFileStore<DeviceRecord> = JsonFileStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());
    }
}
