use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::artifact;
use crate::error::{KeeperError, Result};
use crate::sanitize::safe_file_stem;

/// 备份文件条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactEntry {
    pub filename: String,
    /// 相对备份根目录的路径，使用 `/` 分隔
    pub path: String,
    pub size: u64,
    /// 从文件名解析出的备份时间
    pub created_at: Option<NaiveDateTime>,
}

/// 备份文件仓库
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn device_dir(&self, hostname: &str) -> PathBuf {
        self.root.join(safe_file_stem(hostname))
    }

    pub fn file_name(hostname: &str, at: NaiveDateTime) -> String {
        format!(
            "{}{}{}{}",
            safe_file_stem(hostname),
            artifact::CONFIG_MARKER,
            at.format(artifact::TIMESTAMP_FORMAT),
            artifact::EXTENSION
        )
    }

    fn parse_timestamp(filename: &str) -> Option<NaiveDateTime> {
        let stem = filename.strip_suffix(artifact::EXTENSION)?;
        let (_, stamp) = stem.rsplit_once(artifact::CONFIG_MARKER)?;
        NaiveDateTime::parse_from_str(stamp, artifact::TIMESTAMP_FORMAT).ok()
    }

    /// 写入一份备份，返回文件名；同一秒内的重复备份会覆盖前一份
    pub async fn write(&self, hostname: &str, content: &str, at: NaiveDateTime) -> Result<String> {
        let dir = self.device_dir(hostname);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = Self::file_name(hostname, at);
        tokio::fs::write(dir.join(&filename), content).await?;
        Ok(filename)
    }

    /// 列出设备的全部备份，最新的在前
    pub async fn list(&self, hostname: &str) -> Result<Vec<ArtifactEntry>> {
        let dir = self.device_dir(hostname);
        let root = self.root.clone();

        let mut entries = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            if !dir.is_dir() {
                return entries;
            }

            for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).into_iter().flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                let filename = entry.file_name().to_string_lossy().into_owned();
                if !filename.ends_with(artifact::EXTENSION) || !filename.contains(artifact::CONFIG_MARKER) {
                    continue;
                }

                let relative = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

                entries.push(ArtifactEntry {
                    created_at: ArtifactStore::parse_timestamp(&filename),
                    filename,
                    path: relative,
                    size,
                });
            }
            entries
        })
        .await?;

        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(entries)
    }

    /// 把请求路径解析为备份根目录下的已有文件
    pub async fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let candidate = Path::new(requested);
        if requested.trim().is_empty()
            || candidate
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(KeeperError::InvalidPath(requested.to_string()));
        }

        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|_| KeeperError::NotFound(self.root.display().to_string()))?;
        let resolved = tokio::fs::canonicalize(&joined)
            .await
            .map_err(|_| KeeperError::NotFound(requested.to_string()))?;

        if !resolved.starts_with(&root) || resolved == root {
            tracing::warn!("拒绝访问备份目录之外的路径: {}", requested);
            return Err(KeeperError::InvalidPath(requested.to_string()));
        }
        if !resolved.is_file() {
            return Err(KeeperError::NotFound(requested.to_string()));
        }
        Ok(resolved)
    }

    /// 读取备份内容
    pub async fn read(&self, requested: &str) -> Result<String> {
        let path = self.resolve(requested).await?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 删除备份文件
    pub async fn delete(&self, requested: &str) -> Result<()> {
        let path = self.resolve(requested).await?;
        tokio::fs::remove_file(&path).await?;
        tracing::info!("删除备份文件: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    #[test]
    fn test_file_name_layout() {
        assert_eq!(
            ArtifactStore::file_name("core-sw1", at(9, 5, 7)),
            "core-sw1_config_20260504_090507.txt"
        );
        assert_eq!(
            ArtifactStore::parse_timestamp("core-sw1_config_20260504_090507.txt"),
            Some(at(9, 5, 7))
        );
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let temp_dir = tempdir().unwrap();
        let store = ArtifactStore::new(temp_dir.path());

        store.write("sw1", "old", at(8, 0, 0)).await.unwrap();
        store.write("sw1", "new", at(10, 0, 0)).await.unwrap();
        store.write("sw2", "other", at(11, 0, 0)).await.unwrap();
        std::fs::write(store.device_dir("sw1").join("notes.md"), "x").unwrap();

        let entries = store.list("sw1").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["sw1_config_20260504_100000.txt", "sw1_config_20260504_080000.txt"]
        );
        assert_eq!(entries[0].path, "sw1/sw1_config_20260504_100000.txt");
        assert_eq!(entries[0].size, 3);

        assert!(store.list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_and_delete_inside_root() {
        let temp_dir = tempdir().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("backups"));
        let filename = store.write("sw1", "hostname sw1\n", at(1, 2, 3)).await.unwrap();
        let relative = format!("sw1/{filename}");

        assert_eq!(store.read(&relative).await.unwrap(), "hostname sw1\n");
        store.delete(&relative).await.unwrap();
        assert!(matches!(
            store.read(&relative).await,
            Err(KeeperError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_paths_outside_root_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("backups"));
        store.write("sw1", "x", at(1, 2, 3)).await.unwrap();

        let outside = temp_dir.path().join("secret.txt");
        std::fs::write(&outside, "secret").unwrap();

        assert!(matches!(
            store.read("../secret.txt").await,
            Err(KeeperError::InvalidPath(_))
        ));
        assert!(matches!(
            store.delete(outside.to_str().unwrap()).await,
            Err(KeeperError::InvalidPath(_))
        ));
        assert!(outside.exists());
        assert!(matches!(store.read("").await, Err(KeeperError::InvalidPath(_))));
    }
}
