use crate::constants::{capture, config, logging, session, storage};
use crate::error::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

/// 存储路径配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub devices_file: String,
    pub schedules_file: String,
    pub key_file: String,
    pub backup_dir: String,
}

/// 远程会话配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub session_timeout_secs: u64,
    pub read_poll_millis: u64,
}

/// 配置抓取策略
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CaptureConfig {
    pub poll_interval_secs: u64,
    pub poll_budget_secs: u64,
    pub pagination_delay_secs: u64,
    pub interactive_min_lines: usize,
    pub fallback_min_lines: usize,
    pub fallback_delay_factor: u32,
    pub fallback_max_loops: u32,
    pub output_preview_chars: usize,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                devices_file: path_string(storage::get_devices_file_path()),
                schedules_file: path_string(storage::get_schedules_file_path()),
                key_file: path_string(storage::get_key_file_path()),
                backup_dir: path_string(storage::get_default_backup_dir()),
            },
            session: SessionConfig::default(),
            capture: CaptureConfig::default(),
            logging: LoggingConfig {
                log_dir: path_string(logging::get_log_dir()),
            },
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: session::DEFAULT_PORT,
            connect_timeout_secs: session::CONNECT_TIMEOUT,
            session_timeout_secs: session::SESSION_TIMEOUT,
            read_poll_millis: session::READ_POLL_MILLIS,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: capture::POLL_INTERVAL,
            poll_budget_secs: capture::POLL_BUDGET,
            pagination_delay_secs: capture::PAGINATION_DELAY,
            interactive_min_lines: capture::INTERACTIVE_MIN_LINES,
            fallback_min_lines: capture::FALLBACK_MIN_LINES,
            fallback_delay_factor: capture::FALLBACK_DELAY_FACTOR,
            fallback_max_loops: capture::FALLBACK_MAX_LOOPS,
            output_preview_chars: capture::OUTPUT_PREVIEW_CHARS,
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_budget(&self) -> Duration {
        Duration::from_secs(self.poll_budget_secs)
    }

    pub fn pagination_delay(&self) -> Duration {
        Duration::from_secs(self.pagination_delay_secs)
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_millis)
    }
}

fn path_string(path: PathBuf) -> String {
    path.to_string_lossy().to_string()
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：netkeeper.toml -> .netkeeper.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_SEARCH_NAMES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        // 如果没找到配置文件，创建默认配置
        tracing::warn!("未找到配置文件，创建默认配置: {}", config::CONFIG_FILE_NAME);
        let default_config = Self::default();
        default_config.save_to_file(config::CONFIG_FILE_NAME)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 检查取值是否合理
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.poll_interval_secs == 0 || capture.poll_budget_secs == 0 {
            return Err(KeeperError::validation("capture 轮询间隔与总时长必须大于 0"));
        }
        if capture.fallback_delay_factor == 0 || capture.fallback_max_loops == 0 {
            return Err(KeeperError::validation(
                "capture.fallback_delay_factor 与 fallback_max_loops 必须大于 0",
            ));
        }
        if self.session.read_poll_millis == 0 {
            return Err(KeeperError::validation("session.read_poll_millis 必须大于 0"));
        }
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{devices_file}", &self.storage.devices_file)
            .replace("{schedules_file}", &self.storage.schedules_file)
            .replace("{key_file}", &self.storage.key_file)
            .replace("{backup_dir}", &self.storage.backup_dir)
            .replace("{port}", &self.session.port.to_string())
            .replace(
                "{connect_timeout_secs}",
                &self.session.connect_timeout_secs.to_string(),
            )
            .replace(
                "{session_timeout_secs}",
                &self.session.session_timeout_secs.to_string(),
            )
            .replace("{read_poll_millis}", &self.session.read_poll_millis.to_string())
            .replace(
                "{poll_interval_secs}",
                &self.capture.poll_interval_secs.to_string(),
            )
            .replace("{poll_budget_secs}", &self.capture.poll_budget_secs.to_string())
            .replace(
                "{pagination_delay_secs}",
                &self.capture.pagination_delay_secs.to_string(),
            )
            .replace(
                "{interactive_min_lines}",
                &self.capture.interactive_min_lines.to_string(),
            )
            .replace(
                "{fallback_min_lines}",
                &self.capture.fallback_min_lines.to_string(),
            )
            .replace(
                "{fallback_delay_factor}",
                &self.capture.fallback_delay_factor.to_string(),
            )
            .replace(
                "{fallback_max_loops}",
                &self.capture.fallback_max_loops.to_string(),
            )
            .replace(
                "{output_preview_chars}",
                &self.capture.output_preview_chars.to_string(),
            )
            .replace("{log_dir}", &self.logging.log_dir)
    }

    /// 确保数据目录存在
    pub fn ensure_dirs(&self) -> Result<()> {
        for file in [
            &self.storage.devices_file,
            &self.storage.schedules_file,
            &self.storage.key_file,
        ] {
            if let Some(parent) = Path::new(file).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        fs::create_dir_all(&self.storage.backup_dir)?;
        Ok(())
    }

    /// 获取备份目录路径
    pub fn get_backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.backup_dir)
    }

    /// 获取日志目录路径
    pub fn get_log_dir(&self) -> PathBuf {
        PathBuf::from(&self.logging.log_dir)
    }
}
