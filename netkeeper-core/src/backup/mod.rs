//! 备份编排
//!
//! 每台设备先尝试交互式抓取，失败后换新会话走单命令回退方式，
//! 两个阶段都失败时返回带错误类别的失败结果。任何错误都不会越过
//! [`BackupOrchestrator::perform_backup`] 向上抛出。

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::devices::normalize_devices;
use crate::error::{ErrorKind, KeeperError, Result};
use crate::models::{BackupResult, CaptureMethod, DeviceRecord, GlobalBackupReport};
use crate::scheduler::JobExecutor;
use crate::session::{ConnectParams, DeviceProfile, SessionFactory};
use crate::store::DeviceStore;
use crate::vault::CredentialVault;

mod artifacts;
mod capture;


pub use artifacts::{ArtifactEntry, ArtifactStore};
use capture::{CaptureContext, PhaseOutcome, fallback_capture, interactive_capture};

/// 备份编排器
pub struct BackupOrchestrator {
    devices: DeviceStore,
    vault: Arc<dyn CredentialVault>,
    sessions: Arc<dyn SessionFactory>,
    clock: SharedClock,
    config: Arc<AppConfig>,
    artifacts: ArtifactStore,
    device_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BackupOrchestrator {
    pub fn new(
        devices: DeviceStore,
        vault: Arc<dyn CredentialVault>,
        sessions: Arc<dyn SessionFactory>,
        clock: SharedClock,
        config: Arc<AppConfig>,
    ) -> Self {
        let artifacts = ArtifactStore::new(config.get_backup_dir());
        Self {
            devices,
            vault,
            sessions,
            clock,
            config,
            artifacts,
            device_locks: DashMap::new(),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// 读取设备清单快照
    async fn snapshot(&self) -> Result<Vec<DeviceRecord>> {
        let mut devices = self.devices.load().await?;
        normalize_devices(&mut devices);
        Ok(devices)
    }

    fn snapshot_failure(err: KeeperError) -> BackupResult {
        error!("读取设备清单失败: {}", err);
        BackupResult::failed("", "", err.kind(), format!("读取设备清单失败: {err}"))
    }

    /// 按位置备份单台设备
    pub async fn perform_backup(&self, index: usize, scheduled: bool) -> BackupResult {
        let devices = match self.snapshot().await {
            Ok(devices) => devices,
            Err(e) => return Self::snapshot_failure(e),
        };

        match devices.get(index) {
            Some(device) => self.backup_device(device, scheduled).await,
            None => {
                let err = KeeperError::Index {
                    index,
                    len: devices.len(),
                };
                warn!("{}", err);
                BackupResult::failed("", "", ErrorKind::IndexError, err.to_string())
            }
        }
    }

    /// 按设备标识备份，供计划任务调用
    pub async fn perform_backup_by_id(&self, device_id: &str, scheduled: bool) -> BackupResult {
        let devices = match self.snapshot().await {
            Ok(devices) => devices,
            Err(e) => return Self::snapshot_failure(e),
        };

        match devices.iter().find(|d| d.id == device_id) {
            Some(device) => self.backup_device(device, scheduled).await,
            None => {
                let err = KeeperError::DeviceNotFound(device_id.to_string());
                warn!("{}", err);
                BackupResult::failed("", "", err.kind(), err.to_string())
            }
        }
    }

    /// 依次备份全部设备，单台失败不影响其它设备
    pub async fn perform_global_backup(&self, scheduled: bool) -> GlobalBackupReport {
        let devices = match self.snapshot().await {
            Ok(devices) => devices,
            Err(e) => {
                error!("读取设备清单失败，跳过全量备份: {}", e);
                Vec::new()
            }
        };

        if devices.is_empty() {
            warn!("设备清单为空，没有需要备份的设备");
        }
        info!("开始全量备份，共 {} 台设备", devices.len());
        let mut results = Vec::with_capacity(devices.len());
        for device in &devices {
            results.push(self.backup_device(device, scheduled).await);
        }

        let report = GlobalBackupReport::from_results(results);
        info!("{}", report.summary());
        report
    }

    /// 列出设备的备份文件
    pub async fn list_backups(&self, index: usize) -> Result<Vec<ArtifactEntry>> {
        let devices = self.snapshot().await?;
        let device = devices.get(index).ok_or(KeeperError::Index {
            index,
            len: devices.len(),
        })?;
        self.artifacts.list(&device.hostname).await
    }

    pub async fn read_backup_content(&self, path: &str) -> Result<String> {
        self.artifacts.read(path).await
    }

    pub async fn delete_backup(&self, path: &str) -> Result<()> {
        self.artifacts.delete(path).await
    }

    fn device_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.device_locks
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn backup_device(&self, device: &DeviceRecord, scheduled: bool) -> BackupResult {
        let lock = self.device_lock(&device.id);
        let _guard = lock.lock().await;

        let hostname = device.hostname.as_str();
        let trigger = if scheduled { "定时" } else { "手动" };
        info!("[{}] 开始{}备份 ({})", hostname, trigger, device.ip);

        let credentials = self
            .vault
            .decrypt(&device.password)
            .and_then(|password| Ok((password, self.vault.decrypt(&device.enable_password)?)));
        let (password, secret) = match credentials {
            Ok(pair) => pair,
            Err(e) => {
                error!("[{}] 解密凭据失败: {}", hostname, e);
                return BackupResult::failed(
                    hostname,
                    &device.ip,
                    e.kind(),
                    format!("解密凭据失败: {e}"),
                );
            }
        };

        let profile = DeviceProfile::lookup(&device.device_type);
        let command = device.custom_command().unwrap_or(profile.capture_command);
        let params = ConnectParams::new(
            &device.ip,
            &device.username,
            password,
            secret,
            profile,
            &self.config.session,
        );
        let ctx = CaptureContext {
            hostname,
            command,
            profile,
            clock: &self.clock,
            capture: &self.config.capture,
        };

        let (first_error, first_transcript) =
            match interactive_capture(&*self.sessions, &params, &ctx).await {
                PhaseOutcome::Captured { content } => {
                    match self.persist(hostname, &content, CaptureMethod::Interactive).await {
                        Ok(filename) => {
                            return BackupResult::succeeded(
                                hostname,
                                &device.ip,
                                filename,
                                CaptureMethod::Interactive,
                            );
                        }
                        Err(e) => (e, Some(content)),
                    }
                }
                PhaseOutcome::Failed { error, transcript } => (error, transcript),
            };

        warn!("[{}] 交互式抓取失败，改用回退方式: {}", hostname, first_error);
        match fallback_capture(&*self.sessions, &params, &ctx).await {
            PhaseOutcome::Captured { content } => {
                match self.persist(hostname, &content, CaptureMethod::Fallback).await {
                    Ok(filename) => BackupResult::succeeded(
                        hostname,
                        &device.ip,
                        filename,
                        CaptureMethod::Fallback,
                    ),
                    Err(e) => BackupResult::failed(
                        hostname,
                        &device.ip,
                        ErrorKind::BackupError,
                        format!("保存备份文件失败: {e}"),
                    ),
                }
            }
            PhaseOutcome::Failed { error, transcript } => {
                let kind = match error {
                    KeeperError::Connection(_) => ErrorKind::ConnectionError,
                    KeeperError::Auth(_) => ErrorKind::AuthError,
                    _ => ErrorKind::BackupError,
                };
                let message = format!("所有备份方式均失败: {error}");
                error!("[{}] {}", hostname, message);
                BackupResult::failed(hostname, &device.ip, kind, message).with_output(
                    transcript.or(first_transcript).as_deref(),
                    self.config.capture.output_preview_chars,
                )
            }
        }
    }

    /// 写入备份文件，返回文件名
    async fn persist(&self, hostname: &str, content: &str, method: CaptureMethod) -> Result<String> {
        let at = self.clock.now_local();
        match self.artifacts.write(hostname, content, at).await {
            Ok(filename) => {
                info!("[{}] 备份完成: {} ({:?})", hostname, filename, method);
                Ok(filename)
            }
            Err(e) => {
                error!("[{}] 保存备份文件失败: {}", hostname, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl JobExecutor for BackupOrchestrator {
    async fn run_device(&self, device_id: &str) -> Result<()> {
        let result = self.perform_backup_by_id(device_id, true).await;
        if result.success {
            Ok(())
        } else {
            Err(KeeperError::backup(format!(
                "{} ({}) {}",
                result.hostname, result.ip, result.message
            )))
        }
    }

    async fn run_global(&self) -> Result<()> {
        let report = self.perform_global_backup(true).await;
        if report.success_count < report.total {
            warn!(
                "定时全量备份部分失败: {}/{}",
                report.success_count, report.total
            );
        }
        Ok(())
    }
}
