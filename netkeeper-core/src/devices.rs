use regex::Regex;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::constants::{session, validation};
use crate::error::{KeeperError, Result};
use crate::models::{DeviceInput, DeviceRecord};
use crate::scheduler::JobScheduler;
use crate::store::DeviceStore;
use crate::vault::CredentialVault;

static HOSTNAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-_.]+$").expect("hostname charset regex"));

static HOSTNAME_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$").expect("label regex"));

/// 校验 IP 地址（IPv4 / IPv6）
pub fn validate_ip(ip: &str) -> Result<()> {
    ip.trim()
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| KeeperError::validation(format!("无效的 IP 地址: {ip}")))
}

/// 校验主机名：每段 1-63 个字母、数字或连字符，且不以连字符开头或结尾
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() || hostname.len() > validation::MAX_FIELD_LENGTH {
        return Err(KeeperError::validation("主机名长度必须在 1-255 之间"));
    }
    if !HOSTNAME_CHARS.is_match(hostname) {
        return Err(KeeperError::validation(format!("主机名包含非法字符: {hostname}")));
    }

    let trimmed = hostname.strip_suffix('.').unwrap_or(hostname);
    let valid = trimmed.split('.').all(|label| {
        label.len() <= validation::MAX_LABEL_LENGTH && HOSTNAME_LABEL.is_match(label)
    });
    if !valid {
        return Err(KeeperError::validation(format!("无效的主机名: {hostname}")));
    }
    Ok(())
}

fn validate_input(input: &DeviceInput) -> Result<()> {
    validate_hostname(&input.hostname)?;
    validate_ip(&input.ip)?;
    if input.username.is_empty() || input.username.len() > validation::MAX_FIELD_LENGTH {
        return Err(KeeperError::validation("用户名长度必须在 1-255 之间"));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// 补齐旧记录缺失的标识与提权口令，返回是否发生修改
pub fn normalize_devices(devices: &mut [DeviceRecord]) -> bool {
    let mut changed = false;
    for device in devices.iter_mut() {
        changed |= device.ensure_identity();
        changed |= device.repair_enable_secret();
    }
    changed
}

/// 设备清单管理
pub struct DeviceManager {
    store: DeviceStore,
    vault: Arc<dyn CredentialVault>,
    scheduler: Arc<JobScheduler>,
    write_lock: Mutex<()>,
}

impl DeviceManager {
    pub fn new(
        store: DeviceStore,
        vault: Arc<dyn CredentialVault>,
        scheduler: Arc<JobScheduler>,
    ) -> Self {
        Self {
            store,
            vault,
            scheduler,
            write_lock: Mutex::new(()),
        }
    }

    /// 读取设备清单，必要时为旧记录补齐标识并回写
    pub async fn list(&self) -> Result<Vec<DeviceRecord>> {
        let _guard = self.write_lock.lock().await;
        let mut devices = self.store.load().await?;
        if normalize_devices(&mut devices) {
            info!("为旧设备记录补齐标识或提权口令");
            self.store.save(&devices).await?;
        }
        Ok(devices)
    }

    pub async fn get(&self, index: usize) -> Result<DeviceRecord> {
        let devices = self.list().await?;
        let len = devices.len();
        devices
            .into_iter()
            .nth(index)
            .ok_or(KeeperError::Index { index, len })
    }

    /// 新增设备
    #[instrument(skip(self, input), fields(hostname = %input.hostname))]
    pub async fn add(&self, input: DeviceInput) -> Result<DeviceRecord> {
        validate_input(&input)?;
        let password = non_empty(&input.password)
            .ok_or_else(|| KeeperError::validation("新增设备必须提供登录密码"))?;

        let encrypted_password = self.vault.encrypt(password)?;
        let encrypted_enable = match non_empty(&input.enable_password) {
            Some(enable) => self.vault.encrypt(enable)?,
            None => encrypted_password.clone(),
        };

        let mut record = DeviceRecord {
            id: String::new(),
            hostname: input.hostname.clone(),
            ip: input.ip.trim().to_string(),
            username: input.username.clone(),
            password: encrypted_password,
            enable_password: encrypted_enable,
            device_type: non_empty(&input.device_type)
                .unwrap_or(session::DEFAULT_DEVICE_TYPE)
                .to_string(),
            backup_command: non_empty(&input.backup_command).map(str::to_string),
        };
        record.ensure_identity();

        let _guard = self.write_lock.lock().await;
        let mut devices = self.store.load().await?;
        normalize_devices(&mut devices);
        devices.push(record.clone());
        self.store.save(&devices).await?;

        info!("新增设备: {} ({})", record.hostname, record.ip);
        Ok(record)
    }

    /// 更新设备；未提供的新口令保留原密文，未提供提权口令时沿用登录密码
    #[instrument(skip(self, input), fields(hostname = %input.hostname))]
    pub async fn update(&self, index: usize, input: DeviceInput) -> Result<DeviceRecord> {
        validate_input(&input)?;

        let _guard = self.write_lock.lock().await;
        let mut devices = self.store.load().await?;
        normalize_devices(&mut devices);
        let len = devices.len();
        let existing = devices
            .get_mut(index)
            .ok_or(KeeperError::Index { index, len })?;

        let old_hostname = existing.hostname.clone();
        let password = match non_empty(&input.password) {
            Some(plain) => self.vault.encrypt(plain)?,
            None => existing.password.clone(),
        };
        let enable_password = match non_empty(&input.enable_password) {
            Some(plain) => self.vault.encrypt(plain)?,
            None => password.clone(),
        };

        existing.hostname = input.hostname.clone();
        existing.ip = input.ip.trim().to_string();
        existing.username = input.username.clone();
        existing.password = password;
        existing.enable_password = enable_password;
        if let Some(device_type) = non_empty(&input.device_type) {
            existing.device_type = device_type.to_string();
        }
        if let Some(command) = &input.backup_command {
            existing.backup_command = Some(command.trim().to_string()).filter(|c| !c.is_empty());
        }

        let updated = existing.clone();
        self.store.save(&devices).await?;

        info!(
            "更新设备: {} -> {} ({})",
            old_hostname, updated.hostname, updated.ip
        );
        Ok(updated)
    }

    /// 删除设备，并清除所有指向该设备的计划任务
    #[instrument(skip(self))]
    pub async fn delete(&self, index: usize) -> Result<DeviceRecord> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let mut devices = self.store.load().await?;
            normalize_devices(&mut devices);
            if index >= devices.len() {
                return Err(KeeperError::Index {
                    index,
                    len: devices.len(),
                });
            }
            let removed = devices.remove(index);
            self.store.save(&devices).await?;
            removed
        };

        match self.scheduler.purge_device(&removed.id).await {
            Ok(count) if count > 0 => info!("已清除设备 {} 的 {} 个计划任务", removed.hostname, count),
            Ok(_) => {}
            Err(e) => warn!("清除设备 {} 的计划任务失败: {}", removed.hostname, e),
        }

        info!("删除设备: {} ({})", removed.hostname, removed.ip);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{ScheduleKind, ScheduleRequest};
    use crate::scheduler::JobExecutor;
    use crate::store::JsonFileStore;
    use crate::vault::FileKeyVault;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::{TempDir, tempdir};

    struct NoopExecutor;

    #[async_trait]
    impl JobExecutor for NoopExecutor {
        async fn run_device(&self, _device_id: &str) -> Result<()> {
            Ok(())
        }

        async fn run_global(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        vault: Arc<FileKeyVault>,
        scheduler: Arc<JobScheduler>,
        manager: DeviceManager,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let vault = Arc::new(FileKeyVault::open(dir.path().join("encryption.key")).unwrap());
        let store: DeviceStore = Arc::new(JsonFileStore::new(dir.path().join("devices.json")));
        let schedules = Arc::new(JsonFileStore::new(dir.path().join("schedules.json")));
        let clock = Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        ));
        let scheduler = Arc::new(JobScheduler::new(schedules, Arc::new(NoopExecutor), clock));
        let manager = DeviceManager::new(store, vault.clone(), scheduler.clone());
        Fixture {
            _dir: dir,
            vault,
            scheduler,
            manager,
        }
    }

    fn input(hostname: &str, password: Option<&str>) -> DeviceInput {
        DeviceInput {
            hostname: hostname.to_string(),
            ip: "192.168.1.10".to_string(),
            username: "admin".to_string(),
            password: password.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_hostname_validation() {
        assert!(validate_hostname("core-sw1.example.local").is_ok());
        assert!(validate_hostname("edge01.").is_ok());
        assert!(validate_hostname("-bad").is_err());
        assert!(validate_hostname("bad-").is_err());
        assert!(validate_hostname("has space").is_err());
        assert!(validate_hostname(&"a".repeat(64)).is_err());
        assert!(validate_hostname("").is_err());
    }

    #[test]
    fn test_ip_validation() {
        assert!(validate_ip("10.1.2.3").is_ok());
        assert!(validate_ip("fe80::1").is_ok());
        assert!(validate_ip("10.1.2.300").is_err());
        assert!(validate_ip("switch").is_err());
    }

    #[tokio::test]
    async fn test_add_without_enable_secret_uses_password() {
        let f = fixture();
        let record = f.manager.add(input("sw1", Some("cisco"))).await.unwrap();

        assert!(!record.id.is_empty());
        assert_eq!(record.device_type, "cisco_ios");
        assert_eq!(f.vault.decrypt(&record.enable_password).unwrap().expose(), "cisco");
        assert_eq!(f.vault.decrypt(&record.password).unwrap().expose(), "cisco");
    }

    #[tokio::test]
    async fn test_add_requires_password() {
        let f = fixture();
        let err = f.manager.add(input("sw1", None)).await.unwrap_err();
        assert!(matches!(err, KeeperError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_password_and_resets_enable_secret() {
        let f = fixture();
        let mut first = input("sw1", Some("login"));
        first.enable_password = Some("enable".into());
        first.backup_command = Some("show startup-config".into());
        let original = f.manager.add(first).await.unwrap();
        assert_eq!(f.vault.decrypt(&original.enable_password).unwrap().expose(), "enable");

        let updated = f.manager.update(0, input("sw1-renamed", None)).await.unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.hostname, "sw1-renamed");
        assert_eq!(updated.password, original.password);
        assert_eq!(f.vault.decrypt(&updated.enable_password).unwrap().expose(), "login");
        assert_eq!(updated.custom_command(), Some("show startup-config"));
    }

    #[tokio::test]
    async fn test_update_out_of_range() {
        let f = fixture();
        let err = f.manager.update(3, input("sw1", Some("x"))).await.unwrap_err();
        assert!(matches!(err, KeeperError::Index { index: 3, len: 0 }));
    }

    #[tokio::test]
    async fn test_delete_purges_only_that_devices_schedules() {
        let f = fixture();
        let first = f.manager.add(input("sw1", Some("a"))).await.unwrap();
        let second = f.manager.add(input("sw2", Some("b"))).await.unwrap();

        let mut to_first = ScheduleRequest::new(ScheduleKind::Daily, "02:00");
        to_first.device_id = Some(first.id.clone());
        let mut to_second = ScheduleRequest::new(ScheduleKind::Daily, "03:00");
        to_second.device_id = Some(second.id.clone());
        let global = ScheduleRequest::new(ScheduleKind::Daily, "04:00");

        f.scheduler.register_schedule(to_first).await.unwrap();
        let second_id = f.scheduler.register_schedule(to_second).await.unwrap();
        let global_id = f.scheduler.register_schedule(global).await.unwrap();

        f.manager.delete(0).await.unwrap();

        let remaining: Vec<_> = f
            .scheduler
            .list_schedules()
            .await
            .into_iter()
            .map(|view| view.definition)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|d| d.id == second_id && d.device_id == Some(second.id.clone())));
        assert!(remaining.iter().any(|d| d.id == global_id));

        let devices = f.manager.list().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, second.id);
    }
}
