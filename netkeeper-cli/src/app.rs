use anyhow::{Context, Result};
use netkeeper_core::{
    backup::BackupOrchestrator,
    clock::{SharedClock, SystemClock},
    config::AppConfig,
    constants::config as config_consts,
    devices::DeviceManager,
    models::{DeviceRecord, ScheduleDefinition, ScheduleRequest},
    scheduler::JobScheduler,
    session::SshSessionFactory,
    store::{DeviceStore, JsonFileStore, ScheduleStore},
    vault::FileKeyVault,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cli::{BackupCommand, Commands, DeviceCommand, ScheduleCommand};
use crate::commands;

/// CLI 应用上下文
pub struct CliApp {
    pub config: Arc<AppConfig>,
    pub devices: DeviceManager,
    pub orchestrator: Arc<BackupOrchestrator>,
    pub scheduler: Arc<JobScheduler>,
}

impl CliApp {
    /// 按 `-c` 指定的路径加载配置，使用默认文件名时按优先级自动查找
    pub async fn new_with_auto_config(config_path: &Path) -> Result<Self> {
        let config = if config_path == Path::new(config_consts::CONFIG_FILE_NAME) {
            AppConfig::find_and_load_config()?
        } else {
            AppConfig::load_from_file(config_path)
                .with_context(|| format!("加载配置文件失败: {}", config_path.display()))?
        };
        Self::from_config(config)
    }

    /// 组装存储、密钥、会话工厂、备份编排器和调度器
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.ensure_dirs().context("创建数据目录失败")?;
        let config = Arc::new(config);

        let vault = Arc::new(
            FileKeyVault::open(&config.storage.key_file).context("打开加密密钥失败")?,
        );
        let device_store: DeviceStore = Arc::new(JsonFileStore::<DeviceRecord>::new(
            &config.storage.devices_file,
        ));
        let schedule_store: ScheduleStore = Arc::new(JsonFileStore::<ScheduleDefinition>::new(
            &config.storage.schedules_file,
        ));

        let clock: SharedClock = SystemClock::shared();
        let sessions = Arc::new(SshSessionFactory::new(clock.clone()));

        let orchestrator = Arc::new(BackupOrchestrator::new(
            device_store.clone(),
            vault.clone(),
            sessions,
            clock.clone(),
            config.clone(),
        ));
        let scheduler = Arc::new(
            JobScheduler::new(schedule_store, orchestrator.clone(), clock)
                .with_devices(device_store.clone()),
        );
        let devices = DeviceManager::new(device_store, vault, scheduler.clone());

        Ok(Self {
            config,
            devices,
            orchestrator,
            scheduler,
        })
    }

    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { .. } => unreachable!(), // 已经在 main.rs 中处理
            Commands::Device(cmd) => self.run_device_command(cmd).await,
            Commands::Backup(cmd) => self.run_backup_command(cmd).await,
            Commands::Schedule(cmd) => self.run_schedule_command(cmd).await,
            Commands::Serve => commands::run_serve(self).await,
        }
    }

    async fn run_device_command(&self, cmd: DeviceCommand) -> Result<()> {
        match cmd {
            DeviceCommand::Add(args) => {
                info!("➕ 新增设备: {}", args.hostname);
                commands::add_device(self, args.into()).await
            }
            DeviceCommand::Update { index, device } => {
                info!("✏️  更新设备 #{}", index);
                commands::update_device(self, index, device.into()).await
            }
            DeviceCommand::Delete { index } => {
                info!("🗑️  删除设备 #{}", index);
                commands::delete_device(self, index).await
            }
            DeviceCommand::List { json } => commands::list_devices(self, json).await,
        }
    }

    async fn run_backup_command(&self, cmd: BackupCommand) -> Result<()> {
        match cmd {
            BackupCommand::Run { index, json } => {
                info!("💾 备份设备 #{}", index);
                commands::run_backup(self, index, json).await
            }
            BackupCommand::All { json } => {
                info!("💾 备份全部设备");
                commands::run_global_backup(self, json).await
            }
            BackupCommand::List { index } => commands::list_backups(self, index).await,
            BackupCommand::Show { path } => commands::show_backup(self, &path).await,
            BackupCommand::Delete { path } => commands::delete_backup(self, &path).await,
        }
    }

    async fn run_schedule_command(&self, cmd: ScheduleCommand) -> Result<()> {
        match cmd {
            ScheduleCommand::Add {
                kind,
                time,
                date,
                day_of_week,
                day,
                month,
                device_id,
                disabled,
            } => {
                info!("⏰ 新建计划任务");
                let request = ScheduleRequest {
                    kind,
                    time,
                    date,
                    day_of_week,
                    day,
                    month,
                    device_id,
                    enabled: !disabled,
                };
                commands::add_schedule(self, request).await
            }
            ScheduleCommand::List { json } => commands::list_schedules(self, json).await,
            ScheduleCommand::Enable { id } => commands::toggle_schedule(self, &id, true).await,
            ScheduleCommand::Disable { id } => commands::toggle_schedule(self, &id, false).await,
            ScheduleCommand::Delete { id } => commands::delete_schedule(self, &id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use tempfile::tempdir;

    fn app_in(dir: &Path) -> CliApp {
        let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
        let mut config = AppConfig::default();
        config.storage.devices_file = path("devices.json");
        config.storage.schedules_file = path("schedules.json");
        config.storage.key_file = path("encryption.key");
        config.storage.backup_dir = path("backups");
        CliApp::from_config(config).unwrap()
    }

    async fn run(app: &CliApp, args: &[&str]) {
        let cli = Cli::try_parse_from(std::iter::once("netkeeper").chain(args.iter().copied()))
            .unwrap();
        app.run_command(cli.command).await.unwrap();
    }

    #[tokio::test]
    async fn test_schedule_add_registers_request() {
        let dir = tempdir().unwrap();
        let app = app_in(dir.path());

        run(&app, &["schedule", "add", "--type", "daily", "--time", "02:00"]).await;
        run(
            &app,
            &["schedule", "add", "--type", "monthly", "--time", "03:15", "--day", "1", "--disabled"],
        )
        .await;

        let schedules = app.scheduler.list_schedules().await;
        assert_eq!(schedules.len(), 2);

        assert_eq!(schedules[0].description, "每天 02:00");
        assert!(schedules[0].definition.enabled);
        assert!(schedules[0].next_run.is_some());

        assert_eq!(schedules[1].definition.day, Some(1));
        assert!(!schedules[1].definition.enabled);
        assert!(schedules[1].next_run.is_none());
    }

    #[tokio::test]
    async fn test_schedule_add_for_unknown_device_fails() {
        let dir = tempdir().unwrap();
        let app = app_in(dir.path());

        let cli = Cli::try_parse_from([
            "netkeeper", "schedule", "add", "--type", "daily", "--time", "02:00", "--device-id",
            "missing",
        ])
        .unwrap();
        assert!(app.run_command(cli.command).await.is_err());
        assert!(app.scheduler.list_schedules().await.is_empty());
    }
}
