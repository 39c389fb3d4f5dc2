use crate::project_info::{metadata, version_info};
use clap::{Args, Parser, Subcommand};
use netkeeper_core::models::{DeviceInput, ScheduleKind};
use std::path::PathBuf;

/// 设备录入参数
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// 主机名
    #[arg(long)]
    pub hostname: String,
    /// 管理地址（IPv4 或 IPv6）
    #[arg(long)]
    pub ip: String,
    /// SSH 用户名
    #[arg(long)]
    pub username: String,
    /// 登录密码，更新时省略表示保留原密码
    #[arg(long, env = "NETKEEPER_DEVICE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// 提权口令，省略时沿用登录密码
    #[arg(long, env = "NETKEEPER_ENABLE_PASSWORD", hide_env_values = true)]
    pub enable_password: Option<String>,
    /// 设备类型，例如 cisco_ios、arista_eos
    #[arg(long)]
    pub device_type: Option<String>,
    /// 自定义配置导出命令
    #[arg(long)]
    pub backup_command: Option<String>,
}

impl From<DeviceArgs> for DeviceInput {
    fn from(args: DeviceArgs) -> Self {
        DeviceInput {
            hostname: args.hostname,
            ip: args.ip,
            username: args.username,
            password: args.password,
            enable_password: args.enable_password,
            device_type: args.device_type,
            backup_command: args.backup_command,
        }
    }
}

/// 设备管理命令
#[derive(Subcommand, Debug)]
pub enum DeviceCommand {
    /// 新增设备
    Add(DeviceArgs),
    /// 更新指定位置的设备
    Update {
        /// 设备序号（从 0 开始）
        index: usize,
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// 删除设备及其计划任务
    Delete {
        /// 设备序号（从 0 开始）
        index: usize,
    },
    /// 列出全部设备
    List {
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
}

/// 配置备份命令
#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// 立即备份单台设备
    Run {
        /// 设备序号（从 0 开始）
        index: usize,
        /// 以 JSON 输出结果
        #[arg(long)]
        json: bool,
    },
    /// 依次备份全部设备
    All {
        /// 以 JSON 输出结果
        #[arg(long)]
        json: bool,
    },
    /// 列出设备的历史备份
    List {
        /// 设备序号（从 0 开始）
        index: usize,
    },
    /// 显示备份文件内容
    Show {
        /// 相对备份目录的路径，例如 switch/switch_config_20260601_020008.txt
        path: String,
    },
    /// 删除备份文件
    Delete {
        /// 相对备份目录的路径
        path: String,
    },
}

/// 计划任务命令
#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    /// 新建计划任务
    Add {
        /// 计划类型: once、daily、weekly、monthly、yearly
        #[arg(long = "type", value_name = "TYPE")]
        kind: ScheduleKind,
        /// 触发时刻，格式 HH:MM
        #[arg(long)]
        time: String,
        /// once: 触发日期，格式 YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// weekly: 星期几，0 为周日
        #[arg(long)]
        day_of_week: Option<u8>,
        /// monthly / yearly: 日期
        #[arg(long)]
        day: Option<u32>,
        /// yearly: 月份
        #[arg(long)]
        month: Option<u32>,
        /// 目标设备 ID，省略表示备份全部设备
        #[arg(long)]
        device_id: Option<String>,
        /// 创建后暂不启用
        #[arg(long)]
        disabled: bool,
    },
    /// 列出计划任务
    List {
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 启用计划任务
    Enable {
        /// 计划 ID
        id: String,
    },
    /// 停用计划任务
    Disable {
        /// 计划 ID
        id: String,
    },
    /// 删除计划任务
    Delete {
        /// 计划 ID
        id: String,
    },
}

/// NetKeeper CLI - 网络设备配置备份与定时任务工具
#[derive(Parser, Debug)]
#[command(name = "netkeeper")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = netkeeper_core::constants::config::CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 首次使用时初始化，创建配置文件、数据目录和加密密钥
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 设备管理
    #[command(subcommand)]
    Device(DeviceCommand),
    /// 配置备份
    #[command(subcommand)]
    Backup(BackupCommand),
    /// 计划任务管理
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// 启动调度器并常驻运行，Ctrl-C 退出
    Serve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_run() {
        let cli = Cli::try_parse_from(["netkeeper", "-v", "backup", "run", "2"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("netkeeper.toml"));
        assert!(matches!(
            cli.command,
            Commands::Backup(BackupCommand::Run { index: 2, json: false })
        ));
    }

    #[test]
    fn test_parse_schedule_add_weekly() {
        let cli = Cli::try_parse_from([
            "netkeeper",
            "schedule",
            "add",
            "--type",
            "weekly",
            "--time",
            "03:30",
            "--day-of-week",
            "0",
            "--device-id",
            "dev-1",
        ])
        .unwrap();

        let Commands::Schedule(ScheduleCommand::Add {
            kind,
            day_of_week,
            device_id,
            disabled,
            ..
        }) = cli.command
        else {
            panic!("expected schedule add");
        };
        assert_eq!(kind, ScheduleKind::Weekly);
        assert_eq!(day_of_week, Some(0));
        assert_eq!(device_id.as_deref(), Some("dev-1"));
        assert!(!disabled);
    }

    #[test]
    fn test_parse_device_update_keeps_password_optional() {
        let cli = Cli::try_parse_from([
            "netkeeper",
            "device",
            "update",
            "1",
            "--hostname",
            "core-sw",
            "--ip",
            "10.0.0.2",
            "--username",
            "admin",
        ])
        .unwrap();

        let Commands::Device(DeviceCommand::Update { index, device }) = cli.command else {
            panic!("expected device update");
        };
        assert_eq!(index, 1);
        let input = DeviceInput::from(device);
        assert_eq!(input.hostname, "core-sw");
    }

    #[test]
    fn test_unknown_schedule_type_is_rejected() {
        let result = Cli::try_parse_from([
            "netkeeper", "schedule", "add", "--type", "hourly", "--time", "01:00",
        ]);
        assert!(result.is_err());
    }
}
