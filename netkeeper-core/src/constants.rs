/// 存储路径相关常量
pub mod storage {
    use std::path::{Path, PathBuf};

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 设备清单文件名
    pub const DEVICES_FILE_NAME: &str = "devices.json";

    /// 计划任务文件名
    pub const SCHEDULES_FILE_NAME: &str = "schedules.json";

    /// 凭据密钥文件名
    pub const KEY_FILE_NAME: &str = "encryption.key";

    /// 备份目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// 获取默认设备清单路径（跨平台）
    pub fn get_devices_file_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(DEVICES_FILE_NAME)
    }

    /// 获取默认计划任务文件路径（跨平台）
    pub fn get_schedules_file_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(SCHEDULES_FILE_NAME)
    }

    /// 获取默认密钥文件路径（跨平台）
    pub fn get_key_file_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(KEY_FILE_NAME)
    }

    /// 获取默认备份存储目录
    pub fn get_default_backup_dir() -> PathBuf {
        Path::new(".").join(BACKUP_DIR_NAME)
    }
}

/// 备份产物相关常量
pub mod artifact {
    /// 备份文件名中的标记段
    pub const CONFIG_MARKER: &str = "_config_";

    /// 备份文件扩展名
    pub const EXTENSION: &str = ".txt";

    /// 备份文件时间戳格式（秒级精度）
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// 主机名清洗后为空时使用的目录名
    pub const FALLBACK_FOLDER_NAME: &str = "unnamed";
}

/// 远程会话相关常量
pub mod session {
    /// 默认 SSH 端口
    pub const DEFAULT_PORT: u16 = 22;

    /// 建立连接超时时间（秒）
    pub const CONNECT_TIMEOUT: u64 = 150;

    /// 会话空闲超时时间（秒）
    pub const SESSION_TIMEOUT: u64 = 150;

    /// 读取通道时的轮询粒度（毫秒）
    pub const READ_POLL_MILLIS: u64 = 200;

    /// 登录后等待提示符的最长时间（秒）
    pub const PROMPT_WAIT: u64 = 20;

    /// 提权握手等待时间上限（秒）
    pub const ESCALATE_WAIT: u64 = 10;

    /// 等待一次性命令输出时的基础间隔（毫秒），实际间隔乘以 delay_factor
    pub const TIMING_BASE_MILLIS: u64 = 200;

    /// 读到空数据后复读前的收尾间隔（毫秒），同样乘以 delay_factor
    pub const TIMING_FINAL_MILLIS: u64 = 2000;

    /// 分页提示标记
    pub const MORE_MARKER: &str = "--More--";

    /// 默认设备类型
    pub const DEFAULT_DEVICE_TYPE: &str = "cisco_ios";

    /// 默认配置导出命令
    pub const DEFAULT_CAPTURE_COMMAND: &str = "show running-config";

    /// 会话结束时发送的退出命令
    pub const EXIT_COMMAND: &str = "exit";
}

/// 配置抓取相关常量
pub mod capture {
    /// 交互式抓取的轮询间隔（秒）
    pub const POLL_INTERVAL: u64 = 3;

    /// 交互式抓取的总时长上限（秒）
    pub const POLL_BUDGET: u64 = 60;

    /// 取消分页命令之间的等待时间（秒）
    pub const PAGINATION_DELAY: u64 = 2;

    /// 提权后唤醒提示符的等待时间（秒）
    pub const WAKE_DELAY: u64 = 1;

    /// 交互式抓取的最少有效行数
    pub const INTERACTIVE_MIN_LINES: usize = 20;

    /// 回退抓取的最少有效行数
    pub const FALLBACK_MIN_LINES: usize = 10;

    /// 回退抓取的延迟系数
    pub const FALLBACK_DELAY_FACTOR: u32 = 5;

    /// 回退抓取的最大轮询次数
    pub const FALLBACK_MAX_LOOPS: u32 = 3000;

    /// 失败结果中保留的输出字符数
    pub const OUTPUT_PREVIEW_CHARS: usize = 1000;
}

/// 调度相关常量
pub mod schedule {
    /// 计划任务 ID 前缀
    pub const ID_PREFIX: &str = "sch_";

    /// 没有任何触发器时调度循环的最长休眠时间（秒）
    pub const IDLE_WAKE_INTERVAL: u64 = 60;

    /// 时间字段格式
    pub const TIME_FORMAT: &str = "%H:%M";

    /// 日期字段格式
    pub const DATE_FORMAT: &str = "%Y-%m-%d";

    /// 展示用的日期时间格式
    pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// 年度规则向后搜索的最大年数（覆盖闰年 2 月 29 日）
    pub const YEARLY_SEARCH_YEARS: i32 = 8;
}

/// 设备校验相关常量
pub mod validation {
    /// 字段最大长度
    pub const MAX_FIELD_LENGTH: usize = 255;

    /// 主机名单段最大长度
    pub const MAX_LABEL_LENGTH: usize = 63;
}

/// 日志相关常量
pub mod logging {
    use std::path::{Path, PathBuf};

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 日志目录名
    pub const LOG_DIR_NAME: &str = "logs";

    /// 事件日志文件名前缀
    pub const EVENTS_LOG_PREFIX: &str = "events.log";

    /// 获取日志文件保存目录（跨平台）
    pub fn get_log_dir() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(LOG_DIR_NAME)
    }
}

/// 应用配置相关常量
pub mod config {
    /// 配置文件名
    pub const CONFIG_FILE_NAME: &str = "netkeeper.toml";

    /// 按优先级查找的配置文件名
    pub const CONFIG_SEARCH_NAMES: [&str; 2] = ["netkeeper.toml", ".netkeeper.toml"];
}

/// 技术版本信息常量
pub mod version {
    /// 核心库版本（自动同步）
    pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
}
