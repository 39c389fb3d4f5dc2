use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use netkeeper_core::constants::logging;

/// 设置日志目录的环境变量
pub const LOG_DIR_ENV: &str = "NETKEEPER_LOG_DIR";

/// 初始化日志
///
/// - `-v, --verbose`：DEBUG 级别，否则 INFO；`RUST_LOG` 优先
/// - 终端输出为紧凑格式，不显示模块路径
/// - 设置了 `NETKEEPER_LOG_DIR`（或传入 `log_dir`）时，额外写入按天滚动的
///   `events.log`，文件中包含模块路径、线程名和行号
///
/// 返回的 [`WorkerGuard`] 必须在 `main` 中持有，否则文件日志会丢失。
pub fn setup_logging(verbose: bool, log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let terminal = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .without_time()
        .compact();

    let log_dir = std::env::var_os(LOG_DIR_ENV).map(PathBuf::from).or(log_dir);
    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(terminal)
            .init();
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("无法创建日志目录 {}: {}", dir.display(), e);
    }
    let appender = tracing_appender::rolling::daily(&dir, logging::EVENTS_LOG_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(terminal)
        .with(file)
        .init();
    Some(guard)
}
