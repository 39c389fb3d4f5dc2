use clap::Parser;
use netkeeper_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use netkeeper_core::config::AppConfig;
use std::path::PathBuf;
use tracing::error;

/// `serve` 模式下使用配置中的日志目录
fn serve_log_dir(cli: &Cli) -> Option<PathBuf> {
    if !matches!(cli.command, Commands::Serve) {
        return None;
    }
    AppConfig::load_from_file(&cli.config)
        .ok()
        .map(|config| config.get_log_dir())
}

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录，guard 需持有到进程退出
    let _log_guard = setup_logging(cli.verbose, serve_log_dir(&cli));

    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        if let Err(e) = run_init(&cli.config, force).await {
            error!("❌ 初始化失败: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    let app = match CliApp::new_with_auto_config(&cli.config).await {
        Ok(app) => app,
        Err(e) => {
            if !cli.config.exists() {
                error!("❌ 配置文件 '{}' 未找到。", cli.config.display());
                error!("👉 请先运行 'netkeeper init' 命令来创建配置文件。");
            } else {
                error!("❌ 应用初始化失败: {:#}", e);
            }
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run_command(cli.command).await {
        error!("❌ 操作失败: {:#}", e);
        std::process::exit(1);
    }
}
