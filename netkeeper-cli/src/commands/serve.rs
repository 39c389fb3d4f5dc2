use crate::app::CliApp;
use crate::project_info::get_version_string;
use anyhow::{Context, Result};
use tracing::info;

/// 启动调度器并常驻运行，收到 Ctrl-C 后停止
pub async fn run_serve(app: &CliApp) -> Result<()> {
    info!("🚀 {}", get_version_string());
    info!("   备份目录: {}", app.config.get_backup_dir().display());

    let restored = app.scheduler.start().await?;
    info!("⏰ 调度器运行中，已加载 {} 个计划任务，按 Ctrl-C 退出", restored);

    tokio::signal::ctrl_c()
        .await
        .context("监听 Ctrl-C 信号失败")?;

    info!("🛑 正在停止调度器...");
    app.scheduler.shutdown().await;
    info!("👋 已退出");
    Ok(())
}
