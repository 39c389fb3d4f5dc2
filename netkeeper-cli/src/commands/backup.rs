use crate::app::CliApp;
use anyhow::Result;
use netkeeper_core::models::BackupResult;
use tracing::{error, info, warn};

/// 输出单台设备的备份结果，失败时附带错误类别和部分抓取输出
pub fn print_result(result: &BackupResult) {
    if result.success {
        let method = if result.used_fallback() {
            "（回退方式）"
        } else {
            ""
        };
        info!(
            "✅ [{}] {}{}: {}",
            result.hostname,
            result.message,
            method,
            result.filename.as_deref().unwrap_or("-")
        );
        return;
    }

    let kind = result.error_type.map(|k| k.as_str()).unwrap_or("Unknown");
    error!("❌ [{}] {} ({})", result.hostname, result.message, kind);
    if let Some(output) = &result.output {
        warn!("   抓取到的部分输出:");
        for line in output.lines() {
            warn!("   | {}", line);
        }
    }
}

/// 立即备份单台设备
pub async fn run_backup(app: &CliApp, index: usize, json: bool) -> Result<()> {
    let result = app.orchestrator.perform_backup(index, false).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    if !result.success {
        anyhow::bail!("设备 #{} 备份失败", index);
    }
    Ok(())
}

/// 依次备份全部设备
pub async fn run_global_backup(app: &CliApp, json: bool) -> Result<()> {
    let report = app.orchestrator.perform_global_backup(false).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for result in &report.results {
        print_result(result);
    }
    if report.success_count == report.total {
        info!("🎉 {}", report.summary());
    } else {
        warn!("⚠️  {}", report.summary());
    }
    Ok(())
}

/// 列出设备的历史备份（新的在前）
pub async fn list_backups(app: &CliApp, index: usize) -> Result<()> {
    let entries = app.orchestrator.list_backups(index).await?;
    if entries.is_empty() {
        info!("📭 设备 #{} 暂无备份", index);
        return Ok(());
    }

    info!("📋 备份列表（共 {} 个）", entries.len());
    for entry in &entries {
        let created = entry
            .created_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".repeat(19));
        info!("   {}  {:>8} 字节  {}", created, entry.size, entry.path);
    }
    Ok(())
}

/// 输出备份文件内容
pub async fn show_backup(app: &CliApp, path: &str) -> Result<()> {
    let content = app.orchestrator.read_backup_content(path).await?;
    print!("{content}");
    Ok(())
}

pub async fn delete_backup(app: &CliApp, path: &str) -> Result<()> {
    app.orchestrator.delete_backup(path).await?;
    info!("🗑️  已删除备份: {}", path);
    Ok(())
}
