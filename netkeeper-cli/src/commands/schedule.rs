use crate::app::CliApp;
use anyhow::Result;
use netkeeper_core::models::{ScheduleRequest, ScheduleView};
use tracing::{info, warn};

fn target_label(view: &ScheduleView) -> &str {
    view.definition.device_id.as_deref().unwrap_or("全部设备")
}

/// 新建计划任务
pub async fn add_schedule(app: &CliApp, request: ScheduleRequest) -> Result<()> {
    let id = app.scheduler.register_schedule(request).await?;
    info!("✅ 已创建计划任务: {}", id);

    if let Some(view) = app
        .scheduler
        .list_schedules()
        .await
        .into_iter()
        .find(|v| v.definition.id == id)
    {
        info!("   {} → {}", view.description, target_label(&view));
        match view.next_run {
            Some(next) => info!("   下次执行: {}", next.format("%Y-%m-%d %H:%M")),
            None => warn!("⚠️  该计划不会再触发，已保存为停用状态"),
        }
    }
    info!("💡 计划任务只在 'netkeeper serve' 运行期间触发");
    Ok(())
}

/// 列出计划任务
pub async fn list_schedules(app: &CliApp, json: bool) -> Result<()> {
    let schedules = app.scheduler.list_schedules().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&schedules)?);
        return Ok(());
    }

    if schedules.is_empty() {
        info!("📭 暂无计划任务");
        return Ok(());
    }

    info!("📋 计划任务（共 {} 个）", schedules.len());
    for view in &schedules {
        let state = if view.definition.enabled { "启用" } else { "停用" };
        let next = view
            .next_run
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "   {}  [{}]  {}  → {}  下次: {}",
            view.definition.id,
            state,
            view.description,
            target_label(view),
            next
        );
    }
    Ok(())
}

/// 启用或停用计划任务
pub async fn toggle_schedule(app: &CliApp, id: &str, enabled: bool) -> Result<()> {
    let active = app.scheduler.toggle_schedule(id, enabled).await?;
    match (enabled, active) {
        (true, true) => info!("✅ 已启用计划任务: {}", id),
        (true, false) => warn!("⚠️  计划任务 {} 已过期，无法启用", id),
        (false, _) => info!("⏸️  已停用计划任务: {}", id),
    }
    Ok(())
}

pub async fn delete_schedule(app: &CliApp, id: &str) -> Result<()> {
    app.scheduler.delete_schedule(id).await?;
    info!("🗑️  已删除计划任务: {}", id);
    Ok(())
}
