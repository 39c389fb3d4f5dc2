use crate::app::CliApp;
use anyhow::Result;
use netkeeper_core::models::{DeviceInput, DeviceRecord};
use tracing::info;

fn describe_device(index: usize, device: &DeviceRecord) -> String {
    let command = device.custom_command().unwrap_or("-");
    format!(
        "#{:<3} {:<20} {:<39} {:<16} {:<14} {}",
        index, device.hostname, device.ip, device.username, device.device_type, command
    )
}

/// 新增设备
pub async fn add_device(app: &CliApp, input: DeviceInput) -> Result<()> {
    let record = app.devices.add(input).await?;
    info!("✅ 已添加设备 {} ({})", record.hostname, record.ip);
    info!("   设备 ID: {}", record.id);
    Ok(())
}

/// 更新设备，未提供的密码保持不变
pub async fn update_device(app: &CliApp, index: usize, input: DeviceInput) -> Result<()> {
    let record = app.devices.update(index, input).await?;
    info!("✅ 已更新设备 #{}: {} ({})", index, record.hostname, record.ip);
    Ok(())
}

/// 删除设备，关联的计划任务一并移除
pub async fn delete_device(app: &CliApp, index: usize) -> Result<()> {
    let record = app.devices.delete(index).await?;
    info!("✅ 已删除设备 {} ({})", record.hostname, record.ip);
    Ok(())
}

/// 列出设备，不输出任何密码字段
pub async fn list_devices(app: &CliApp, json: bool) -> Result<()> {
    let devices = app.devices.list().await?;

    if json {
        let view: Vec<serde_json::Value> = devices
            .iter()
            .enumerate()
            .map(|(index, d)| {
                serde_json::json!({
                    "index": index,
                    "id": d.id,
                    "hostname": d.hostname,
                    "ip": d.ip,
                    "username": d.username,
                    "device_type": d.device_type,
                    "backup_command": d.custom_command(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    if devices.is_empty() {
        info!("📭 暂无设备，使用 'netkeeper device add' 添加");
        return Ok(());
    }

    info!("📋 设备列表（共 {} 台）", devices.len());
    for (index, device) in devices.iter().enumerate() {
        info!("{}", describe_device(index, device));
    }
    Ok(())
}
