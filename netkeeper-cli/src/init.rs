use anyhow::{Context, Result};
use netkeeper_core::{config::AppConfig, vault::FileKeyVault};
use std::path::Path;
use tracing::{info, warn};

use crate::project_info::metadata::display;

/// 运行独立的初始化流程：写入配置文件、创建数据目录并生成加密密钥
pub async fn run_init(config_path: &Path, force: bool) -> Result<()> {
    info!("🛰️  {} 初始化", display::FRIENDLY_NAME);
    info!("======================");

    if !force && config_path.exists() {
        warn!("⚠️  检测到已存在的配置文件: {}", config_path.display());
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: netkeeper init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件");
    let config = AppConfig::default();
    config
        .save_to_file(config_path)
        .with_context(|| format!("写入配置文件失败: {}", config_path.display()))?;
    info!("   ✅ 创建配置文件: {}", config_path.display());

    info!("📋 步骤 2: 创建数据目录");
    config.ensure_dirs().context("创建数据目录失败")?;
    info!("   ✅ 创建目录结构:");
    info!("      - {}    (备份存储目录)", config.storage.backup_dir);
    info!("      - {}    (设备清单)", config.storage.devices_file);
    info!("      - {}    (计划任务)", config.storage.schedules_file);

    info!("📋 步骤 3: 准备加密密钥");
    let vault = FileKeyVault::open(&config.storage.key_file).context("生成加密密钥失败")?;
    info!("   ✅ 密钥文件: {}", vault.key_path().display());
    info!("   ⚠️  请妥善保管密钥文件，丢失后已保存的设备密码将无法解密");

    info!("🎉 初始化完成！");
    info!("👉 下一步: netkeeper device add --hostname <名称> --ip <地址> --username <用户>");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_does_not_overwrite_without_force() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("netkeeper.toml");
        std::fs::write(&path, "# 用户已有配置\n").unwrap();

        run_init(&path, false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# 用户已有配置\n");
    }
}
