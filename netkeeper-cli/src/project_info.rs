//! NetKeeper CLI 项目信息
//!
//! netkeeper-cli 是面向用户的主程序，项目元数据统一在这里定义，
//! netkeeper-core 只提供技术性常量。

/// 项目元数据（自动从 Cargo.toml 同步）
pub mod metadata {
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    pub const PROJECT_LICENSE: &str = env!("CARGO_PKG_LICENSE");

    /// 用户友好的显示名称（手动维护）
    pub mod display {
        /// 用户友好的项目名称
        pub const FRIENDLY_NAME: &str = "NetKeeper";

        /// CLI 工具的完整名称
        pub const CLI_FULL_NAME: &str = "NetKeeper CLI";

        /// 项目详细描述
        pub const DESCRIPTION_LONG: &str = "通过 SSH 登录交换机、路由器等网络设备，抓取运行配置并按设备归档保存，支持按日、周、月、年或单次的定时备份";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// 核心库版本
    pub const CORE_VERSION: &str = netkeeper_core::constants::version::CORE_VERSION;
}

/// 启动横幅中使用的版本字符串
pub fn get_version_string() -> String {
    format!(
        "{} v{} (core v{})",
        metadata::display::CLI_FULL_NAME,
        version_info::CLI_VERSION,
        version_info::CORE_VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string() {
        let version = get_version_string();
        assert!(version.starts_with("NetKeeper CLI v"));
        assert!(version.contains(version_info::CORE_VERSION));
        assert_eq!(metadata::PROJECT_NAME, "netkeeper-cli");
    }
}
