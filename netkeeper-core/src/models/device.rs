use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::session;

fn default_device_type() -> String {
    session::DEFAULT_DEVICE_TYPE.to_string()
}

/// 设备记录
///
/// `password` 与 `enable_password` 均为密文。`enable_password` 永不为空，
/// 未单独设置时等于登录密码的密文。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    /// 稳定标识，计划任务通过它引用设备
    #[serde(default)]
    pub id: String,
    pub hostname: String,
    pub ip: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub enable_password: String,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// 自定义配置导出命令
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_command: Option<String>,
}

impl DeviceRecord {
    /// 为缺少标识的旧记录补充 ID，返回是否发生修改
    pub fn ensure_identity(&mut self) -> bool {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
            return true;
        }
        false
    }

    /// 修复空的提权口令，返回是否发生修改
    pub fn repair_enable_secret(&mut self) -> bool {
        if self.enable_password.is_empty() {
            self.enable_password = self.password.clone();
            return true;
        }
        false
    }

    /// 非空的自定义导出命令
    pub fn custom_command(&self) -> Option<&str> {
        self.backup_command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }
}

/// 新增或更新设备时的明文输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInput {
    pub hostname: String,
    pub ip: String,
    pub username: String,
    /// 登录密码明文，更新时为空表示保留原值
    #[serde(default)]
    pub password: Option<String>,
    /// 提权口令明文，为空时沿用登录密码
    #[serde(default)]
    pub enable_password: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub backup_command: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_record_deserializes_with_defaults() {
        let json = r#"{
            "hostname": "core-sw1",
            "ip": "10.0.0.1",
            "username": "admin",
            "password": "enc-pw"
        }"#;

        let mut record: DeviceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.device_type, "cisco_ios");
        assert!(record.backup_command.is_none());

        assert!(record.ensure_identity());
        assert!(!record.ensure_identity());
        assert!(record.repair_enable_secret());
        assert_eq!(record.enable_password, "enc-pw");
    }

    #[test]
    fn test_blank_custom_command_is_ignored() {
        let record = DeviceRecord {
            id: "d1".into(),
            hostname: "edge".into(),
            ip: "10.0.0.2".into(),
            username: "admin".into(),
            password: "p".into(),
            enable_password: "p".into(),
            device_type: "cisco_ios".into(),
            backup_command: Some("   ".into()),
        };
        assert_eq!(record.custom_command(), None);
    }
}
