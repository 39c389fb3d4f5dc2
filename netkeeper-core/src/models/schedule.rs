use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 计划类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Once,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Once => "once",
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
            ScheduleKind::Monthly => "monthly",
            ScheduleKind::Yearly => "yearly",
        }
    }
}

impl std::str::FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(ScheduleKind::Once),
            "daily" => Ok(ScheduleKind::Daily),
            "weekly" => Ok(ScheduleKind::Weekly),
            "monthly" => Ok(ScheduleKind::Monthly),
            "yearly" => Ok(ScheduleKind::Yearly),
            other => Err(format!("未知的计划类型: {other}")),
        }
    }
}

/// 持久化的计划定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    /// 触发时刻，格式 HH:MM
    pub time: String,
    /// once: 触发日期，格式 YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// weekly: 0 = 周日 … 6 = 周六
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,
    /// monthly / yearly: 日期 1-31
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    /// yearly: 月份 1-12
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    /// 目标设备，缺省表示对全部设备执行
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: NaiveDateTime,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleDefinition {
    pub fn is_global(&self) -> bool {
        self.device_id.is_none()
    }
}

/// 新建计划的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub time: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<u8>,
    #[serde(default)]
    pub day: Option<u32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ScheduleRequest {
    /// 构造最简单的请求，其余字段按类型补充
    pub fn new(kind: ScheduleKind, time: impl Into<String>) -> Self {
        Self {
            kind,
            time: time.into(),
            date: None,
            day_of_week: None,
            day: None,
            month: None,
            device_id: None,
            enabled: true,
        }
    }

    pub fn into_definition(self, id: String, created_at: NaiveDateTime) -> ScheduleDefinition {
        ScheduleDefinition {
            id,
            kind: self.kind,
            time: self.time,
            date: self.date,
            day_of_week: self.day_of_week,
            day: self.day,
            month: self.month,
            device_id: self.device_id,
            enabled: self.enabled,
            created_at,
        }
    }
}

/// 列表展示用的计划，`enabled` 反映调度器中是否存在触发器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub definition: ScheduleDefinition,
    pub next_run: Option<NaiveDateTime>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_json_shape() {
        let json = r#"{
            "id": "sch_1",
            "type": "weekly",
            "time": "02:30",
            "day_of_week": 1,
            "created_at": "2026-01-05T10:00:00"
        }"#;

        let definition: ScheduleDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(definition.kind, ScheduleKind::Weekly);
        assert!(definition.enabled);
        assert!(definition.is_global());

        let value = serde_json::to_value(&definition).unwrap();
        assert_eq!(value["type"], "weekly");
        assert!(value.get("date").is_none());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Monthly".parse::<ScheduleKind>().unwrap(), ScheduleKind::Monthly);
        assert!("hourly".parse::<ScheduleKind>().is_err());
    }
}
