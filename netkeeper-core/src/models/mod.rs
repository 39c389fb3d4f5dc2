// 数据模型
//
// - DeviceRecord: 设备描述（凭据以密文保存）
// - ScheduleDefinition: 持久化的定时备份规则
// - BackupResult / GlobalBackupReport: 一次备份调用的结果，仅返回与记录日志，不落盘

mod device;
mod result;
mod schedule;

pub use device::{DeviceInput, DeviceRecord};
pub use result::{BackupResult, CaptureMethod, GlobalBackupReport, truncate_chars};
pub use schedule::{ScheduleDefinition, ScheduleKind, ScheduleRequest, ScheduleView};
