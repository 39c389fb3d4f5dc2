use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// 配置抓取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMethod {
    /// 交互式轮询抓取
    Interactive,
    /// 单命令定时等待的回退抓取
    Fallback,
}

/// 单台设备的备份结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupResult {
    pub success: bool,
    pub message: String,
    pub hostname: String,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<CaptureMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    /// 失败时保留的部分输出，便于排查
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl BackupResult {
    pub fn succeeded(
        hostname: impl Into<String>,
        ip: impl Into<String>,
        filename: impl Into<String>,
        method: CaptureMethod,
    ) -> Self {
        let message = match method {
            CaptureMethod::Interactive => "备份完成".to_string(),
            CaptureMethod::Fallback => "备份完成（使用回退方式 fallback method）".to_string(),
        };
        Self {
            success: true,
            message,
            hostname: hostname.into(),
            ip: ip.into(),
            filename: Some(filename.into()),
            method: Some(method),
            error_type: None,
            output: None,
        }
    }

    pub fn failed(
        hostname: impl Into<String>,
        ip: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            hostname: hostname.into(),
            ip: ip.into(),
            filename: None,
            method: None,
            error_type: Some(kind),
            output: None,
        }
    }

    /// 附带截断后的抓取输出
    pub fn with_output(mut self, output: Option<&str>, limit: usize) -> Self {
        self.output = output
            .filter(|text| !text.is_empty())
            .map(|text| truncate_chars(text, limit).to_string());
        self
    }

    pub fn used_fallback(&self) -> bool {
        self.method == Some(CaptureMethod::Fallback)
    }
}

/// 全量备份汇总
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalBackupReport {
    pub results: Vec<BackupResult>,
    pub success_count: usize,
    pub total: usize,
}

impl GlobalBackupReport {
    pub fn from_results(results: Vec<BackupResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let total = results.len();
        Self {
            results,
            success_count,
            total,
        }
    }

    pub fn summary(&self) -> String {
        format!("备份完成，成功: {}/{}", self.success_count, self.total)
    }
}

/// 按字符截断，避免切断多字节字符
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("交换机配置", 2), "交换");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_report_counts_successes() {
        let report = GlobalBackupReport::from_results(vec![
            BackupResult::succeeded("a", "10.0.0.1", "a.txt", CaptureMethod::Interactive),
            BackupResult::failed("b", "10.0.0.2", ErrorKind::BackupError, "failed"),
        ]);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.total, 2);
    }

    #[test]
    fn test_failure_output_is_bounded() {
        let long = "x".repeat(5000);
        let result = BackupResult::failed("sw", "10.0.0.1", ErrorKind::BackupError, "failed")
            .with_output(Some(&long), 1000);
        assert_eq!(result.output.unwrap().len(), 1000);
    }
}
