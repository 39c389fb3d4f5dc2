//! 输出清洗与完整性校验
//!
//! 交互式抓取得到的是整段会话记录，其中夹杂命令回显与分页标记。
//! 这里只剔除这些会话痕迹，其余内容逐字节保留。

use regex::Regex;
use std::sync::LazyLock;

use crate::constants::artifact;
use crate::error::{KeeperError, Result};
use crate::session::DeviceProfile;

static MORE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" ?--More-- ?(?:\x08+ *\x08*)?").expect("more marker regex")
});

/// 命令回显过滤器
#[derive(Debug, Clone)]
pub struct EchoFilter {
    commands: Vec<String>,
    terminators: Vec<char>,
}

impl EchoFilter {
    pub fn new(capture_command: &str, profile: &DeviceProfile) -> Self {
        Self {
            commands: profile
                .echo_commands(capture_command)
                .into_iter()
                .map(str::to_string)
                .collect(),
            terminators: profile.prompt_terminators.to_vec(),
        }
    }

    /// 多词命令按前缀匹配，单词命令要求整行相等，避免误删 `enable secret` 之类的配置行
    fn matches_command(&self, text: &str) -> bool {
        let text = text.trim_end();
        self.commands.iter().any(|cmd| {
            if cmd.contains(char::is_whitespace) {
                text.starts_with(cmd.as_str())
            } else {
                text == cmd
            }
        })
    }

    /// 行首直接是命令，或紧跟在 `host#` / `host>` 提示符之后
    pub fn is_echo(&self, line: &str) -> bool {
        let content = line.trim_end_matches(['\r', '\n']);
        if self.matches_command(content) {
            return true;
        }

        for terminator in &self.terminators {
            if let Some(pos) = content.find(*terminator) {
                let head = &content[..pos];
                if head.is_empty() || head.contains(char::is_whitespace) {
                    continue;
                }
                let rest = content[pos + terminator.len_utf8()..].trim_start();
                if !rest.is_empty() && self.matches_command(rest) {
                    return true;
                }
            }
        }
        false
    }

    /// 剔除回显行，保留其它行的原始字节（包括行尾）
    pub fn apply(&self, transcript: &str) -> String {
        transcript
            .split_inclusive('\n')
            .filter(|line| !self.is_echo(line))
            .collect()
    }
}

/// 去掉分页提示及其退格序列
pub fn strip_more_markers(text: &str) -> String {
    if !text.contains(crate::constants::session::MORE_MARKER) {
        return text.to_string();
    }
    MORE_MARKER.replace_all(text, "").into_owned()
}

/// 交互式会话记录的完整清洗
pub fn clean_transcript(transcript: &str, filter: &EchoFilter) -> String {
    filter.apply(&strip_more_markers(transcript))
}

/// 单命令输出的清洗：去掉分页标记、首行命令回显和末尾提示符
pub fn strip_command_output(output: &str, command: &str, profile: &DeviceProfile) -> String {
    let text = strip_more_markers(output);
    let mut lines: Vec<&str> = text.split_inclusive('\n').collect();

    let command = command.trim();
    if let Some(first) = lines.iter().position(|line| !line.trim().is_empty()) {
        if !command.is_empty() && lines[first].trim_end().ends_with(command) {
            lines.drain(..=first);
        }
    }

    if let Some(last) = lines.iter().rposition(|line| !line.trim().is_empty()) {
        let candidate = lines[last].trim();
        if profile.ends_with_prompt(candidate) && !candidate.contains(char::is_whitespace) {
            lines.truncate(last);
        }
    }
    lines.concat()
}

/// 非空行数
pub fn count_content_lines(text: &str) -> usize {
    text.lines().filter(|line| !line.trim().is_empty()).count()
}

/// 行数达到阈值才视为完整的配置
pub fn ensure_min_lines(text: &str, required: usize) -> Result<usize> {
    let lines = count_content_lines(text);
    if lines < required {
        return Err(KeeperError::IncompleteOutput { lines, required });
    }
    Ok(lines)
}

/// 判断轮询是否可以结束：最后一个非空行是提示符，或出现独立的 `end` 行
pub fn is_capture_complete(accumulated: &str, profile: &DeviceProfile) -> bool {
    let mut last_line = None;
    for line in accumulated.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "end" {
            return true;
        }
        last_line = Some(line);
    }
    last_line.is_some_and(|line| profile.ends_with_prompt(line))
}

/// 将主机名转换为安全的目录 / 文件名片段
pub fn safe_file_stem(hostname: &str) -> String {
    let mut stem = String::with_capacity(hostname.len());
    for ch in hostname.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.' | '_') {
            stem.push(ch);
        } else if ch.is_whitespace() || matches!(ch, '/' | '\\') {
            if !stem.ends_with('_') {
                stem.push('_');
            }
        }
    }

    let stem = stem.trim_matches(['.', '_']);
    if stem.is_empty() {
        artifact::FALLBACK_FOLDER_NAME.to_string()
    } else {
        stem.to_string()
    }
}
