use crate::constants::session::DEFAULT_CAPTURE_COMMAND;

/// 设备类型的命令行约定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: &'static str,
    /// 导出完整配置前是否需要提权
    pub requires_enable: bool,
    pub enable_command: &'static str,
    /// 关闭分页的命令，按顺序发送
    pub pagination_commands: &'static [&'static str],
    pub capture_command: &'static str,
    /// 提示符结尾字符，第一个为特权模式提示符
    pub prompt_terminators: &'static [char],
    pub logout_command: &'static str,
}

const CISCO_PAGINATION: &[&str] = &["terminal length 0", "terminal width 512"];

static PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        name: "cisco_ios",
        requires_enable: true,
        enable_command: "enable",
        pagination_commands: CISCO_PAGINATION,
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#', '>'],
        logout_command: "exit",
    },
    DeviceProfile {
        name: "cisco_xe",
        requires_enable: true,
        enable_command: "enable",
        pagination_commands: CISCO_PAGINATION,
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#', '>'],
        logout_command: "exit",
    },
    DeviceProfile {
        name: "cisco_nxos",
        requires_enable: false,
        enable_command: "enable",
        pagination_commands: &["terminal length 0", "terminal width 511"],
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#'],
        logout_command: "exit",
    },
    DeviceProfile {
        name: "cisco_asa",
        requires_enable: true,
        enable_command: "enable",
        pagination_commands: &["terminal pager 0"],
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#', '>'],
        logout_command: "exit",
    },
    DeviceProfile {
        name: "arista_eos",
        requires_enable: true,
        enable_command: "enable",
        pagination_commands: &["terminal length 0", "terminal width 32767"],
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#', '>'],
        logout_command: "exit",
    },
    DeviceProfile {
        name: "hp_procurve",
        requires_enable: true,
        enable_command: "enable",
        pagination_commands: &["no page"],
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#', '>'],
        logout_command: "logout",
    },
    DeviceProfile {
        name: "aruba_os",
        requires_enable: true,
        enable_command: "enable",
        pagination_commands: &["no paging"],
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#', '>'],
        logout_command: "exit",
    },
    DeviceProfile {
        name: "juniper_junos",
        requires_enable: false,
        enable_command: "",
        pagination_commands: &["set cli screen-length 0", "set cli screen-width 511"],
        capture_command: "show configuration | display set",
        prompt_terminators: &['>', '#', '%'],
        logout_command: "exit",
    },
    DeviceProfile {
        name: "generic",
        requires_enable: false,
        enable_command: "enable",
        pagination_commands: CISCO_PAGINATION,
        capture_command: DEFAULT_CAPTURE_COMMAND,
        prompt_terminators: &['#', '>', '$'],
        logout_command: "exit",
    },
];

impl DeviceProfile {
    /// 按设备类型查找，未知类型回退到 generic
    pub fn lookup(device_type: &str) -> &'static DeviceProfile {
        let wanted = device_type.trim().to_ascii_lowercase();
        match PROFILES.iter().find(|p| p.name == wanted) {
            Some(profile) => profile,
            None => {
                tracing::warn!("未知的设备类型 {}，按 generic 处理", device_type);
                Self::generic()
            }
        }
    }

    pub fn generic() -> &'static DeviceProfile {
        &PROFILES[PROFILES.len() - 1]
    }

    pub fn known_types() -> impl Iterator<Item = &'static str> {
        PROFILES.iter().map(|p| p.name)
    }

    /// 特权模式提示符结尾字符
    pub fn privileged_terminator(&self) -> char {
        self.prompt_terminators.first().copied().unwrap_or('#')
    }

    /// 判断一行是否以提示符结尾
    pub fn ends_with_prompt(&self, line: &str) -> bool {
        let line = line.trim_end();
        !line.is_empty() && line.ends_with(self.prompt_terminators)
    }

    /// 会话回显中可能出现的命令，输出清洗时据此剔除
    pub fn echo_commands<'a>(&'a self, capture_command: &'a str) -> Vec<&'a str> {
        let mut commands = vec![capture_command];
        commands.extend(self.pagination_commands.iter().copied());
        if !self.enable_command.is_empty() {
            commands.push(self.enable_command);
        }
        commands.push(crate::constants::session::EXIT_COMMAND);
        commands.retain(|c| !c.trim().is_empty());
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(DeviceProfile::lookup("Cisco_IOS").name, "cisco_ios");
        assert_eq!(DeviceProfile::lookup("mikrotik_routeros").name, "generic");
        assert!(DeviceProfile::known_types().any(|t| t == "juniper_junos"));
    }

    #[test]
    fn test_echo_commands_for_cisco() {
        let profile = DeviceProfile::lookup("cisco_ios");
        let commands = profile.echo_commands("show running-config");
        assert_eq!(
            commands,
            vec![
                "show running-config",
                "terminal length 0",
                "terminal width 512",
                "enable",
                "exit"
            ]
        );
    }

    #[test]
    fn test_prompt_detection() {
        let profile = DeviceProfile::lookup("cisco_ios");
        assert!(profile.ends_with_prompt("switch#"));
        assert!(profile.ends_with_prompt("switch> "));
        assert!(!profile.ends_with_prompt("hostname switch"));
        assert_eq!(profile.privileged_terminator(), '#');
    }
}
