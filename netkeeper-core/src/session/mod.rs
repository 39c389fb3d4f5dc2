//! 远程命令行会话
//!
//! [`ShellSession`] 抽象一条已登录的交互式 shell，备份流程只依赖这个接口；
//! 真实实现基于 ssh2，测试使用脚本化的 [`mock::ScriptedSessionFactory`]。

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::clock::SharedClock;
use crate::config::SessionConfig;
use crate::constants::session as consts;
use crate::error::KeeperError;
use crate::sanitize;
use crate::vault::Secret;

pub mod mock;
pub mod profile;
pub mod ssh;

pub use mock::{ScriptedSessionFactory, SessionScript};
pub use profile::DeviceProfile;
pub use ssh::SshSessionFactory;

/// 会话层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("无法连接设备: {0}")]
    Connection(String),

    #[error("认证被拒绝: {0}")]
    Auth(String),

    #[error("会话读写失败: {0}")]
    Io(String),

    #[error("会话已关闭")]
    Closed,
}

impl From<SessionError> for KeeperError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Connection(msg) => KeeperError::Connection(msg),
            SessionError::Auth(msg) => KeeperError::Auth(msg),
            other => KeeperError::Backup(other.to_string()),
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// 建立会话所需的参数
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub secret: Secret,
    pub profile: &'static DeviceProfile,
    pub connect_timeout: Duration,
    pub session_timeout: Duration,
    pub read_poll: Duration,
}

impl ConnectParams {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: Secret,
        secret: Secret,
        profile: &'static DeviceProfile,
        config: &SessionConfig,
    ) -> Self {
        Self {
            host: host.into(),
            port: config.port,
            username: username.into(),
            password,
            secret,
            profile,
            connect_timeout: config.connect_timeout(),
            session_timeout: config.session_timeout(),
            read_poll: config.read_poll(),
        }
    }
}

/// 一条已登录的交互式 shell
#[async_trait]
pub trait ShellSession: Send {
    /// 按设备类型完成提权，已处于特权模式时直接返回
    async fn escalate(&mut self) -> SessionResult<()>;

    /// 原样写入数据，不追加换行
    async fn write(&mut self, data: &str) -> SessionResult<()>;

    /// 发送一行命令
    async fn send_line(&mut self, line: &str) -> SessionResult<()> {
        self.write(&format!("{line}\n")).await
    }

    /// 读取当前已到达的全部输出，没有数据时返回空字符串
    async fn read_available(&mut self) -> SessionResult<String>;

    /// 发送单条命令并按时间节奏收集输出，输出静默后返回
    async fn send_and_wait_once(
        &mut self,
        command: &str,
        delay_factor: u32,
        max_loops: u32,
    ) -> SessionResult<String>;

    /// 退出登录并断开
    async fn close(&mut self);
}

/// 会话工厂
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, params: &ConnectParams) -> SessionResult<Box<dyn ShellSession>>;
}

/// 最后一个非空行
pub(crate) fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().find(|line| !line.trim().is_empty())
}

/// 持续读取直到条件满足或超时，返回累计输出
pub(crate) async fn read_until<S, F>(
    session: &mut S,
    clock: &SharedClock,
    poll: Duration,
    budget: Duration,
    done: F,
) -> SessionResult<String>
where
    S: ShellSession + ?Sized,
    F: Fn(&str) -> bool + Send + Sync,
{
    let started = clock.elapsed();
    let mut accumulated = String::new();
    loop {
        accumulated.push_str(&session.read_available().await?);
        if done(&accumulated) || clock.elapsed().saturating_sub(started) >= budget {
            return Ok(accumulated);
        }
        clock.sleep(poll).await;
    }
}

fn is_privileged(profile: &DeviceProfile, text: &str) -> bool {
    let terminator = profile.privileged_terminator();
    last_line(text).is_some_and(|line| line.trim_end().ends_with(terminator))
}

/// 提权握手
///
/// 先唤醒提示符，已处于特权模式时直接返回；否则发送提权命令，
/// 出现口令提示时写入提权口令，最后以提示符判断是否成功。
pub(crate) async fn escalate_privilege<S>(
    session: &mut S,
    clock: &SharedClock,
    profile: &DeviceProfile,
    secret: &Secret,
    poll: Duration,
) -> SessionResult<()>
where
    S: ShellSession + ?Sized,
{
    if !profile.requires_enable {
        return Ok(());
    }

    let wait = Duration::from_secs(consts::ESCALATE_WAIT);
    let at_prompt = |text: &str| last_line(text).is_some_and(|line| profile.ends_with_prompt(line));

    session.send_line("").await?;
    let current = read_until(session, clock, poll, wait, at_prompt).await?;
    if is_privileged(profile, &current) {
        return Ok(());
    }

    session.send_line(profile.enable_command).await?;
    let mut reply = read_until(session, clock, poll, wait, |text: &str| {
        text.to_ascii_lowercase().contains("password") || at_prompt(text)
    })
    .await?;

    if reply.to_ascii_lowercase().contains("password") {
        let payload = Zeroizing::new(format!("{}\n", secret.expose()));
        session.write(&payload).await?;
        reply = read_until(session, clock, poll, wait, at_prompt).await?;
    }

    if is_privileged(profile, &reply) {
        debug!("已进入特权模式");
        Ok(())
    } else {
        Err(SessionError::Auth("提权口令被拒绝".into()))
    }
}

/// 基于时间节奏的单命令收集，真实会话与模拟会话共用
///
/// 每隔 `基础间隔 × delay_factor` 读取一次；读到空数据后再等待
/// `收尾间隔 × delay_factor` 复读，仍为空才认为输出结束。
/// 返回前去掉首行命令回显、末尾提示符和分页标记。
pub(crate) async fn collect_timed<S>(
    session: &mut S,
    clock: &SharedClock,
    profile: &DeviceProfile,
    command: &str,
    delay_factor: u32,
    max_loops: u32,
) -> SessionResult<String>
where
    S: ShellSession + ?Sized,
{
    let factor = u64::from(delay_factor.max(1));
    let pause = Duration::from_millis(consts::TIMING_BASE_MILLIS * factor);
    let final_delay = Duration::from_millis(consts::TIMING_FINAL_MILLIS * factor);

    let _ = session.read_available().await?;
    session.send_line(command).await?;

    let mut output = String::new();
    for _ in 0..max_loops {
        clock.sleep(pause).await;
        let mut chunk = session.read_available().await?;
        if chunk.is_empty() {
            clock.sleep(final_delay).await;
            chunk = session.read_available().await?;
            if chunk.is_empty() {
                break;
            }
        }
        if chunk.contains(consts::MORE_MARKER) {
            session.write(" ").await?;
        }
        output.push_str(&chunk);
    }
    Ok(sanitize::strip_command_output(&output, command, profile))
}
