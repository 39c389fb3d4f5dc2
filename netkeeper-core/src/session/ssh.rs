//! 基于 ssh2 的交互式 shell
//!
//! ssh2 是阻塞库，所有网络操作都放进 `spawn_blocking`。
//! shell 通道建立后切到非阻塞模式，读取时取完缓冲区即返回。

use async_trait::async_trait;
use parking_lot::Mutex;
use ssh2::{Channel, Session};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{
    ConnectParams, DeviceProfile, SessionError, SessionFactory, SessionResult, ShellSession,
    collect_timed, escalate_privilege, last_line, read_until,
};
use crate::clock::SharedClock;
use crate::constants::session as consts;
use crate::vault::Secret;

const READ_BUFFER_SIZE: usize = 8192;
const WRITE_RETRY_PAUSE: Duration = Duration::from_millis(10);

struct SshInner {
    session: Session,
    channel: Channel,
}

/// SSH 会话工厂
pub struct SshSessionFactory {
    clock: SharedClock,
}

impl SshSessionFactory {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(&self, params: &ConnectParams) -> SessionResult<Box<dyn ShellSession>> {
        debug!("建立 SSH 连接: {}:{}", params.host, params.port);

        let host = params.host.clone();
        let port = params.port;
        let username = params.username.clone();
        let password = params.password.clone();
        let connect_timeout = params.connect_timeout;
        let session_timeout = params.session_timeout;

        let inner = tokio::task::spawn_blocking(move || {
            connect_blocking(&host, port, &username, &password, connect_timeout, session_timeout)
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))??;

        let mut session = SshShellSession {
            inner: Some(Arc::new(Mutex::new(inner))),
            profile: params.profile,
            secret: params.secret.clone(),
            clock: self.clock.clone(),
            read_poll: params.read_poll,
            write_timeout: params.session_timeout,
        };

        let profile = params.profile;
        let banner = read_until(
            &mut session,
            &self.clock,
            params.read_poll,
            Duration::from_secs(consts::PROMPT_WAIT),
            |text: &str| last_line(text).is_some_and(|line| profile.ends_with_prompt(line)),
        )
        .await?;
        if !last_line(&banner).is_some_and(|line| params.profile.ends_with_prompt(line)) {
            session.close().await;
            return Err(SessionError::Connection(format!(
                "{} 登录后未出现命令提示符",
                params.host
            )));
        }

        Ok(Box::new(session))
    }
}

fn connect_blocking(
    host: &str,
    port: u16,
    username: &str,
    password: &Secret,
    connect_timeout: Duration,
    session_timeout: Duration,
) -> SessionResult<SshInner> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| SessionError::Connection(format!("{host}: {e}")))?
        .next()
        .ok_or_else(|| SessionError::Connection(format!("无法解析地址: {host}")))?;

    let tcp = TcpStream::connect_timeout(&addr, connect_timeout)
        .map_err(|e| SessionError::Connection(format!("{addr}: {e}")))?;

    let mut session =
        Session::new().map_err(|e| SessionError::Connection(format!("SSH 会话初始化失败: {e}")))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(session_timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| SessionError::Connection(format!("SSH 握手失败: {e}")))?;

    session
        .userauth_password(username, password.expose())
        .map_err(|e| SessionError::Auth(e.message().to_string()))?;
    if !session.authenticated() {
        return Err(SessionError::Auth(format!("用户 {username} 认证未通过")));
    }

    let mut channel = session
        .channel_session()
        .map_err(|e| SessionError::Io(format!("打开通道失败: {e}")))?;
    channel
        .request_pty("vt100", None, Some((512, 48, 0, 0)))
        .map_err(|e| SessionError::Io(format!("申请终端失败: {e}")))?;
    channel
        .shell()
        .map_err(|e| SessionError::Io(format!("启动 shell 失败: {e}")))?;

    session.set_blocking(false);
    Ok(SshInner { session, channel })
}

fn write_all_nonblocking(channel: &mut Channel, bytes: &[u8], timeout: Duration) -> SessionResult<()> {
    let deadline = Instant::now() + timeout;
    let mut offset = 0;

    while offset < bytes.len() {
        match channel.write(&bytes[offset..]) {
            Ok(0) => return Err(SessionError::Closed),
            Ok(n) => offset += n,
            Err(e) if e.kind() == IoErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(SessionError::Io("写入超时".into()));
                }
                std::thread::sleep(WRITE_RETRY_PAUSE);
            }
            Err(e) => return Err(SessionError::Io(e.to_string())),
        }
    }

    loop {
        match channel.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == IoErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(SessionError::Io("写入超时".into()));
                }
                std::thread::sleep(WRITE_RETRY_PAUSE);
            }
            Err(e) => return Err(SessionError::Io(e.to_string())),
        }
    }
}

fn read_nonblocking(channel: &mut Channel) -> SessionResult<String> {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut out = Vec::new();

    loop {
        match channel.read(&mut buf) {
            Ok(0) => {
                if out.is_empty() && channel.eof() {
                    return Err(SessionError::Closed);
                }
                break;
            }
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == IoErrorKind::WouldBlock => break,
            Err(e) => return Err(SessionError::Io(e.to_string())),
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// 已登录的 SSH shell
pub struct SshShellSession {
    inner: Option<Arc<Mutex<SshInner>>>,
    profile: &'static DeviceProfile,
    secret: Secret,
    clock: SharedClock,
    read_poll: Duration,
    write_timeout: Duration,
}

impl SshShellSession {
    fn inner(&self) -> SessionResult<Arc<Mutex<SshInner>>> {
        self.inner.clone().ok_or(SessionError::Closed)
    }
}

#[async_trait]
impl ShellSession for SshShellSession {
    async fn escalate(&mut self) -> SessionResult<()> {
        let clock = self.clock.clone();
        let secret = self.secret.clone();
        let (profile, poll) = (self.profile, self.read_poll);
        escalate_privilege(self, &clock, profile, &secret, poll).await
    }

    async fn write(&mut self, data: &str) -> SessionResult<()> {
        let inner = self.inner()?;
        let bytes = Zeroizing::new(data.as_bytes().to_vec());
        let timeout = self.write_timeout;
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock();
            write_all_nonblocking(&mut guard.channel, &bytes, timeout)
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn read_available(&mut self) -> SessionResult<String> {
        let inner = self.inner()?;
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock();
            read_nonblocking(&mut guard.channel)
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn send_and_wait_once(
        &mut self,
        command: &str,
        delay_factor: u32,
        max_loops: u32,
    ) -> SessionResult<String> {
        let clock = self.clock.clone();
        let profile = self.profile;
        collect_timed(self, &clock, profile, command, delay_factor, max_loops).await
    }

    async fn close(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let logout = format!("{}\n", self.profile.logout_command);
        let timeout = self.write_timeout;

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock();
            let SshInner { session, channel } = &mut *guard;
            let _ = write_all_nonblocking(channel, logout.as_bytes(), timeout);
            let _ = channel.send_eof();
            let _ = channel.close();
            let _ = session.disconnect(None, "backup finished", None);
        })
        .await;

        if let Err(e) = result {
            warn!("关闭 SSH 会话失败: {}", e);
        }
    }
}

impl Drop for SshShellSession {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            if let Some(mut guard) = inner.try_lock() {
                let SshInner { session, channel } = &mut *guard;
                let _ = channel.close();
                let _ = session.disconnect(None, "session dropped", None);
            }
        }
    }
}
