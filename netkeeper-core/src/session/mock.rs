use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    ConnectParams, DeviceProfile, SessionError, SessionFactory, SessionResult, ShellSession,
    collect_timed,
};
use crate::clock::{ManualClock, SharedClock};
use crate::constants::session::DEFAULT_CAPTURE_COMMAND;

/// 单次连接的脚本
#[derive(Debug, Clone)]
pub struct SessionScript {
    pub open: SessionResult<()>,
    pub escalate: SessionResult<()>,
    /// 收到这条命令后才开始吐出 `chunks`
    pub trigger: String,
    /// 每次 `read_available` 依次返回一段
    pub chunks: VecDeque<String>,
    /// 回退方式下命令发出后依次读到的分段
    pub fallback: SessionResult<Vec<String>>,
}

impl SessionScript {
    /// 交互式抓取脚本，按给定分段返回输出
    pub fn interactive<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            open: Ok(()),
            escalate: Ok(()),
            trigger: DEFAULT_CAPTURE_COMMAND.to_string(),
            chunks: chunks.into_iter().map(Into::into).collect(),
            fallback: Err(SessionError::Io("未配置备用输出".into())),
        }
    }

    /// 只用于备用方式的脚本
    pub fn fallback(output: impl Into<String>) -> Self {
        Self::fallback_chunks([output])
    }

    /// 备用方式的输出分多次到达
    pub fn fallback_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fallback: Ok(chunks.into_iter().map(Into::into).collect()),
            ..Self::interactive(Vec::<String>::new())
        }
    }

    pub fn refuse_connection(msg: impl Into<String>) -> Self {
        Self {
            open: Err(SessionError::Connection(msg.into())),
            ..Self::interactive(Vec::<String>::new())
        }
    }

    pub fn reject_auth(msg: impl Into<String>) -> Self {
        Self {
            open: Err(SessionError::Auth(msg.into())),
            ..Self::interactive(Vec::<String>::new())
        }
    }

    pub fn with_escalate(mut self, result: SessionResult<()>) -> Self {
        self.escalate = result;
        self
    }

    pub fn with_fallback(mut self, result: SessionResult<String>) -> Self {
        self.fallback = result.map(|output| vec![output]);
        self
    }

    pub fn released_by(mut self, command: impl Into<String>) -> Self {
        self.trigger = command.into();
        self
    }
}

#[derive(Debug, Default)]
struct Recorder {
    sent: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// 按顺序为每次连接分配脚本的会话工厂
///
/// 会话内部的定时等待使用独立的 [`ManualClock`]，不会真正休眠。
#[derive(Debug, Clone)]
pub struct ScriptedSessionFactory {
    scripts: Arc<Mutex<VecDeque<SessionScript>>>,
    recorder: Arc<Recorder>,
    clock: ManualClock,
}

impl ScriptedSessionFactory {
    pub fn new<I>(scripts: I) -> Self
    where
        I: IntoIterator<Item = SessionScript>,
    {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            recorder: Arc::new(Recorder::default()),
            clock: ManualClock::new(chrono::NaiveDateTime::default()),
        }
    }

    pub fn push(&self, script: SessionScript) {
        self.scripts.lock().push_back(script);
    }

    /// 所有会话写入过的内容，命令去掉了结尾换行
    pub fn sent(&self) -> Vec<String> {
        self.recorder.sent.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.recorder.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.recorder.closed.load(Ordering::SeqCst)
    }

    pub fn remaining_scripts(&self) -> usize {
        self.scripts.lock().len()
    }
}

#[async_trait]
impl SessionFactory for ScriptedSessionFactory {
    async fn open(&self, params: &ConnectParams) -> SessionResult<Box<dyn ShellSession>> {
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| SessionError::Connection(format!("{} 没有可用的脚本", params.host)))?;
        script.open.clone()?;

        Ok(Box::new(ScriptedSession {
            script,
            released: false,
            recorder: self.recorder.clone(),
            profile: params.profile,
            clock: Arc::new(self.clock.clone()),
        }))
    }
}

struct ScriptedSession {
    script: SessionScript,
    released: bool,
    recorder: Arc<Recorder>,
    profile: &'static DeviceProfile,
    clock: SharedClock,
}

#[async_trait]
impl ShellSession for ScriptedSession {
    async fn escalate(&mut self) -> SessionResult<()> {
        self.script.escalate.clone()
    }

    async fn write(&mut self, data: &str) -> SessionResult<()> {
        let line = data.trim_end_matches('\n');
        if line == self.script.trigger {
            self.released = true;
        }
        self.recorder.sent.lock().push(line.to_string());
        Ok(())
    }

    async fn read_available(&mut self) -> SessionResult<String> {
        if !self.released {
            return Ok(String::new());
        }
        Ok(self.script.chunks.pop_front().unwrap_or_default())
    }

    async fn send_and_wait_once(
        &mut self,
        command: &str,
        delay_factor: u32,
        max_loops: u32,
    ) -> SessionResult<String> {
        let chunks = match self.script.fallback.clone() {
            Ok(chunks) => chunks,
            Err(e) => {
                self.recorder.sent.lock().push(command.to_string());
                return Err(e);
            }
        };
        self.script.trigger = command.to_string();
        self.script.chunks = chunks.into();
        self.released = false;

        let clock = self.clock.clone();
        let profile = self.profile;
        collect_timed(self, &clock, profile, command, delay_factor, max_loops).await
    }

    async fn close(&mut self) {
        self.recorder.closed.fetch_add(1, Ordering::SeqCst);
    }
}
