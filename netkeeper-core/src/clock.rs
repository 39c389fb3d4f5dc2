//! 时间源抽象
//!
//! 备份轮询、SSH 会话等待与调度循环都通过 [`Clock`] 取时间和休眠，
//! 测试中用 [`ManualClock`] 代替真实时间，`sleep` 会立即推进时钟。

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// 单调时间，自时钟创建起经过的时长
    fn elapsed(&self) -> Duration;

    /// 本地墙上时间，用于文件时间戳与调度计算
    fn now_local(&self) -> NaiveDateTime;

    /// 休眠指定时长
    async fn sleep(&self, duration: Duration);
}

pub type SharedClock = Arc<dyn Clock>;

/// 基于 tokio 计时器的系统时钟
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: tokio::time::Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    wall: NaiveDateTime,
}

/// 手动推进的时钟
///
/// `sleep` 不真正等待，只把单调时间与墙上时间同时向前拨，
/// 让轮询循环在测试里按确定的步数结束。
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall: start,
            })),
        }
    }

    /// 直接推进时钟
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.wall += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    /// 把墙上时间设置到指定时刻（只允许向前）
    pub fn set_local(&self, wall: NaiveDateTime) {
        let mut state = self.state.lock();
        if wall > state.wall {
            if let Ok(delta) = (wall - state.wall).to_std() {
                state.elapsed += delta;
            }
            state.wall = wall;
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    fn now_local(&self) -> NaiveDateTime {
        self.state.lock().wall
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
