use std::time::Duration;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::config::CaptureConfig;
use crate::constants::{capture as capture_consts, session as session_consts};
use crate::error::{KeeperError, Result};
use crate::sanitize::{self, EchoFilter};
use crate::session::{ConnectParams, DeviceProfile, SessionFactory, SessionResult, ShellSession};

/// 单次抓取所需的上下文
pub(crate) struct CaptureContext<'a> {
    pub hostname: &'a str,
    pub command: &'a str,
    pub profile: &'static DeviceProfile,
    pub clock: &'a SharedClock,
    pub capture: &'a CaptureConfig,
}

/// 单个阶段的结果
#[derive(Debug)]
pub(crate) enum PhaseOutcome {
    Captured { content: String },
    Failed {
        error: KeeperError,
        /// 失败前已收到的输出
        transcript: Option<String>,
    },
}

impl PhaseOutcome {
    fn failed(error: KeeperError, transcript: String) -> Self {
        PhaseOutcome::Failed {
            error,
            transcript: Some(transcript).filter(|t| !t.is_empty()),
        }
    }
}

/// 第一阶段：交互式轮询抓取
pub(crate) async fn interactive_capture(
    factory: &dyn SessionFactory,
    params: &ConnectParams,
    ctx: &CaptureContext<'_>,
) -> PhaseOutcome {
    let mut session = match factory.open(params).await {
        Ok(session) => session,
        Err(e) => return PhaseOutcome::failed(e.into(), String::new()),
    };
    info!("[{}] 已连接，开始交互式抓取", ctx.hostname);

    let mut transcript = String::new();
    let driven = drive_interactive(session.as_mut(), ctx, &mut transcript).await;
    session.close().await;

    if let Err(e) = driven {
        return PhaseOutcome::failed(e, transcript);
    }
    if let Err(e) = sanitize::ensure_min_lines(&transcript, ctx.capture.interactive_min_lines) {
        return PhaseOutcome::failed(e, transcript);
    }

    let filter = EchoFilter::new(ctx.command, ctx.profile);
    PhaseOutcome::Captured {
        content: sanitize::clean_transcript(&transcript, &filter),
    }
}

async fn drive_interactive(
    session: &mut dyn ShellSession,
    ctx: &CaptureContext<'_>,
    transcript: &mut String,
) -> Result<()> {
    session.escalate().await?;
    session.write("\n").await?;
    ctx.clock
        .sleep(Duration::from_secs(capture_consts::WAKE_DELAY))
        .await;

    for command in ctx.profile.pagination_commands {
        session.send_line(command).await?;
        ctx.clock.sleep(ctx.capture.pagination_delay()).await;
    }

    let stale = session.read_available().await?;
    if !stale.is_empty() {
        debug!("[{}] 丢弃命令前的残留输出 {} 字节", ctx.hostname, stale.len());
    }

    info!("[{}] 执行命令: {}", ctx.hostname, ctx.command);
    session.send_line(ctx.command).await?;

    let started = ctx.clock.elapsed();
    let budget = ctx.capture.poll_budget();
    while ctx.clock.elapsed().saturating_sub(started) < budget {
        ctx.clock.sleep(ctx.capture.poll_interval()).await;

        let chunk = session.read_available().await?;
        if chunk.is_empty() {
            continue;
        }
        transcript.push_str(&chunk);

        if chunk.contains(session_consts::MORE_MARKER) {
            session.write(" ").await?;
            continue;
        }
        if sanitize::is_capture_complete(transcript, ctx.profile) {
            return Ok(());
        }
    }

    debug!("[{}] 轮询达到时间上限", ctx.hostname);
    Ok(())
}

/// 第二阶段：新会话中单命令定时等待
pub(crate) async fn fallback_capture(
    factory: &dyn SessionFactory,
    params: &ConnectParams,
    ctx: &CaptureContext<'_>,
) -> PhaseOutcome {
    let mut session = match factory.open(params).await {
        Ok(session) => session,
        Err(e) => return PhaseOutcome::failed(e.into(), String::new()),
    };

    let output = drive_fallback(session.as_mut(), ctx).await;
    session.close().await;

    let output = match output {
        Ok(output) => output,
        Err(e) => return PhaseOutcome::failed(e.into(), String::new()),
    };

    match sanitize::ensure_min_lines(&output, ctx.capture.fallback_min_lines) {
        Ok(_) => PhaseOutcome::Captured { content: output },
        Err(e) => PhaseOutcome::failed(e, output),
    }
}

/// 提权、关闭分页后发出单条命令
async fn drive_fallback(
    session: &mut dyn ShellSession,
    ctx: &CaptureContext<'_>,
) -> SessionResult<String> {
    session.escalate().await?;
    for command in ctx.profile.pagination_commands {
        session.send_line(command).await?;
        ctx.clock.sleep(ctx.capture.pagination_delay()).await;
    }

    info!("[{}] 回退方式执行命令: {}", ctx.hostname, ctx.command);
    session
        .send_and_wait_once(
            ctx.command,
            ctx.capture.fallback_delay_factor,
            ctx.capture.fallback_max_loops,
        )
        .await
}
