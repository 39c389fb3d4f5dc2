//! 定时调度
//!
//! 每个启用的计划定义对应一个内存中的触发器。后台循环睡到最早的触发时刻，
//! 到点后把任务交给 [`JobExecutor`] 在独立的 tokio 任务中执行。
//! 错过的多个周期只补触发一次，单次计划触发后即移除。

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::constants::schedule as consts;
use crate::error::{KeeperError, Result};
use crate::models::{ScheduleDefinition, ScheduleRequest, ScheduleView};
use crate::store::{DeviceStore, ScheduleStore, load_or_empty};

mod describe;
mod trigger;

pub use describe::describe;
pub use trigger::TriggerRule;

/// 计划任务的执行者
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// 备份单台设备
    async fn run_device(&self, device_id: &str) -> Result<()>;

    /// 备份全部设备
    async fn run_global(&self) -> Result<()>;
}

/// 触发目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTarget {
    Device(String),
    Global,
}

impl JobTarget {
    fn of(definition: &ScheduleDefinition) -> Self {
        match &definition.device_id {
            Some(id) => JobTarget::Device(id.clone()),
            None => JobTarget::Global,
        }
    }
}

#[derive(Debug, Clone)]
struct Trigger {
    rule: TriggerRule,
    target: JobTarget,
    next_fire: NaiveDateTime,
}

/// 任务调度器
pub struct JobScheduler {
    store: ScheduleStore,
    devices: Option<DeviceStore>,
    executor: Arc<dyn JobExecutor>,
    clock: SharedClock,
    triggers: RwLock<HashMap<String, Trigger>>,
    /// 串行化计划定义的读改写
    store_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(store: ScheduleStore, executor: Arc<dyn JobExecutor>, clock: SharedClock) -> Self {
        Self {
            store,
            devices: None,
            executor,
            clock,
            triggers: RwLock::new(HashMap::new()),
            store_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// 注册计划时校验目标设备是否存在
    pub fn with_devices(mut self, devices: DeviceStore) -> Self {
        self.devices = Some(devices);
        self
    }

    /// 从存储恢复启用的计划并启动后台循环，返回恢复的触发器数量
    pub async fn start(self: &Arc<Self>) -> Result<usize> {
        if self.worker.lock().is_some() {
            return Ok(self.triggers.read().len());
        }

        let definitions = load_or_empty(self.store.as_ref(), "计划任务").await;
        let now = self.clock.now_local();
        let mut restored = 0;
        for definition in definitions.iter().filter(|d| d.enabled) {
            match TriggerRule::from_definition(definition) {
                Ok(rule) => {
                    if self.install(&definition.id, rule, JobTarget::of(definition), now) {
                        restored += 1;
                    }
                }
                Err(e) => warn!("跳过无效的计划 {}: {}", definition.id, e),
            }
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop().await });
        *self.worker.lock() = Some(handle);

        info!("调度器已启动，恢复 {} 个计划任务", restored);
        Ok(restored)
    }

    /// 停止后台循环并等待其退出
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("调度循环退出异常: {}", e);
            }
        }
        info!("调度器已停止");
    }

    async fn run_loop(&self) {
        loop {
            let delay = self.until_next_fire();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => continue,
                _ = self.clock.sleep(delay) => {}
            }
            let _ = self.run_pending(self.clock.now_local()).await;
        }
        debug!("调度循环结束");
    }

    fn until_next_fire(&self) -> Duration {
        let idle = Duration::from_secs(consts::IDLE_WAKE_INTERVAL);
        let now = self.clock.now_local();
        self.triggers
            .read()
            .values()
            .map(|t| t.next_fire)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO).min(idle))
            .unwrap_or(idle)
    }

    /// 触发所有到期的任务，返回各任务的句柄
    pub async fn run_pending(&self, now: NaiveDateTime) -> Vec<JoinHandle<()>> {
        let mut due = Vec::new();
        let mut finished = Vec::new();
        {
            let mut triggers = self.triggers.write();
            for (id, trigger) in triggers.iter_mut() {
                if trigger.next_fire > now {
                    continue;
                }
                due.push((id.clone(), trigger.target.clone()));
                match trigger.rule.next_after(now) {
                    Some(next) => trigger.next_fire = next,
                    None => finished.push(id.clone()),
                }
            }
            for id in &finished {
                triggers.remove(id);
            }
        }

        if !finished.is_empty() {
            if let Err(e) = self.mark_disabled(&finished).await {
                warn!("更新已完成的单次计划失败: {}", e);
            }
        }

        due.into_iter()
            .map(|(id, target)| self.dispatch(id, target))
            .collect()
    }

    fn dispatch(&self, id: String, target: JobTarget) -> JoinHandle<()> {
        info!("触发计划任务 {}: {:?}", id, target);
        let executor = Arc::clone(&self.executor);
        let job = tokio::spawn(async move {
            match target {
                JobTarget::Device(device_id) => executor.run_device(&device_id).await,
                JobTarget::Global => executor.run_global().await,
            }
        });

        tokio::spawn(async move {
            match job.await {
                Ok(Ok(())) => info!("计划任务 {} 执行完成", id),
                Ok(Err(e)) => error!("计划任务 {} 执行失败: {}", id, e),
                Err(e) => error!("计划任务 {} 异常退出: {}", id, e),
            }
        })
    }

    /// 安装或替换触发器；没有未来触发时间时返回 false
    fn install(&self, id: &str, rule: TriggerRule, target: JobTarget, now: NaiveDateTime) -> bool {
        let Some(next_fire) = rule.next_after(now) else {
            warn!("计划 {} 已没有后续触发时间，不再注册", id);
            self.triggers.write().remove(id);
            return false;
        };

        self.triggers.write().insert(
            id.to_string(),
            Trigger {
                rule,
                target,
                next_fire,
            },
        );
        self.wake.notify_one();
        true
    }

    fn uninstall(&self, id: &str) -> bool {
        let removed = self.triggers.write().remove(id).is_some();
        if removed {
            self.wake.notify_one();
        }
        removed
    }

    async fn ensure_device_exists(&self, device_id: &str) -> Result<()> {
        let Some(devices) = &self.devices else {
            return Ok(());
        };
        let known = devices.load().await?;
        if known.iter().any(|d| d.id == device_id) {
            Ok(())
        } else {
            Err(KeeperError::DeviceNotFound(device_id.to_string()))
        }
    }

    /// 新增计划，返回计划 ID
    pub async fn register_schedule(&self, request: ScheduleRequest) -> Result<String> {
        if let Some(device_id) = &request.device_id {
            self.ensure_device_exists(device_id).await?;
        }

        let now = self.clock.now_local();
        let id = format!("{}{}", consts::ID_PREFIX, Uuid::new_v4().simple());
        let mut definition = request.into_definition(id.clone(), now);
        let rule = TriggerRule::from_definition(&definition)?;

        let _guard = self.store_lock.lock().await;
        if definition.enabled {
            definition.enabled = self.install(&id, rule, JobTarget::of(&definition), now);
        }

        let mut definitions = self.store.load().await?;
        definitions.retain(|d| d.id != id);
        definitions.push(definition.clone());
        if let Err(e) = self.store.save(&definitions).await {
            self.uninstall(&id);
            return Err(e);
        }

        info!("新增计划任务 {}: {}", id, describe(&definition));
        Ok(id)
    }

    /// 启用或停用计划
    pub async fn toggle_schedule(&self, id: &str, enabled: bool) -> Result<bool> {
        let _guard = self.store_lock.lock().await;
        let mut definitions = self.store.load().await?;
        let definition = definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| KeeperError::ScheduleNotFound(id.to_string()))?;

        let live = if enabled {
            let rule = TriggerRule::from_definition(definition)?;
            self.install(id, rule, JobTarget::of(definition), self.clock.now_local())
        } else {
            self.uninstall(id);
            false
        };
        definition.enabled = live;
        self.store.save(&definitions).await?;

        info!("计划任务 {} 已{}", id, if live { "启用" } else { "停用" });
        Ok(live)
    }

    /// 删除计划
    pub async fn delete_schedule(&self, id: &str) -> Result<()> {
        let _guard = self.store_lock.lock().await;
        let had_trigger = self.uninstall(id);

        let mut definitions = self.store.load().await?;
        let Some(position) = definitions.iter().position(|d| d.id == id) else {
            if had_trigger {
                warn!("计划 {} 只存在于调度器中", id);
                return Ok(());
            }
            return Err(KeeperError::ScheduleNotFound(id.to_string()));
        };
        let removed = definitions.remove(position);
        self.store.save(&definitions).await?;

        info!("删除计划任务 {}: {}", id, describe(&removed));
        Ok(())
    }

    /// 删除指向某台设备的全部计划，返回删除数量
    pub async fn purge_device(&self, device_id: &str) -> Result<usize> {
        let _guard = self.store_lock.lock().await;
        let mut definitions = self.store.load().await?;
        let (removed, kept): (Vec<_>, Vec<_>) = definitions
            .drain(..)
            .partition(|d| d.device_id.as_deref() == Some(device_id));

        for definition in &removed {
            self.uninstall(&definition.id);
        }
        if !removed.is_empty() {
            self.store.save(&kept).await?;
        }
        Ok(removed.len())
    }

    /// 列出全部计划，`enabled` 与下次运行时间取自调度器当前状态
    pub async fn list_schedules(&self) -> Vec<ScheduleView> {
        let definitions = load_or_empty(self.store.as_ref(), "计划任务").await;
        let triggers = self.triggers.read();

        definitions
            .into_iter()
            .map(|mut definition| {
                let next_run = triggers.get(&definition.id).map(|t| t.next_fire);
                definition.enabled = next_run.is_some();
                let description = describe(&definition);
                ScheduleView {
                    definition,
                    next_run,
                    description,
                }
            })
            .collect()
    }

    async fn mark_disabled(&self, ids: &[String]) -> Result<()> {
        let _guard = self.store_lock.lock().await;
        let mut definitions = self.store.load().await?;
        let mut changed = false;
        for definition in definitions.iter_mut().filter(|d| ids.contains(&d.id)) {
            definition.enabled = false;
            changed = true;
        }
        if changed {
            self.store.save(&definitions).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::models::{DeviceRecord, ScheduleKind};
    use crate::store::{CollectionStore, JsonFileStore};
    use chrono::NaiveDate;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        async fn run_device(&self, device_id: &str) -> Result<()> {
            self.calls.lock().push(device_id.to_string());
            match device_id {
                "bad" => Err(KeeperError::backup("设备不可达")),
                "boom" => panic!("executor panic"),
                _ => Ok(()),
            }
        }

        async fn run_global(&self) -> Result<()> {
            self.calls.lock().push("*".to_string());
            Ok(())
        }
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<JsonFileStore<ScheduleDefinition>>,
        executor: Arc<RecordingExecutor>,
        scheduler: JobScheduler,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("schedules.json")));
        let executor = Arc::new(RecordingExecutor::default());
        let clock = Arc::new(ManualClock::new(at(1, 0, 0)));
        let scheduler = JobScheduler::new(store.clone(), executor.clone(), clock);
        Fixture {
            _dir: dir,
            store,
            executor,
            scheduler,
        }
    }

    fn daily(time: &str, device: Option<&str>) -> ScheduleRequest {
        let mut request = ScheduleRequest::new(ScheduleKind::Daily, time);
        request.device_id = device.map(str::to_string);
        request
    }

    async fn settle(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_reregistering_same_id_fires_once_per_period() {
        let f = fixture();
        let id = f.scheduler.register_schedule(daily("02:00", Some("sw1"))).await.unwrap();
        assert!(id.starts_with("sch_"));

        f.scheduler.toggle_schedule(&id, true).await.unwrap();
        f.scheduler.toggle_schedule(&id, true).await.unwrap();

        settle(f.scheduler.run_pending(at(1, 2, 0)).await).await;
        settle(f.scheduler.run_pending(at(1, 2, 30)).await).await;
        assert_eq!(*f.executor.calls.lock(), vec!["sw1".to_string()]);

        settle(f.scheduler.run_pending(at(2, 2, 0)).await).await;
        assert_eq!(f.executor.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_missed_periods_coalesce() {
        let f = fixture();
        f.scheduler.register_schedule(daily("02:00", None)).await.unwrap();

        settle(f.scheduler.run_pending(at(5, 9, 0)).await).await;
        assert_eq!(*f.executor.calls.lock(), vec!["*".to_string()]);

        let views = f.scheduler.list_schedules().await;
        assert_eq!(views[0].next_run, Some(at(6, 2, 0)));
    }

    #[tokio::test]
    async fn test_toggle_off_and_on() {
        let f = fixture();
        let id = f.scheduler.register_schedule(daily("02:00", Some("sw1"))).await.unwrap();

        assert!(!f.scheduler.toggle_schedule(&id, false).await.unwrap());
        settle(f.scheduler.run_pending(at(1, 3, 0)).await).await;
        assert!(f.executor.calls.lock().is_empty());

        let views = f.scheduler.list_schedules().await;
        assert!(!views[0].definition.enabled);
        assert_eq!(views[0].next_run, None);
        assert!(!f.store.load().await.unwrap()[0].enabled);

        assert!(f.scheduler.toggle_schedule(&id, true).await.unwrap());
        let views = f.scheduler.list_schedules().await;
        assert!(views[0].definition.enabled);
        assert_eq!(views[0].next_run, Some(at(1, 2, 0)));
        assert_eq!(views[0].description, "每天 02:00");
    }

    #[tokio::test]
    async fn test_once_schedule_is_removed_after_firing() {
        let f = fixture();
        let mut request = ScheduleRequest::new(ScheduleKind::Once, "06:00");
        request.date = Some("2026-03-01".into());
        let id = f.scheduler.register_schedule(request).await.unwrap();

        settle(f.scheduler.run_pending(at(1, 6, 0)).await).await;
        settle(f.scheduler.run_pending(at(2, 6, 0)).await).await;
        assert_eq!(f.executor.calls.lock().len(), 1);

        let stored = f.store.load().await.unwrap();
        assert_eq!(stored[0].id, id);
        assert!(!stored[0].enabled);
    }

    #[tokio::test]
    async fn test_expired_once_schedule_is_stored_disabled() {
        let f = fixture();
        let mut request = ScheduleRequest::new(ScheduleKind::Once, "06:00");
        request.date = Some("2025-12-31".into());
        f.scheduler.register_schedule(request).await.unwrap();

        let views = f.scheduler.list_schedules().await;
        assert!(!views[0].definition.enabled);
    }

    #[tokio::test]
    async fn test_job_failures_do_not_unregister() {
        let f = fixture();
        for device in ["bad", "boom", "good"] {
            f.scheduler.register_schedule(daily("01:00", Some(device))).await.unwrap();
        }

        settle(f.scheduler.run_pending(at(1, 1, 0)).await).await;
        assert_eq!(f.executor.calls.lock().len(), 3);

        let views = f.scheduler.list_schedules().await;
        assert!(views.iter().all(|v| v.definition.enabled));

        settle(f.scheduler.run_pending(at(2, 1, 0)).await).await;
        assert_eq!(f.executor.calls.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let f = fixture();
        let keep = f.scheduler.register_schedule(daily("01:00", Some("sw2"))).await.unwrap();
        let gone = f.scheduler.register_schedule(daily("01:00", Some("sw1"))).await.unwrap();
        f.scheduler.register_schedule(daily("02:00", Some("sw1"))).await.unwrap();

        assert_eq!(f.scheduler.purge_device("sw1").await.unwrap(), 2);
        assert!(matches!(
            f.scheduler.delete_schedule(&gone).await,
            Err(KeeperError::ScheduleNotFound(_))
        ));

        f.scheduler.delete_schedule(&keep).await.unwrap();
        assert!(f.scheduler.list_schedules().await.is_empty());
        settle(f.scheduler.run_pending(at(1, 5, 0)).await).await;
        assert!(f.executor.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let dir = tempdir().unwrap();
        let devices = Arc::new(JsonFileStore::<DeviceRecord>::new(dir.path().join("devices.json")));
        let f = fixture();
        let scheduler = JobScheduler::new(
            f.store.clone(),
            f.executor.clone(),
            Arc::new(ManualClock::new(at(1, 0, 0))),
        )
        .with_devices(devices);

        assert!(matches!(
            scheduler.register_schedule(daily("02:00", Some("ghost"))).await,
            Err(KeeperError::DeviceNotFound(_))
        ));
        assert!(matches!(
            scheduler.register_schedule(daily("24:00", None)).await,
            Err(KeeperError::Validation(_))
        ));
        assert!(f.store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_restores_enabled_definitions() {
        let f = fixture();
        let enabled = f.scheduler.register_schedule(daily("02:00", None)).await.unwrap();
        let disabled = f.scheduler.register_schedule(daily("03:00", None)).await.unwrap();
        f.scheduler.toggle_schedule(&disabled, false).await.unwrap();

        let restarted = Arc::new(JobScheduler::new(
            f.store.clone(),
            f.executor.clone(),
            SystemClock::shared(),
        ));
        assert_eq!(restarted.start().await.unwrap(), 1);

        let views = restarted.list_schedules().await;
        let live: Vec<_> = views.iter().filter(|v| v.definition.enabled).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].definition.id, enabled);
        assert!(live[0].next_run.is_some());

        restarted.shutdown().await;
    }
}
