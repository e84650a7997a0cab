//! 任务调度器
//!
//! 维护按名称索引的任务注册表，由单个调度循环计算最近的触发时间，
//! 到期任务在各自独立的 tokio 任务中执行，慢任务不会拖延其他任务。

use crate::error::SchedulerError;
use crate::scheduler::task::Task;
use crate::scheduler::trigger::Trigger;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// 调度器状态
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// 已注册的任务数量
    pub total_tasks: usize,
    /// 正在执行的任务实例数量
    pub running_executions: usize,
    /// 调度循环是否运行中
    pub is_running: bool,
    /// 状态生成时间
    pub last_update: Instant,
    /// 执行统计
    pub execution_stats: ExecutionStats,
}

/// 任务执行统计信息
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// 总执行次数
    pub total_runs: u64,
    /// 执行成功次数
    pub successful_runs: u64,
    /// 执行失败次数
    pub failed_runs: u64,
    /// 最后执行完成时间
    pub last_run_time: Option<Instant>,
}

/// 任务调度器trait，定义调度接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 添加任务
    ///
    /// # 参数
    /// * `ctx` - 传给每次 `work` 调用的取消令牌
    /// * `expression` - 触发表达式
    /// * `task` - 任务实例，名称必须唯一
    ///
    /// # 返回
    /// * `InvalidExpression` - 表达式不合法
    /// * `DuplicateTask` - 同名任务已存在
    async fn add_task(
        &self,
        ctx: CancellationToken,
        expression: &str,
        task: Arc<dyn Task>,
    ) -> Result<(), SchedulerError>;

    /// 移除任务，任务不存在时返回 `TaskNotFound`
    async fn remove_task(&self, name: &str) -> Result<(), SchedulerError>;

    /// 在一次注册表加锁内移除并重新添加同名任务
    ///
    /// 先校验新表达式，校验失败时原任务保持不变
    async fn replace_task(
        &self,
        ctx: CancellationToken,
        expression: &str,
        task: Arc<dyn Task>,
    ) -> Result<(), SchedulerError>;

    /// 启动调度循环，重复调用会被忽略
    async fn start(&self);

    /// 停止调度器
    ///
    /// 等待调度循环退出以及所有执行中的任务完成；
    /// `ctx` 先被取消时返回 `StopCancelled`
    async fn stop(&self, ctx: &CancellationToken) -> Result<(), SchedulerError>;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 注册表中的任务条目
struct TaskEntry {
    /// 调度器分配的条目标识
    id: u64,
    expression: String,
    trigger: Trigger,
    task: Arc<dyn Task>,
    ctx: CancellationToken,
    next_fire: Option<DateTime<Local>>,
}

struct SchedulerInner {
    /// 任务注册表
    entries: RwLock<HashMap<String, TaskEntry>>,
    next_id: AtomicU64,
    /// 注册表变更时唤醒调度循环
    wakeup: Notify,
    shutdown: CancellationToken,
    /// 执行中的任务
    executions: TaskTracker,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<RwLock<ExecutionStats>>,
}

/// 任务调度器实现
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    /// 创建新的任务调度器
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                entries: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                wakeup: Notify::new(),
                shutdown: CancellationToken::new(),
                executions: TaskTracker::new(),
                loop_handle: Mutex::new(None),
                stats: Arc::new(RwLock::new(ExecutionStats::default())),
            }),
        }
    }

    /// 已注册的任务名称（按名称排序）
    pub async fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// 是否存在指定名称的任务
    pub async fn contains(&self, name: &str) -> bool {
        self.inner.entries.read().await.contains_key(name)
    }

    /// 任务当前的触发表达式
    pub async fn expression(&self, name: &str) -> Option<String> {
        self.inner
            .entries
            .read()
            .await
            .get(name)
            .map(|entry| entry.expression.clone())
    }

    /// 任务的下一次触发时间
    pub async fn next_fire_time(&self, name: &str) -> Option<DateTime<Local>> {
        self.inner
            .entries
            .read()
            .await
            .get(name)
            .and_then(|entry| entry.next_fire)
    }
}

impl SchedulerInner {
    /// 向注册表插入条目，调用方持有写锁
    fn insert_entry(
        &self,
        entries: &mut HashMap<String, TaskEntry>,
        ctx: CancellationToken,
        expression: &str,
        trigger: Trigger,
        task: Arc<dyn Task>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let next_fire = trigger.next_after(&Local::now());
        entries.insert(
            task.name().to_string(),
            TaskEntry {
                id,
                expression: expression.to_string(),
                trigger,
                task,
                ctx,
                next_fire,
            },
        );
        id
    }

    /// 以 `now` 为起点重新计算所有条目的触发时间
    async fn reschedule_all(&self, now: DateTime<Local>) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.next_fire = entry.trigger.next_after(&now);
        }
    }

    /// 最近的触发时间
    async fn next_wake(&self) -> Option<DateTime<Local>> {
        self.entries
            .read()
            .await
            .values()
            .filter_map(|entry| entry.next_fire)
            .min()
    }

    /// 派发所有已到期的任务
    async fn fire_due(&self, now: DateTime<Local>) {
        let mut entries = self.entries.write().await;
        for (name, entry) in entries.iter_mut() {
            match entry.next_fire {
                Some(at) if at <= now => {}
                _ => continue,
            }

            entry.next_fire = entry.trigger.next_after(&now);
            debug!("派发任务: {} (#{})，下次触发: {:?}", name, entry.id, entry.next_fire);

            let task = Arc::clone(&entry.task);
            let ctx = entry.ctx.clone();
            let stats = Arc::clone(&self.stats);
            self.executions.spawn(execute(task, ctx, stats));
        }
    }
}

/// 调度循环
async fn run_loop(inner: Arc<SchedulerInner>) {
    inner.reschedule_all(Local::now()).await;
    info!("调度循环已启动");

    loop {
        let delay = inner
            .next_wake()
            .await
            .map(|at| (at - Local::now()).to_std().unwrap_or(Duration::ZERO));

        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = inner.wakeup.notified() => {
                debug!("任务注册表已变更，重新计算触发时间");
            }
            _ = sleep_or_pending(delay) => {
                inner.fire_due(Local::now()).await;
            }
        }
    }

    info!("调度循环已退出");
}

async fn sleep_or_pending(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// 执行一次任务并记录结果
async fn execute(task: Arc<dyn Task>, ctx: CancellationToken, stats: Arc<RwLock<ExecutionStats>>) {
    let name = task.name().to_string();
    let started = Instant::now();
    debug!("开始执行任务: {}", name);

    let succeeded = match AssertUnwindSafe(task.work(ctx)).catch_unwind().await {
        Ok(Ok(())) => {
            info!("任务执行成功: {}，耗时 {:?}", name, started.elapsed());
            true
        }
        Ok(Err(e)) => {
            error!("任务执行失败: {} - {:#}", name, e);
            false
        }
        Err(_) => {
            error!("任务执行时发生 panic: {}", name);
            false
        }
    };

    let mut stats = stats.write().await;
    stats.total_runs += 1;
    if succeeded {
        stats.successful_runs += 1;
    } else {
        stats.failed_runs += 1;
    }
    stats.last_run_time = Some(Instant::now());
}

#[async_trait]
impl Scheduler for TaskScheduler {
    async fn add_task(
        &self,
        ctx: CancellationToken,
        expression: &str,
        task: Arc<dyn Task>,
    ) -> Result<(), SchedulerError> {
        let trigger = Trigger::parse(expression)?;
        let name = task.name().to_string();

        let id = {
            let mut entries = self.inner.entries.write().await;
            if entries.contains_key(&name) {
                warn!("任务已存在，拒绝重复添加: {}", name);
                return Err(SchedulerError::DuplicateTask { name });
            }
            self.inner
                .insert_entry(&mut entries, ctx, expression, trigger, task)
        };

        self.inner.wakeup.notify_one();
        info!("任务已添加: {} [{}] (#{})", name, expression, id);
        Ok(())
    }

    async fn remove_task(&self, name: &str) -> Result<(), SchedulerError> {
        let removed = self.inner.entries.write().await.remove(name);

        match removed {
            Some(entry) => {
                self.inner.wakeup.notify_one();
                info!("任务已移除: {} (#{})", name, entry.id);
                Ok(())
            }
            None => Err(SchedulerError::TaskNotFound {
                name: name.to_string(),
            }),
        }
    }

    async fn replace_task(
        &self,
        ctx: CancellationToken,
        expression: &str,
        task: Arc<dyn Task>,
    ) -> Result<(), SchedulerError> {
        let trigger = Trigger::parse(expression)?;
        let name = task.name().to_string();

        let (old_expression, id) = {
            let mut entries = self.inner.entries.write().await;
            let Some(old) = entries.remove(&name) else {
                return Err(SchedulerError::TaskNotFound { name });
            };
            let id = self
                .inner
                .insert_entry(&mut entries, ctx, expression, trigger, task);
            (old.expression, id)
        };

        self.inner.wakeup.notify_one();
        info!(
            "任务已替换: {} [{}] -> [{}] (#{})",
            name, old_expression, expression, id
        );
        Ok(())
    }

    async fn start(&self) {
        let mut handle = self.inner.loop_handle.lock().await;
        if handle.is_some() || self.inner.shutdown.is_cancelled() {
            warn!("任务调度器已启动或已停止，忽略启动请求");
            return;
        }

        let total = self.inner.entries.read().await.len();
        *handle = Some(tokio::spawn(run_loop(Arc::clone(&self.inner))));
        info!("启动任务调度器，任务数量: {}", total);
    }

    async fn stop(&self, ctx: &CancellationToken) -> Result<(), SchedulerError> {
        info!("停止任务调度器");
        self.inner.shutdown.cancel();

        let handle = self.inner.loop_handle.lock().await.take();
        let executions = self.inner.executions.clone();
        let shutdown = async move {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    error!("调度循环异常退出: {}", e);
                }
            }
            executions.close();
            executions.wait().await;
        };

        tokio::select! {
            _ = shutdown => {
                info!("任务调度器已停止");
                Ok(())
            }
            _ = ctx.cancelled() => {
                warn!(
                    "等待任务完成时被取消，仍有 {} 个任务在执行",
                    self.inner.executions.len()
                );
                Err(SchedulerError::StopCancelled)
            }
        }
    }

    async fn get_status(&self) -> SchedulerStatus {
        let is_running =
            self.inner.loop_handle.lock().await.is_some() && !self.inner.shutdown.is_cancelled();

        SchedulerStatus {
            total_tasks: self.inner.entries.read().await.len(),
            running_executions: self.inner.executions.len(),
            is_running,
            last_update: Instant::now(),
            execution_stats: self.inner.stats.read().await.clone(),
        }
    }
}
