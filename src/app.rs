//! 应用程序生命周期
//!
//! 组装配置存储、发送任务和调度器，并把 `cron_expr` 的变更接到调度器上

use crate::config::{keys, ConfigStore};
use crate::curl::CurlRequest;
use crate::error::SchedulerError;
use crate::job::SendMessageJob;
use crate::notification::MessageSender;
use crate::scheduler::{Scheduler, Task, TaskScheduler};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 运行中的应用
pub struct App {
    store: Arc<ConfigStore>,
    scheduler: TaskScheduler,
    /// 传给任务的取消令牌，停止超时后取消
    task_ctx: CancellationToken,
}

impl App {
    /// 启动应用
    ///
    /// 1. 加载配置并开始监控文件
    /// 2. 读取 curl 文件并构建发送任务
    /// 3. 订阅 `cron_expr` 变更，替换任务的触发表达式
    /// 4. 按 `cron_expr` 注册任务，与快照对齐后启动调度器
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `debounce` - 文件事件防抖动延迟
    /// * `sender` - 消息发送器
    pub async fn start(
        config_path: &Path,
        debounce: Duration,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self> {
        let store = Arc::new(ConfigStore::new(config_path).with_debounce(debounce));
        store
            .start_watching()
            .await
            .context("启动配置监控失败")?;

        let request = load_curl_request(&store).await?;
        let job: Arc<dyn Task> = Arc::new(SendMessageJob::new(store.clone(), request, sender));

        let scheduler = TaskScheduler::new();
        let task_ctx = CancellationToken::new();
        subscribe_cron_expr(&store, &scheduler, &task_ctx, &job).await;

        let cron_expr = store
            .get_string(&keys::CRON_EXPR)
            .await
            .context("读取发送计划失败")?;
        scheduler
            .add_task(task_ctx.clone(), &cron_expr, job.clone())
            .await
            .context("注册发送任务失败")?;
        reconcile_cron_expr(&store, &scheduler, &task_ctx, &job, &cron_expr).await;
        scheduler.start().await;

        info!("服务已启动，发送计划: {}", cron_expr);
        Ok(Self {
            store,
            scheduler,
            task_ctx,
        })
    }

    /// 配置存储
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// 任务调度器
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// 停止应用
    ///
    /// 先停止文件监控，再等待调度器停止；超过 `timeout` 时取消执行中的任务
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.store.stop_watching().await;

        let deadline = CancellationToken::new();
        let timer = {
            let deadline = deadline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                deadline.cancel();
            })
        };

        let result = self.scheduler.stop(&deadline).await;
        timer.abort();

        match result {
            Ok(()) => {
                info!("服务已停止");
                Ok(())
            }
            Err(e) => {
                warn!("等待任务完成超时 ({:?})，取消执行中的任务", timeout);
                self.task_ctx.cancel();
                Err(e).context("停止任务调度器失败")
            }
        }
    }
}

/// 订阅 `cron_expr` 变更，替换发送任务的触发表达式
///
/// 任务注册前收到的变更返回 `TaskNotFound`，由 [`reconcile_cron_expr`] 补齐
async fn subscribe_cron_expr(
    store: &ConfigStore,
    scheduler: &TaskScheduler,
    task_ctx: &CancellationToken,
    job: &Arc<dyn Task>,
) {
    let scheduler = scheduler.clone();
    let task_ctx = task_ctx.clone();
    let job = job.clone();
    store
        .watch(keys::CRON_EXPR, move |new_value, old_value| {
            let scheduler = scheduler.clone();
            let ctx = task_ctx.clone();
            let job = job.clone();
            async move {
                let new_expr = new_value.string();
                let old_expr = old_value.string();
                match scheduler.replace_task(ctx, &new_expr, job).await {
                    Ok(()) => info!("发送计划已从 {} 调整为 {}", old_expr, new_expr),
                    Err(SchedulerError::TaskNotFound { .. }) => {
                        debug!("发送任务尚未注册，忽略计划变更: {}", new_expr);
                    }
                    Err(e) => error!("更新发送计划失败，保持原计划: {}", e),
                }
            }
        })
        .await;
}

/// 注册后与快照对齐
///
/// 读取计划与注册任务之间发生的变更已更新快照，但其回调可能因任务未注册而被忽略
async fn reconcile_cron_expr(
    store: &ConfigStore,
    scheduler: &TaskScheduler,
    task_ctx: &CancellationToken,
    job: &Arc<dyn Task>,
    registered: &str,
) {
    let Some(current) = store.snapshot_value(&keys::CRON_EXPR).await else {
        return;
    };
    let current = current.string();
    if current == registered {
        return;
    }

    match scheduler
        .replace_task(task_ctx.clone(), &current, job.clone())
        .await
    {
        Ok(()) => info!("发送计划已从 {} 调整为 {}", registered, current),
        Err(e) => error!("更新发送计划失败，保持原计划: {}", e),
    }
}

/// 读取 `values.curl_file` 指向的 curl 文件并解析
pub async fn load_curl_request(store: &ConfigStore) -> Result<CurlRequest> {
    let path = store
        .get_string(&keys::CURL_FILE)
        .await
        .context("读取 curl 文件路径失败")?;
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("读取 curl 文件失败: {path}"))?;
    Ok(CurlRequest::parse(&content)?)
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("监听中断信号失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到中断信号，正在停止服务..."),
        _ = terminate => info!("收到终止信号，正在停止服务..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const YEARLY: &str = "0 0 0 1 1 *";
    const DAILY: &str = "0 0 9 * * *";

    struct IdleTask;

    #[async_trait]
    impl Task for IdleTask {
        fn name(&self) -> &str {
            "SendMessage"
        }

        async fn work(&self, _ctx: CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    fn write_cron(path: &Path, expr: &str) {
        std::fs::write(
            path,
            format!("realtime_config:\n  - name: cron_expr\n    value: \"{expr}\"\n"),
        )
        .unwrap();
    }

    async fn setup(
        dir: &TempDir,
    ) -> (ConfigStore, TaskScheduler, CancellationToken, Arc<dyn Task>) {
        let path = dir.path().join("config.yaml");
        write_cron(&path, YEARLY);
        let store = ConfigStore::new(&path);
        store.load().await.unwrap();

        let scheduler = TaskScheduler::new();
        let ctx = CancellationToken::new();
        let job: Arc<dyn Task> = Arc::new(IdleTask);
        subscribe_cron_expr(&store, &scheduler, &ctx, &job).await;
        (store, scheduler, ctx, job)
    }

    #[tokio::test]
    async fn test_change_before_registration_is_reconciled() {
        let dir = TempDir::new().unwrap();
        let (store, scheduler, ctx, job) = setup(&dir).await;

        let registered = store.get_string(&keys::CRON_EXPR).await.unwrap();
        write_cron(store.path(), DAILY);
        store.reload().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scheduler.contains("SendMessage").await);

        scheduler
            .add_task(ctx.clone(), &registered, job.clone())
            .await
            .unwrap();
        reconcile_cron_expr(&store, &scheduler, &ctx, &job, &registered).await;
        assert_eq!(
            scheduler.expression("SendMessage").await.as_deref(),
            Some(DAILY)
        );
    }

    #[tokio::test]
    async fn test_change_after_registration_replaces_task() {
        let dir = TempDir::new().unwrap();
        let (store, scheduler, ctx, job) = setup(&dir).await;
        scheduler.add_task(ctx, YEARLY, job).await.unwrap();

        write_cron(store.path(), DAILY);
        store.reload().await.unwrap();

        for _ in 0..20 {
            if scheduler.expression("SendMessage").await.as_deref() == Some(DAILY) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("发送计划未更新");
    }

    #[tokio::test]
    async fn test_reconcile_keeps_schedule_on_invalid_snapshot() {
        let dir = TempDir::new().unwrap();
        let (store, scheduler, ctx, job) = setup(&dir).await;

        write_cron(store.path(), "every other tuesday");
        store.reload().await.unwrap();
        scheduler
            .add_task(ctx.clone(), YEARLY, job.clone())
            .await
            .unwrap();
        reconcile_cron_expr(&store, &scheduler, &ctx, &job, YEARLY).await;
        assert_eq!(
            scheduler.expression("SendMessage").await.as_deref(),
            Some(YEARLY)
        );
    }
}
