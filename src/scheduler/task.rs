//! 调度任务接口

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// 可调度的任务
///
/// 调度器只通过名称识别任务，并在每次触发时调用 [`Task::work`]。
#[async_trait]
pub trait Task: Send + Sync {
    /// 任务名称，在调度器中唯一
    fn name(&self) -> &str;

    /// 执行一次任务
    ///
    /// # 参数
    /// * `ctx` - 添加任务时传入的取消令牌
    ///
    /// # 返回
    /// * `Result<()>` - 执行结果，错误只会被记录，任务保持调度
    async fn work(&self, ctx: CancellationToken) -> Result<()>;
}
