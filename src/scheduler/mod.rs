//! 任务调度模块
//!
//! 提供按触发表达式周期执行命名任务的调度器，支持运行时增删和替换任务

pub mod manager;
pub mod task;
pub mod trigger;

// 重新导出主要类型
pub use manager::{ExecutionStats, Scheduler, SchedulerStatus, TaskScheduler};
pub use task::Task;
pub use trigger::Trigger;
