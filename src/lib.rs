//! Ping Bot - 按 cron 计划发送聊天消息的机器人
//!
//! 主要功能：
//! - 带命名空间与按需类型转换的配置存储
//! - 配置文件热重载与逐键变更通知
//! - 运行时可增删、替换触发表达式的任务调度器
//! - 从 curl 命令解析请求信息并发送消息
//! - 结构化日志记录

pub mod app;
pub mod cli;
pub mod config;
pub mod curl;
pub mod error;
pub mod job;
pub mod logging;
pub mod notification;
pub mod scheduler;

// 重新导出主要类型
pub use config::{ConfigStore, Key, Value};
pub use error::PingBotError;
pub use scheduler::{Scheduler, Task, TaskScheduler};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
