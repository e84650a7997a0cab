//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::DEFAULT_CONFIG_PATH;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// 默认停止等待时间（秒）
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 默认配置文件防抖动延迟（毫秒）
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Ping Bot - 按 cron 计划发送聊天消息，配置实时生效
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ping-bot",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "PING_BOT_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "PING_BOT_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// 日志文件路径
    #[arg(
        long,
        value_name = "FILE",
        help = "日志文件路径，不指定时输出到控制台",
        env = "PING_BOT_LOG_FILE"
    )]
    pub log_file: Option<PathBuf>,

    /// 是否输出 JSON 格式日志
    #[arg(long, help = "输出 JSON 格式日志", env = "PING_BOT_JSON_LOGS")]
    pub json_logs: bool,

    /// 子命令，缺省为 run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    /// 要执行的子命令
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        })
    }
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// 启动定时发送服务（默认）
    Run {
        /// 停止时等待执行中任务的时间（秒）
        #[arg(
            long,
            value_name = "SECONDS",
            default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            help = "停止时等待执行中任务的时间（秒）",
            env = "PING_BOT_SHUTDOWN_TIMEOUT"
        )]
        shutdown_timeout: u64,

        /// 配置文件变更防抖动延迟（毫秒）
        #[arg(
            long,
            value_name = "MILLIS",
            default_value_t = DEFAULT_DEBOUNCE_MS,
            help = "配置文件变更防抖动延迟（毫秒）",
            env = "PING_BOT_DEBOUNCE_MS"
        )]
        debounce_ms: u64,
    },

    /// 验证配置文件与 curl 文件
    Validate {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 立即执行一次发送任务
    SendOnce {
        /// 只打印消息，不实际发送
        #[arg(long, help = "只打印消息，不实际发送")]
        dry_run: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}
