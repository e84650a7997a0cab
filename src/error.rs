//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use std::path::PathBuf;
use thiserror::Error;

/// Ping Bot 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum PingBotError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 值类型转换错误
    #[error("值转换错误: {0}")]
    Value(#[from] ValueError),

    /// 任务调度相关错误
    #[error("调度错误: {0}")]
    Scheduler(#[from] SchedulerError),

    /// 请求描述解析错误
    #[error("请求解析错误: {0}")]
    RequestParse(#[from] RequestParseError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件失败 {path}: {source}")]
    DocumentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置文件解析失败
    #[error("配置文件解析失败 {path}: {message}")]
    DocumentParse { path: PathBuf, message: String },

    /// 配置段缺失或格式不正确
    #[error("配置段缺失或不是列表: {section}")]
    SectionMissing { section: &'static str },

    /// 键不存在
    #[error("配置键不存在: {key}")]
    KeyNotFound { key: String },

    /// 未知的键前缀
    #[error("未知的配置键前缀: {key}")]
    UnknownPrefix { key: String },

    /// 文件监控建立失败
    #[error("文件监控失败: {0}")]
    Watch(#[from] notify::Error),
}

/// 值类型转换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// 原始值无法转换为目标类型
    #[error("无法将 {found} 转换为 {target}: {detail}")]
    TypeMismatch {
        /// 目标类型
        target: &'static str,
        /// 实际观察到的原始类型
        found: &'static str,
        /// 附加说明（如字符串解析失败原因）
        detail: String,
    },
}

/// 任务调度错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// 触发表达式不合法
    #[error("触发表达式不合法 `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// 任务名称重复
    #[error("任务已存在: {name}")]
    DuplicateTask { name: String },

    /// 任务不存在
    #[error("任务不存在: {name}")]
    TaskNotFound { name: String },

    /// 停止等待被取消
    #[error("等待调度器停止时被取消")]
    StopCancelled,
}

/// 请求描述（curl）解析错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestParseError {
    /// URL 缺失
    #[error("curl 命令中未找到 URL")]
    UrlNotFound,

    /// 请求头缺失
    #[error("curl 命令中未找到请求头")]
    HeadersNotFound,

    /// Cookie 缺失
    #[error("curl 命令中未找到 cookie")]
    CookieNotFound,

    /// 匹配规则编译失败
    #[error("正则表达式错误: {0}")]
    InvalidPattern(String),
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 发送失败
    #[error("消息发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 发送参数错误
    #[error("发送参数错误: {0}")]
    InvalidRequest(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, PingBotError>;
