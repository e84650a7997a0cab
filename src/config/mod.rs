//! 配置管理模块
//!
//! 提供带命名空间的配置键、按需类型转换的配置值、配置文档解析、
//! 实时配置快照与文件热重载功能

pub mod document;
pub mod key;
pub mod store;
pub mod value;
pub mod watcher;

// 重新导出主要类型
pub use document::{Document, DocumentFormat};
pub use key::{keys, Key, Namespace};
pub use store::{ConfigChange, ConfigStore, WatchCallback, DEFAULT_CONFIG_PATH};
pub use value::{parse_duration, RawValue, Value};
pub use watcher::{ConfigWatcher, FileChange};
