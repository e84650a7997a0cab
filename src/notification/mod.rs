//! 通知模块
//!
//! 提供消息体构建、模板渲染和 HTTP 消息发送功能

pub mod message;
pub mod sender;
pub mod template;

// 重新导出主要类型
pub use message::{Message, MessageBody};
pub use sender::{DryRunSender, HttpMessageSender, MessageSender};
pub use template::{render_template, MessageTemplate};
