//! 聊天消息请求体

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// 消息类型：普通文本
pub const MESSAGE_KIND_TEXT: i32 = 0;

/// 发送消息接口的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    /// 目标会话
    pub chat_id: i64,
    /// 消息内容
    pub message: Message,
}

/// 消息内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 客户端生成的消息 ID
    pub uuid: Uuid,
    pub text: String,
    /// 格式标记，原样透传
    pub markup: Vec<JsonValue>,
    pub kind: i32,
    pub files: Vec<JsonValue>,
    pub skip_invite_mentions: bool,
}

impl MessageBody {
    /// 创建新的文本消息，每次调用生成新的 uuid
    pub fn new(chat_id: i64, text: impl Into<String>, markup: Vec<JsonValue>) -> Self {
        Self {
            chat_id,
            message: Message {
                uuid: Uuid::new_v4(),
                text: text.into(),
                markup,
                kind: MESSAGE_KIND_TEXT,
                files: Vec::new(),
                skip_invite_mentions: false,
            },
        }
    }
}
