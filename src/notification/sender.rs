//! 消息发送器模块
//!
//! 定义消息发送的trait和基于 reqwest 的实现

use crate::error::NotificationError;
use crate::notification::message::MessageBody;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 默认请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 消息发送器trait
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// 发送消息
    ///
    /// # 参数
    /// * `ctx` - 取消令牌，取消后放弃请求
    /// * `url` - 请求地址
    /// * `cookie` - 原样放入 `Cookie` 请求头
    /// * `headers` - 附加请求头
    /// * `body` - 消息体
    ///
    /// # 返回
    /// * `Result<()>` - 发送结果
    async fn send_message(
        &self,
        ctx: &CancellationToken,
        url: &str,
        cookie: &str,
        headers: &HashMap<String, String>,
        body: &MessageBody,
    ) -> Result<()>;
}

/// 基于 HTTP POST 的消息发送器
pub struct HttpMessageSender {
    /// HTTP客户端
    client: Client,
}

impl HttpMessageSender {
    /// 创建新的发送器
    ///
    /// # 参数
    /// * `timeout` - 单次请求超时时间
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send_message(
        &self,
        ctx: &CancellationToken,
        url: &str,
        cookie: &str,
        headers: &HashMap<String, String>,
        body: &MessageBody,
    ) -> Result<()> {
        if url.is_empty() {
            return Err(NotificationError::InvalidRequest("请求地址为空".to_string()).into());
        }
        if cookie.is_empty() {
            return Err(NotificationError::InvalidRequest("cookie 为空".to_string()).into());
        }

        debug!("发送消息到: {} (chat_id={})", url, body.chat_id);

        let mut request = self.client.post(url).header("Cookie", cookie);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        let request = request.json(body);

        let response = tokio::select! {
            response = request.send() => response.context("发送消息请求失败")?,
            _ = ctx.cancelled() => {
                return Err(NotificationError::SendError("发送已取消".to_string()).into());
            }
        };

        let status = response.status();
        let text = response.text().await.context("读取响应内容失败")?;

        // 非 2xx 状态只记录，不视为失败
        if status.is_success() {
            info!("消息发送完成: {} {}", status, text);
        } else {
            warn!("消息接口返回非成功状态: {} {}", status, text);
        }

        Ok(())
    }
}

/// 只记录消息内容、不实际发送的发送器
pub struct DryRunSender;

#[async_trait]
impl MessageSender for DryRunSender {
    async fn send_message(
        &self,
        _ctx: &CancellationToken,
        url: &str,
        _cookie: &str,
        headers: &HashMap<String, String>,
        body: &MessageBody,
    ) -> Result<()> {
        let encoded = serde_json::to_string(body).context("序列化消息体失败")?;
        info!(
            "[dry-run] POST {} (请求头 {} 个): {}",
            url,
            headers.len(),
            encoded
        );
        Ok(())
    }
}
