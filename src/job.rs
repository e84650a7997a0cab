//! 定时发送消息任务
//!
//! 每次执行时从配置存储读取最新的开关、文本、格式标记和会话 ID，
//! 配置变更无需重建任务即可在下一次执行时生效。

use crate::config::{keys, ConfigStore, RawValue, Value};
use crate::curl::CurlRequest;
use crate::error::ConfigError;
use crate::notification::{MessageBody, MessageSender, MessageTemplate};
use crate::scheduler::Task;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 任务名称
pub const SEND_MESSAGE_JOB_NAME: &str = "SendMessage";

/// 定时发送消息任务
pub struct SendMessageJob {
    store: Arc<ConfigStore>,
    request: CurlRequest,
    sender: Arc<dyn MessageSender>,
    template: MessageTemplate,
}

impl SendMessageJob {
    /// 创建任务
    ///
    /// # 参数
    /// * `store` - 配置存储
    /// * `request` - 解析后的 curl 请求，提供地址、请求头和 cookie
    /// * `sender` - 消息发送器
    pub fn new(
        store: Arc<ConfigStore>,
        request: CurlRequest,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            store,
            request,
            sender,
            template: MessageTemplate::new(),
        }
    }

    /// 按当前配置构建消息体
    ///
    /// # 返回
    /// * `Ok(None)` - 发送已关闭
    pub async fn build_body(&self) -> Result<Option<MessageBody>> {
        if !self.store.get_bool(&keys::SEND_ENABLED).await? {
            return Ok(None);
        }

        let text = self.store.get_string(&keys::MESSAGE_TEXT).await?;
        let text = self.template.render(&text)?;
        let markup = self.markup().await?;
        let chat_id = self.store.get_i64(&keys::CHAT_ID).await?;

        Ok(Some(MessageBody::new(chat_id, text, markup)))
    }

    /// 读取可选的格式标记，缺失时返回空列表
    async fn markup(&self) -> Result<Vec<JsonValue>> {
        match self.store.get(&keys::MARKUP).await {
            Ok(value) => parse_markup(&value),
            Err(ConfigError::KeyNotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 解析格式标记
///
/// 支持 JSON 数组字符串或文档中的列表；空值或空字符串返回空列表
pub fn parse_markup(value: &Value) -> Result<Vec<JsonValue>> {
    match value.raw() {
        RawValue::Null => Ok(Vec::new()),
        RawValue::Seq(_) => match value.raw().to_json() {
            JsonValue::Array(items) => Ok(items),
            _ => Ok(Vec::new()),
        },
        _ => {
            let text = value.string();
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str(&text).context("markup 不是合法的 JSON 数组")
        }
    }
}

#[async_trait]
impl Task for SendMessageJob {
    fn name(&self) -> &str {
        SEND_MESSAGE_JOB_NAME
    }

    async fn work(&self, ctx: CancellationToken) -> Result<()> {
        let Some(body) = self.build_body().await? else {
            info!("消息发送已关闭，跳过本次执行");
            return Ok(());
        };

        info!("开始发送消息 (chat_id={})", body.chat_id);

        let url = self.request.request_url()?;
        let cookie = self.request.cookie()?;
        let headers = self.request.headers()?;

        self.sender
            .send_message(&ctx, url, cookie, headers, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestParseError;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CURL: &str = "curl 'http://chat.local/api/send' -H 'x-token: t1' -b 'session=abc'";

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, MessageBody)>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_message(
            &self,
            _ctx: &CancellationToken,
            url: &str,
            cookie: &str,
            headers: &HashMap<String, String>,
            body: &MessageBody,
        ) -> Result<()> {
            assert_eq!(headers.get("x-token").map(String::as_str), Some("t1"));
            self.sent
                .lock()
                .unwrap()
                .push((url.to_string(), cookie.to_string(), body.clone()));
            Ok(())
        }
    }

    fn write_config(path: &Path, enabled: bool, markup: &str) {
        let content = format!(
            "realtime_config:\n  - name: send_enabled\n    value: {enabled}\n  - name: message_text\n    value: \"ping\"\n  - name: chat_id\n    value: 42\n{markup}"
        );
        std::fs::write(path, content).unwrap();
    }

    fn job(dir: &TempDir, curl: &str) -> (SendMessageJob, Arc<RecordingSender>) {
        let store = Arc::new(ConfigStore::new(dir.path().join("config.yaml")));
        let sender = Arc::new(RecordingSender::default());
        let job = SendMessageJob::new(store, CurlRequest::parse(curl).unwrap(), sender.clone());
        (job, sender)
    }

    #[tokio::test]
    async fn test_disabled_job_sends_nothing() {
        let dir = TempDir::new().unwrap();
        write_config(&dir.path().join("config.yaml"), false, "");
        let (job, sender) = job(&dir, CURL);

        job.work(CancellationToken::new()).await.unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enabled_job_sends_current_values() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir.path().join("config.yaml"),
            true,
            "  - name: markup\n    value: '[{\"type\":\"bold\"}]'\n",
        );
        let (job, sender) = job(&dir, CURL);

        job.work(CancellationToken::new()).await.unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (url, cookie, body) = &sent[0];
        assert_eq!(url, "http://chat.local/api/send");
        assert_eq!(cookie, "session=abc");
        assert_eq!(body.chat_id, 42);
        assert_eq!(body.message.text, "ping");
        assert_eq!(body.message.markup, vec![serde_json::json!({"type": "bold"})]);
    }

    #[tokio::test]
    async fn test_values_are_read_on_every_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        write_config(&path, false, "");
        let (job, sender) = job(&dir, CURL);

        job.work(CancellationToken::new()).await.unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());

        write_config(&path, true, "");
        job.work(CancellationToken::new()).await.unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.message.markup.is_empty());
    }

    #[tokio::test]
    async fn test_markup_as_yaml_list() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir.path().join("config.yaml"),
            true,
            "  - name: markup\n    value:\n      - type: italic\n",
        );
        let (job, _sender) = job(&dir, CURL);

        let body = job.build_body().await.unwrap().unwrap();
        assert_eq!(body.message.markup, vec![serde_json::json!({"type": "italic"})]);
    }

    #[tokio::test]
    async fn test_invalid_markup_fails_run() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir.path().join("config.yaml"),
            true,
            "  - name: markup\n    value: 'not json'\n",
        );
        let (job, sender) = job(&dir, CURL);

        assert!(job.work(CancellationToken::new()).await.is_err());
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_cookie_fails_run() {
        let dir = TempDir::new().unwrap();
        write_config(&dir.path().join("config.yaml"), true, "");
        let (job, sender) = job(&dir, "curl 'http://chat.local/api/send' -H 'x-token: t1'");

        let err = job.work(CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RequestParseError>(),
            Some(&RequestParseError::CookieNotFound)
        );
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
