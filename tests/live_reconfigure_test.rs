//! 实时配置变更测试
//!
//! 启动完整应用，修改配置文件后验证调度计划和发送行为无需重启即可生效

use anyhow::Result;
use async_trait::async_trait;
use ping_bot::app::App;
use ping_bot::config::keys;
use ping_bot::notification::{MessageBody, MessageSender};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

const EVERY_SECOND: &str = "* * * * * *";
const YEARLY: &str = "0 0 0 1 1 *";

struct ChannelSender(mpsc::UnboundedSender<MessageBody>);

#[async_trait]
impl MessageSender for ChannelSender {
    async fn send_message(
        &self,
        _ctx: &CancellationToken,
        _url: &str,
        _cookie: &str,
        _headers: &HashMap<String, String>,
        body: &MessageBody,
    ) -> Result<()> {
        let _ = self.0.send(body.clone());
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    config_path: PathBuf,
    curl_path: PathBuf,
}

impl Fixture {
    fn new(cron_expr: &str, send_enabled: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let curl_path = dir.path().join("curl.txt");
        std::fs::write(
            &curl_path,
            "curl 'http://chat.local/api/send' -H 'x-token: t1' -b 'session=abc'",
        )
        .unwrap();

        let fixture = Self {
            config_path: dir.path().join("config.yaml"),
            curl_path,
            _dir: dir,
        };
        fixture.write(cron_expr, send_enabled);
        fixture
    }

    fn write(&self, cron_expr: &str, send_enabled: bool) {
        let content = format!(
            "values:\n  - name: curl_file\n    value: {}\nrealtime_config:\n  - name: cron_expr\n    value: \"{}\"\n  - name: send_enabled\n    value: {}\n  - name: chat_id\n    value: 7\n  - name: message_text\n    value: ping\n",
            self.curl_path.display(),
            cron_expr,
            send_enabled
        );
        std::fs::write(&self.config_path, content).unwrap();
    }
}

async fn start(fixture: &Fixture) -> (App, mpsc::UnboundedReceiver<MessageBody>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = App::start(
        &fixture.config_path,
        Duration::from_millis(50),
        Arc::new(ChannelSender(tx)),
    )
    .await
    .unwrap();
    (app, rx)
}

async fn wait_for_expression(app: &App, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if app.scheduler().expression("SendMessage").await.as_deref() == Some(expected) {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("发送计划未更新为 {expected}");
}

async fn expect_message(rx: &mut mpsc::UnboundedReceiver<MessageBody>) -> MessageBody {
    timeout(Duration::from_secs(4), rx.recv())
        .await
        .expect("等待消息超时")
        .expect("消息通道已关闭")
}

fn drain(rx: &mut mpsc::UnboundedReceiver<MessageBody>) {
    while rx.try_recv().is_ok() {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cron_change_reschedules_running_task() {
    let fixture = Fixture::new(YEARLY, true);
    let (app, mut rx) = start(&fixture).await;

    assert_eq!(
        app.scheduler().expression("SendMessage").await.as_deref(),
        Some(YEARLY)
    );
    assert!(timeout(Duration::from_millis(1500), rx.recv()).await.is_err());

    fixture.write(EVERY_SECOND, true);
    wait_for_expression(&app, EVERY_SECOND).await;

    let body = expect_message(&mut rx).await;
    assert_eq!(body.chat_id, 7);
    assert_eq!(body.message.text, "ping");
    assert_eq!(app.scheduler().task_names().await, vec!["SendMessage"]);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_enabled_takes_effect_without_restart() {
    let fixture = Fixture::new(EVERY_SECOND, false);
    let (app, mut rx) = start(&fixture).await;

    assert!(timeout(Duration::from_millis(1500), rx.recv()).await.is_err());

    fixture.write(EVERY_SECOND, true);
    expect_message(&mut rx).await;

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_cron_keeps_previous_schedule() {
    let fixture = Fixture::new(EVERY_SECOND, true);
    let (app, mut rx) = start(&fixture).await;
    expect_message(&mut rx).await;

    fixture.write("every other tuesday", true);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = app.store().snapshot_value(&keys::CRON_EXPR).await;
        if snapshot.map(|v| v.string()).as_deref() == Some("every other tuesday") {
            break;
        }
        assert!(Instant::now() < deadline, "配置未重新加载");
        sleep(Duration::from_millis(50)).await;
    }
    sleep(Duration::from_millis(300)).await;

    assert_eq!(
        app.scheduler().expression("SendMessage").await.as_deref(),
        Some(EVERY_SECOND)
    );
    drain(&mut rx);
    expect_message(&mut rx).await;

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_start_fails_without_curl_file() {
    let fixture = Fixture::new(EVERY_SECOND, true);
    std::fs::remove_file(&fixture.curl_path).unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = App::start(
        &fixture.config_path,
        Duration::from_millis(50),
        Arc::new(ChannelSender(tx)),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_start_fails_on_invalid_initial_cron() {
    let fixture = Fixture::new("61 * * * *", true);
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = App::start(
        &fixture.config_path,
        Duration::from_millis(50),
        Arc::new(ChannelSender(tx)),
    )
    .await
    .err()
    .unwrap();
    assert!(format!("{err:#}").contains("61 * * * *"));
}
