//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::app::{load_curl_request, wait_for_shutdown_signal, App};
use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{keys, ConfigStore};
use crate::job::{parse_markup, SendMessageJob};
use crate::notification::sender::DEFAULT_TIMEOUT;
use crate::notification::{render_template, DryRunSender, HttpMessageSender, MessageSender};
use crate::scheduler::{Scheduler, Task, Trigger};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 运行命令：启动定时发送服务直到收到停止信号
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Run {
            shutdown_timeout,
            debounce_ms,
        } = args.command()
        else {
            return Ok(());
        };

        let sender: Arc<dyn MessageSender> = Arc::new(HttpMessageSender::new(DEFAULT_TIMEOUT)?);
        let app = App::start(&args.config, Duration::from_millis(debounce_ms), sender).await?;

        wait_for_shutdown_signal().await;

        let status = app.scheduler().get_status().await;
        info!(
            "累计执行 {} 次，成功 {} 次，失败 {} 次",
            status.execution_stats.total_runs,
            status.execution_stats.successful_runs,
            status.execution_stats.failed_runs
        );

        app.shutdown(Duration::from_secs(shutdown_timeout)).await
    }
}

/// 单项验证结果
#[derive(Debug, Clone, Serialize)]
pub struct ValidationCheck {
    /// 验证项
    pub item: &'static str,
    /// 是否通过
    pub passed: bool,
    /// 说明或错误信息
    pub detail: String,
}

impl ValidationCheck {
    fn from_result<T, E: std::fmt::Display>(
        item: &'static str,
        result: std::result::Result<T, E>,
        describe: impl FnOnce(T) -> String,
    ) -> Self {
        match result {
            Ok(value) => Self {
                item,
                passed: true,
                detail: describe(value),
            },
            Err(e) => Self {
                item,
                passed: false,
                detail: format!("{e:#}"),
            },
        }
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Validate { format } = args.command() else {
            return Ok(());
        };

        let checks = Self::validate(&args.config).await;
        let failed = checks.iter().filter(|check| !check.passed).count();

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&checks)?),
            OutputFormat::Text => {
                println!("验证配置文件: {}", args.config.display());
                for check in &checks {
                    let mark = if check.passed { "✓" } else { "✗" };
                    println!("{} {}: {}", mark, check.item, check.detail);
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("配置验证失败: {} 项未通过", failed);
        }
        Ok(())
    }
}

impl ValidateCommand {
    /// 逐项检查配置文件与 curl 文件
    pub async fn validate(config_path: &Path) -> Vec<ValidationCheck> {
        let store = ConfigStore::new(config_path);
        let mut checks = Vec::new();

        let loaded = store.load().await;
        let document_ok = loaded.is_ok();
        checks.push(ValidationCheck::from_result("配置文件", loaded, |_| {
            "解析成功".to_string()
        }));
        if !document_ok {
            return checks;
        }

        let cron = match store.get_string(&keys::CRON_EXPR).await {
            Ok(expr) => Trigger::parse(&expr)
                .map(|trigger| (expr, trigger))
                .map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };
        checks.push(ValidationCheck::from_result(
            "cron_expr",
            cron,
            |(expr, trigger)| match trigger.next_after(&Local::now()) {
                Some(next) => format!("{expr}，下次触发: {}", next.format("%Y-%m-%d %H:%M:%S")),
                None => format!("{expr}，没有后续触发时间"),
            },
        ));

        checks.push(ValidationCheck::from_result(
            "send_enabled",
            store.get_bool(&keys::SEND_ENABLED).await,
            |enabled| enabled.to_string(),
        ));

        checks.push(ValidationCheck::from_result(
            "chat_id",
            store.get_i64(&keys::CHAT_ID).await,
            |chat_id| chat_id.to_string(),
        ));

        let text = match store.get_string(&keys::MESSAGE_TEXT).await {
            Ok(text) => render_template(&text).map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };
        checks.push(ValidationCheck::from_result("message_text", text, |rendered| {
            format!("渲染结果 {} 个字符", rendered.chars().count())
        }));

        if let Ok(markup) = store.get(&keys::MARKUP).await {
            checks.push(ValidationCheck::from_result(
                "markup",
                parse_markup(&markup),
                |items| format!("{} 项", items.len()),
            ));
        }

        let request = load_curl_request(&store).await.and_then(|request| {
            let url = request.request_url()?.to_string();
            request.cookie()?;
            let header_count = request.headers()?.len();
            Ok((url, header_count))
        });
        checks.push(ValidationCheck::from_result(
            "curl_file",
            request,
            |(url, header_count)| format!("{url}，请求头 {header_count} 个"),
        ));

        checks
    }
}

/// 立即执行一次发送任务
pub struct SendOnceCommand;

#[async_trait]
impl Command for SendOnceCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::SendOnce { dry_run } = args.command() else {
            return Ok(());
        };

        let store = Arc::new(ConfigStore::new(&args.config));
        let request = load_curl_request(&store).await?;
        let sender: Arc<dyn MessageSender> = if dry_run {
            Arc::new(DryRunSender)
        } else {
            Arc::new(HttpMessageSender::new(DEFAULT_TIMEOUT)?)
        };

        let job = SendMessageJob::new(store, request, sender);
        info!("立即执行任务: {}", job.name());
        job.work(CancellationToken::new()).await
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = args.command() {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}
