//! 日志系统模块
//!
//! 基于 tracing 的结构化日志，支持控制台或文件输出、文本或 JSON 格式，
//! 并通过 LogTracer 接收 `log` crate 的日志

use anyhow::Context;
use log::LevelFilter;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing_subscriber::filter::{Directive, LevelFilter as TracingLevelFilter};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn global_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径，未设置时输出到控制台
    pub file_path: Option<PathBuf>,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只初始化一次，之后的调用直接返回新的句柄
    ///
    /// # 参数
    /// * `config` - 日志配置
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        let mut state = global_state();
        if !state.initialized {
            Self::init_log_tracer()?;
            Self::init_tracing_subscriber(&config)?;
            state.initialized = true;
            state.current_config = Some(config.clone());
        }

        Ok(Self { config })
    }

    /// 本句柄创建时使用的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        global_state().initialized
    }

    /// 获取当前生效的日志配置
    pub fn current_config() -> Option<LogConfig> {
        global_state().current_config.clone()
    }

    /// 初始化 LogTracer（log crate 到 tracing 的桥接）
    fn init_log_tracer() -> anyhow::Result<()> {
        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        LOG_TRACER_INIT
            .get_or_init(|| tracing_log::LogTracer::init().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut env_filter =
            EnvFilter::from_default_env().add_directive(Self::level_directive(config.level));

        for (module, level) in &config.module_levels {
            let directive: Directive = format!("{}={}", module, Self::level_to_string(*level))
                .parse()
                .with_context(|| format!("无效的模块日志级别: {module}"))?;
            env_filter = env_filter.add_directive(directive);
        }

        let timer = fmt::time::ChronoUtc::rfc_3339();
        let layer = match &config.file_path {
            Some(path) => {
                let file = Self::open_log_file(path)?;
                let base = fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_timer(timer)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true);
                if config.json_format {
                    base.json().boxed()
                } else {
                    base.boxed()
                }
            }
            None if config.json_format => fmt::layer()
                .json()
                .with_timer(timer)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            None => fmt::layer()
                .with_timer(timer)
                .with_ansi(true)
                .with_target(true)
                .with_thread_names(true)
                .boxed(),
        };

        match registry().with(env_filter).with(layer).try_init() {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            // log 桥接已由 init_log_tracer 安装，或测试进程中已设置过全局 subscriber
            Err(e)
                if e.to_string().contains("already been set")
                    || e.to_string().contains("attempted to set a logger") =>
            {
                tracing::debug!("全局日志已初始化，沿用现有配置");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", e)),
        }
    }

    /// 以追加方式打开日志文件，必要时创建父目录
    fn open_log_file(path: &Path) -> anyhow::Result<std::fs::File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建日志目录失败: {}", parent.display()))?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("创建日志文件失败: {}", path.display()))
    }

    /// 将 log::LevelFilter 转换为 tracing 的指令
    fn level_directive(level: LevelFilter) -> Directive {
        let level = match level {
            LevelFilter::Off => TracingLevelFilter::OFF,
            LevelFilter::Error => TracingLevelFilter::ERROR,
            LevelFilter::Warn => TracingLevelFilter::WARN,
            LevelFilter::Info => TracingLevelFilter::INFO,
            LevelFilter::Debug => TracingLevelFilter::DEBUG,
            LevelFilter::Trace => TracingLevelFilter::TRACE,
        };
        Directive::from(level)
    }

    /// 将 log::LevelFilter 转换为字符串
    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[test]
    fn test_level_conversion() {
        assert_eq!(LoggingSystem::level_to_string(LevelFilter::Warn), "warn");
        assert_eq!(
            LoggingSystem::level_directive(LevelFilter::Debug).to_string(),
            "debug"
        );
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("ping-bot.log");
        assert_ok!(LoggingSystem::open_log_file(&path));
        assert!(path.exists());
    }

    #[test]
    #[serial]
    fn test_single_initialization() {
        let mut config = LogConfig::default();
        config
            .module_levels
            .insert("ping_bot::config".to_string(), LevelFilter::Debug);

        let first = assert_ok!(LoggingSystem::setup_logging(config.clone()));
        assert!(LoggingSystem::is_initialized());
        assert_eq!(first.config().level, LevelFilter::Info);

        // 第二次调用不会重新初始化，返回的句柄携带本次配置
        let mut second_config = config;
        second_config.json_format = true;
        let second = assert_ok!(LoggingSystem::setup_logging(second_config));
        assert!(second.config().json_format);

        let current = LoggingSystem::current_config().unwrap();
        assert!(!current.json_format);
    }
}
