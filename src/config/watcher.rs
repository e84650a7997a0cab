//! 配置文件监控模块
//!
//! 监听配置文件的写入/创建事件，经过防抖动处理后发出变更通知

use crate::error::ConfigError;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 默认防抖动延迟
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// 配置文件变更事件
#[derive(Debug, Clone)]
pub struct FileChange {
    /// 配置文件路径
    pub config_path: PathBuf,
    /// 变更时间
    pub timestamp: Instant,
    /// 变更序号
    pub version: u64,
}

/// 配置文件监控器
pub struct ConfigWatcher {
    /// 配置文件路径
    config_path: PathBuf,
    /// 文件系统监控器
    watcher: Option<RecommendedWatcher>,
    /// 事件发送器，启动后移交给事件处理任务
    event_sender: Option<mpsc::UnboundedSender<FileChange>>,
    /// 防抖动延迟
    debounce_delay: Duration,
}

impl ConfigWatcher {
    /// 创建新的配置监控器
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `debounce_delay` - 防抖动延迟时间
    ///
    /// # 返回
    /// * 监控器和变更事件接收器
    pub fn new<P: AsRef<Path>>(
        config_path: P,
        debounce_delay: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FileChange>), ConfigError> {
        let config_path = config_path.as_ref().to_path_buf();

        Self::validate_config_path(&config_path)?;

        let (event_sender, event_receiver) = mpsc::unbounded_channel();

        let watcher = Self {
            config_path,
            watcher: None,
            event_sender: Some(event_sender),
            debounce_delay,
        };

        Ok((watcher, event_receiver))
    }

    /// 验证配置文件路径
    fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::DocumentRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "配置文件不存在或不是文件"),
            });
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml" | "toml") => {}
            _ => warn!("配置文件扩展名不是 .yaml/.yml/.toml，按 YAML 解析: {}", path.display()),
        }

        Ok(())
    }

    /// 需要监控的目录
    ///
    /// 监控父目录而不是文件本身，编辑器以替换方式保存文件时也能收到事件
    fn watch_dir(&self) -> &Path {
        match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// 启动配置文件监控
    ///
    /// 必须在 tokio 运行时中调用；重复调用不会重复启动
    pub fn start(&mut self) -> Result<(), ConfigError> {
        let Some(event_sender) = self.event_sender.take() else {
            debug!("配置文件监控已启动，忽略重复启动");
            return Ok(());
        };

        info!("启动配置文件监控: {}", self.config_path.display());

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // 接收端关闭说明监控已停止
            let _ = raw_tx.send(res);
        })?;

        let watch_dir = self.watch_dir().to_path_buf();
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);

        let config_path = self.config_path.clone();
        let debounce_delay = self.debounce_delay;
        tokio::spawn(async move {
            Self::handle_file_events(raw_rx, config_path, event_sender, debounce_delay).await;
        });

        info!("配置文件监控已启动，监控目录: {}", watch_dir.display());
        Ok(())
    }

    /// 处理文件系统事件
    async fn handle_file_events(
        mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        config_path: PathBuf,
        event_sender: mpsc::UnboundedSender<FileChange>,
        debounce_delay: Duration,
    ) {
        let mut version = 1u64;

        while let Some(res) = raw_rx.recv().await {
            match res {
                Ok(event) => {
                    if !Self::is_target_file_event(&event, &config_path) {
                        continue;
                    }

                    debug!("检测到配置文件变更事件: {:?}", event);

                    // 防抖动处理：等待写入完成并合并期间的事件
                    if !debounce_delay.is_zero() {
                        tokio::time::sleep(debounce_delay).await;
                    }
                    while raw_rx.try_recv().is_ok() {}

                    let change = FileChange {
                        config_path: config_path.clone(),
                        timestamp: Instant::now(),
                        version,
                    };
                    version += 1;

                    if event_sender.send(change).is_err() {
                        debug!("变更事件接收端已关闭，停止处理文件事件");
                        break;
                    }
                }
                Err(e) => {
                    error!("文件监控事件错误: {}", e);
                }
            }
        }

        debug!("文件事件处理任务退出: {}", config_path.display());
    }

    /// 检查是否是目标文件的写入/创建事件
    ///
    /// 重命名到目标路径（编辑器替换保存）同样视为写入；只改元数据的事件被忽略
    fn is_target_file_event(event: &Event, target_path: &Path) -> bool {
        match &event.kind {
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Name(_))
            | EventKind::Create(_) => event
                .paths
                .iter()
                .any(|path| path.file_name() == target_path.file_name()),
            _ => false,
        }
    }

    /// 配置文件路径
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 停止监控
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("配置文件监控已停止");
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[test]
    fn test_config_file_validation() {
        let result = ConfigWatcher::validate_config_path(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::DocumentRead { .. })));

        let dir = TempDir::new().unwrap();
        let result = ConfigWatcher::validate_config_path(dir.path());
        assert!(result.is_err());

        let path = dir.path().join("config.yaml");
        fs::write(&path, "realtime_config: []").unwrap();
        assert!(ConfigWatcher::validate_config_path(&path).is_ok());
    }

    #[test]
    fn test_is_target_file_event() {
        let target = Path::new("/etc/bot/config.yaml");

        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/bot/config.yaml"));
        assert!(ConfigWatcher::is_target_file_event(&modify, target));

        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/bot/config.yaml"));
        assert!(ConfigWatcher::is_target_file_event(&create, target));

        let other_file = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/bot/other.yaml"));
        assert!(!ConfigWatcher::is_target_file_event(&other_file, target));

        let remove = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/etc/bot/config.yaml"));
        assert!(!ConfigWatcher::is_target_file_event(&remove, target));

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/etc/bot/config.yaml"));
        assert!(ConfigWatcher::is_target_file_event(&write, target));

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/etc/bot/config.yaml"));
        assert!(ConfigWatcher::is_target_file_event(&renamed, target));
    }

    #[test]
    fn test_metadata_events_are_ignored() {
        let target = Path::new("/etc/bot/config.yaml");

        for kind in [MetadataKind::Permissions, MetadataKind::WriteTime, MetadataKind::Any] {
            let event = Event::new(EventKind::Modify(ModifyKind::Metadata(kind)))
                .add_path(PathBuf::from("/etc/bot/config.yaml"));
            assert!(!ConfigWatcher::is_target_file_event(&event, target));
        }
    }

    #[test]
    fn test_watch_dir_is_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "").unwrap();

        let (watcher, _rx) = ConfigWatcher::new(&path, Duration::ZERO).unwrap();
        assert_eq!(watcher.watch_dir(), dir.path());
    }

    #[tokio::test]
    async fn test_write_emits_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "realtime_config: []").unwrap();

        let (mut watcher, mut rx) = ConfigWatcher::new(&path, Duration::from_millis(50)).unwrap();
        watcher.start().unwrap();

        fs::write(&path, "realtime_config:\n  - name: a\n    value: 1\n").unwrap();

        let change = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("等待变更事件超时")
            .expect("事件通道已关闭");
        assert_eq!(change.version, 1);
        assert_eq!(change.config_path, path);
    }
}
