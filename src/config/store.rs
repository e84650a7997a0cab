//! 实时配置存储
//!
//! 持有 `realtime_config` 段的最新快照与每个键的订阅者列表。
//! 文件变更时重新加载并逐键比较，只对真正变化的键通知订阅者。
//! `values` 与 `secrets` 段不缓存，每次读取都从磁盘获取。
//!
//! 已知限制：
//! - 新文档中缺失的键保留在快照中，不发出删除通知。
//! - 回调在独立任务中异步执行，快速连续的两次变更对应的回调完成顺序不确定；
//!   订阅者若需要最终值，应在回调中读取快照或文件。

use crate::config::document::Document;
use crate::config::key::{Key, Namespace};
use crate::config::value::Value;
use crate::config::watcher::{ConfigWatcher, FileChange, DEFAULT_DEBOUNCE};
use crate::error::{ConfigError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "values/config.yaml";

/// 配置变更回调函数类型，参数为 `(新值, 旧值)`
pub type WatchCallback = Arc<dyn Fn(Value, Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// 单个键的变更
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// 变更的键
    pub key: Key,
    /// 新值
    pub new_value: Value,
    /// 旧值，新出现的键为空值
    pub old_value: Value,
}

/// 受同一把读写锁保护的状态
#[derive(Default)]
struct StoreState {
    /// 实时配置快照
    snapshot: HashMap<Key, Value>,
    /// 订阅者列表，按注册顺序保存
    callbacks: HashMap<Key, Vec<WatchCallback>>,
}

/// 实时配置存储
///
/// 进程启动时构造一次，通过 `Arc` 在各组件间共享。
pub struct ConfigStore {
    /// 配置文件路径
    path: PathBuf,
    /// 快照与订阅者
    state: RwLock<StoreState>,
    /// 串行化重载，保证两次重载的比较与快照更新不会交错
    reload_lock: Mutex<()>,
    /// 文件监控器
    watcher: Mutex<Option<ConfigWatcher>>,
    /// 文件事件防抖动延迟
    debounce_delay: Duration,
}

impl ConfigStore {
    /// 创建配置存储，尚未加载任何内容
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(StoreState::default()),
            reload_lock: Mutex::new(()),
            watcher: Mutex::new(None),
            debounce_delay: DEFAULT_DEBOUNCE,
        }
    }

    /// 设置文件事件防抖动延迟
    pub fn with_debounce(mut self, debounce_delay: Duration) -> Self {
        self.debounce_delay = debounce_delay;
        self
    }

    /// 配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载配置文件并替换快照
    ///
    /// # 错误
    /// * [`ConfigError::DocumentRead`] - 文件无法读取
    /// * [`ConfigError::DocumentParse`] - 内容格式错误
    pub async fn load(&self) -> std::result::Result<(), ConfigError> {
        let _reload = self.reload_lock.lock().await;

        let document = Document::load(&self.path).await?;
        let snapshot: HashMap<Key, Value> = document
            .realtime_entries()?
            .into_iter()
            .map(|(name, raw)| (Key::realtime(&name), Value::new(raw)))
            .collect();

        let count = snapshot.len();
        self.state.write().await.snapshot = snapshot;

        info!("配置加载完成: {}，实时配置项: {}", self.path.display(), count);
        Ok(())
    }

    /// 读取配置值
    ///
    /// 每次都从磁盘重新读取文档，不使用快照
    ///
    /// # 错误
    /// * [`ConfigError::UnknownPrefix`] - 键前缀无效
    /// * [`ConfigError::DocumentRead`] / [`ConfigError::DocumentParse`] - 文档无法读取或解析
    /// * [`ConfigError::SectionMissing`] - 文档中缺少对应配置段
    /// * [`ConfigError::KeyNotFound`] - 配置段中没有该键
    pub async fn get(&self, key: &Key) -> std::result::Result<Value, ConfigError> {
        let (namespace, name) = key.resolve()?;
        let document = Document::load(&self.path).await?;
        document.lookup(namespace, name)
    }

    /// 读取字符串配置
    pub async fn get_string(&self, key: &Key) -> Result<String> {
        Ok(self.get(key).await?.string())
    }

    /// 读取布尔配置
    pub async fn get_bool(&self, key: &Key) -> Result<bool> {
        Ok(self.get(key).await?.bool()?)
    }

    /// 读取 64 位整数配置
    pub async fn get_i64(&self, key: &Key) -> Result<i64> {
        Ok(self.get(key).await?.int64()?)
    }

    /// 注册键的变更回调
    ///
    /// 回调以 `(新值, 旧值)` 调用；同一键的多个回调按注册顺序启动，
    /// 返回的 future 各自在独立任务中运行。注册前已发生的变更不会补发。
    pub async fn watch<F, Fut>(&self, key: Key, callback: F)
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: WatchCallback = Arc::new(move |new, old| callback(new, old).boxed());
        self.watch_boxed(key, callback).await;
    }

    /// 注册已装箱的变更回调
    pub async fn watch_boxed(&self, key: Key, callback: WatchCallback) {
        if !matches!(key.namespace(), Ok(Namespace::RealtimeConfig)) {
            warn!("只有 realtime_config 键会触发变更通知: {}", key);
        }

        let mut state = self.state.write().await;
        state.callbacks.entry(key.clone()).or_default().push(callback);
        debug!("注册配置变更回调: {}", key);
    }

    /// 快照中的值
    pub async fn snapshot_value(&self, key: &Key) -> Option<Value> {
        self.state.read().await.snapshot.get(key).cloned()
    }

    /// 当前快照的副本
    pub async fn snapshot(&self) -> HashMap<Key, Value> {
        self.state.read().await.snapshot.clone()
    }

    /// 重新加载并比较快照
    ///
    /// 对每个新值与快照不同（或快照中不存在）的键更新快照，并异步通知其订阅者。
    /// 新文档中缺失的键保留在快照中，不发出删除通知。
    /// 加载失败时快照保持不变。
    ///
    /// # 返回
    /// * 本次检测到的变更列表
    pub async fn reload(&self) -> std::result::Result<Vec<ConfigChange>, ConfigError> {
        let _reload = self.reload_lock.lock().await;

        let document = Document::load(&self.path).await?;
        let entries = document.realtime_entries()?;

        let mut changes = Vec::new();
        let mut pending = Vec::new();
        {
            let mut state = self.state.write().await;
            for (name, raw) in entries {
                let key = Key::realtime(&name);
                let new_value = Value::new(raw);

                let old_value = match state.snapshot.get(&key) {
                    Some(old) if *old == new_value => continue,
                    Some(old) => old.clone(),
                    None => Value::null(),
                };

                state.snapshot.insert(key.clone(), new_value.clone());

                let change = ConfigChange {
                    key,
                    new_value,
                    old_value,
                };
                if let Some(callbacks) = state.callbacks.get(&change.key) {
                    pending.push((change.clone(), callbacks.clone()));
                }
                changes.push(change);
            }
        }

        // 回调在锁外派发，慢回调或出错的回调不会阻塞后续重载
        for (change, callbacks) in pending {
            Self::dispatch(change, callbacks);
        }

        Ok(changes)
    }

    /// 派发单个键的回调
    ///
    /// 按注册顺序调用每个回调取得其 future，再为每个 future 启动独立任务，
    /// 慢回调不会阻塞同一键的其他回调；回调 panic 会被捕获并记录
    fn dispatch(change: ConfigChange, callbacks: Vec<WatchCallback>) {
        for (index, callback) in callbacks.iter().enumerate() {
            let new_value = change.new_value.clone();
            let old_value = change.old_value.clone();
            let invocation =
                match std::panic::catch_unwind(AssertUnwindSafe(|| callback(new_value, old_value))) {
                    Ok(invocation) => invocation,
                    Err(_) => {
                        error!("配置变更回调 panic: {} (第 {} 个回调)", change.key, index + 1);
                        continue;
                    }
                };

            let key = change.key.clone();
            tokio::spawn(async move {
                if AssertUnwindSafe(invocation).catch_unwind().await.is_err() {
                    error!("配置变更回调 panic: {} (第 {} 个回调)", key, index + 1);
                }
            });
        }
    }

    /// 处理文件变更事件，失败只记录日志
    async fn handle_file_change(&self, change: FileChange) {
        debug!("处理配置文件变更，序号: {}", change.version);

        match self.reload().await {
            Ok(changes) if changes.is_empty() => {
                debug!("配置文件已变更，但实时配置没有变化");
            }
            Ok(changes) => {
                for change in &changes {
                    info!(
                        "实时配置已变更: {} = {} (原值: {})",
                        change.key, change.new_value, change.old_value
                    );
                }
            }
            Err(e) => {
                error!("配置重载失败，继续使用旧配置: {}", e);
            }
        }
    }

    /// 加载配置并开始监控文件变更
    ///
    /// # 错误
    /// 初始加载失败或无法建立文件监控时返回错误
    pub async fn start_watching(self: &Arc<Self>) -> std::result::Result<(), ConfigError> {
        self.load().await?;

        let (mut watcher, receiver) = ConfigWatcher::new(&self.path, self.debounce_delay)?;
        watcher.start()?;
        *self.watcher.lock().await = Some(watcher);

        tokio::spawn(Self::run_change_listener(Arc::downgrade(self), receiver));

        info!("配置热重载已启用: {}", self.path.display());
        Ok(())
    }

    /// 变更事件监听循环，一次只处理一个事件
    async fn run_change_listener(store: Weak<Self>, mut receiver: mpsc::UnboundedReceiver<FileChange>) {
        while let Some(change) = receiver.recv().await {
            let Some(store) = store.upgrade() else {
                break;
            };
            store.handle_file_change(change).await;
        }
        debug!("配置变更监听任务退出");
    }

    /// 停止文件监控
    pub async fn stop_watching(&self) {
        if let Some(mut watcher) = self.watcher.lock().await.take() {
            watcher.stop();
        }
    }
}
