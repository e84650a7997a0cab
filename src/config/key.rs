//! 配置键定义
//!
//! 配置键带有强制的命名空间前缀（`values.`、`realtime_config.`、`secrets.`），
//! 前缀决定解析时使用文档中的哪个配置段

use crate::error::ConfigError;
use std::borrow::Cow;
use std::fmt;

/// 配置键命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// 静态配置值，每次读取都从磁盘获取
    Values,
    /// 实时配置，参与快照与变更通知
    RealtimeConfig,
    /// 密钥，每次读取都从磁盘获取
    Secrets,
}

impl Namespace {
    /// 全部命名空间
    pub const ALL: [Namespace; 3] = [
        Namespace::Values,
        Namespace::RealtimeConfig,
        Namespace::Secrets,
    ];

    /// 文档中对应的配置段名称
    pub fn section(self) -> &'static str {
        match self {
            Namespace::Values => "values",
            Namespace::RealtimeConfig => "realtime_config",
            Namespace::Secrets => "secrets",
        }
    }

    /// 键前缀（含结尾的点）
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Values => "values.",
            Namespace::RealtimeConfig => "realtime_config.",
            Namespace::Secrets => "secrets.",
        }
    }
}

/// 配置键
///
/// 键一经构造不可变。推荐通过 [`Key::value`]、[`Key::realtime`]、[`Key::secret`]
/// 构造；[`Key::new`] 接受任意字符串，前缀在解析时才校验。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// 从任意字符串构造键（不校验前缀）
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Cow::Owned(raw.into()))
    }

    /// 从静态字符串构造键，可用于常量
    pub const fn from_static(raw: &'static str) -> Self {
        Self(Cow::Borrowed(raw))
    }

    /// 构造 `values.<name>` 键
    pub fn value(name: &str) -> Self {
        Self::in_namespace(Namespace::Values, name)
    }

    /// 构造 `realtime_config.<name>` 键
    pub fn realtime(name: &str) -> Self {
        Self::in_namespace(Namespace::RealtimeConfig, name)
    }

    /// 构造 `secrets.<name>` 键
    pub fn secret(name: &str) -> Self {
        Self::in_namespace(Namespace::Secrets, name)
    }

    fn in_namespace(namespace: Namespace, name: &str) -> Self {
        Self(Cow::Owned(format!("{}{}", namespace.prefix(), name)))
    }

    /// 完整键字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 解析命名空间与去掉前缀后的条目名
    ///
    /// # 错误
    /// 前缀不属于三个已知命名空间时返回 [`ConfigError::UnknownPrefix`]
    pub fn resolve(&self) -> Result<(Namespace, &str), ConfigError> {
        Namespace::ALL
            .iter()
            .find_map(|ns| self.0.strip_prefix(ns.prefix()).map(|name| (*ns, name)))
            .ok_or_else(|| ConfigError::UnknownPrefix {
                key: self.0.to_string(),
            })
    }

    /// 键所属命名空间
    pub fn namespace(&self) -> Result<Namespace, ConfigError> {
        self.resolve().map(|(ns, _)| ns)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// 应用使用的配置键
pub mod keys {
    use super::Key;

    /// 保存从浏览器开发者工具复制的 cURL 请求的文件路径
    pub const CURL_FILE: Key = Key::from_static("values.curl_file");
    /// 发送任务的 cron 表达式
    pub const CRON_EXPR: Key = Key::from_static("realtime_config.cron_expr");
    /// 消息文本模板
    pub const MESSAGE_TEXT: Key = Key::from_static("realtime_config.message_text");
    /// 消息标记（JSON 数组字符串）
    pub const MARKUP: Key = Key::from_static("realtime_config.markup");
    /// 接收消息的会话 ID
    pub const CHAT_ID: Key = Key::from_static("realtime_config.chat_id");
    /// 是否启用发送
    pub const SEND_ENABLED: Key = Key::from_static("realtime_config.send_enabled");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_constructors() {
        assert_eq!(Key::value("curl_file").as_str(), "values.curl_file");
        assert_eq!(Key::realtime("chat_id").as_str(), "realtime_config.chat_id");
        assert_eq!(Key::secret("token").as_str(), "secrets.token");
    }

    #[test]
    fn test_resolve_known_prefixes() {
        let key = keys::CRON_EXPR;
        let (ns, name) = key.resolve().unwrap();
        assert_eq!(ns, Namespace::RealtimeConfig);
        assert_eq!(name, "cron_expr");

        assert_eq!(keys::CURL_FILE.namespace().unwrap(), Namespace::Values);
        assert_eq!(Key::secret("a.b").resolve().unwrap(), (Namespace::Secrets, "a.b"));
    }

    #[test]
    fn test_resolve_unknown_prefix() {
        let err = Key::new("other.thing").resolve().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPrefix { ref key } if key == "other.thing"));

        // 没有点分隔符的前缀同样无效
        assert!(Key::new("values").resolve().is_err());
    }

    #[test]
    fn test_static_and_owned_keys_compare_equal() {
        assert_eq!(keys::CHAT_ID, Key::realtime("chat_id"));
        assert_eq!(keys::SEND_ENABLED.to_string(), "realtime_config.send_enabled");
    }
}
