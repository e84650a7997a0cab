//! 配置文档加载
//!
//! 配置文档为顶层映射，包含三个可选的列表段：`values`、`realtime_config`、`secrets`，
//! 每个列表项为 `{name, value}`。支持 YAML 与 TOML 两种格式，按扩展名选择。

use crate::config::key::Namespace;
use crate::config::value::{RawValue, Value};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 配置文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// YAML（默认）
    Yaml,
    /// TOML
    Toml,
}

impl DocumentFormat {
    /// 根据文件扩展名判断格式，未知扩展名按 YAML 处理
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// 解码后的配置文档
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    path: PathBuf,
    root: RawValue,
}

impl Document {
    /// 从文件读取并解码文档
    ///
    /// # 错误
    /// * [`ConfigError::DocumentRead`] - 文件无法读取
    /// * [`ConfigError::DocumentParse`] - 内容不是合法的结构化文本
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::DocumentRead {
                    path: path.to_path_buf(),
                    source,
                })?;

        let document = Self::parse(&content, DocumentFormat::from_path(path), path)?;
        debug!("成功解码配置文档: {}", path.display());
        Ok(document)
    }

    /// 从字符串解码文档
    pub fn parse(content: &str, format: DocumentFormat, path: &Path) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::DocumentParse {
            path: path.to_path_buf(),
            message,
        };

        let root = match format {
            DocumentFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
                .map(RawValue::from)
                .map_err(|e| parse_error(format!("YAML解析失败: {e}")))?,
            DocumentFormat::Toml => toml::from_str::<toml::Table>(content)
                .map(|table| RawValue::from(toml::Value::Table(table)))
                .map_err(|e| parse_error(format!("TOML解析失败: {e}")))?,
        };

        match root {
            // 空文档视为所有配置段缺失
            RawValue::Null | RawValue::Map(_) => Ok(Self {
                path: path.to_path_buf(),
                root,
            }),
            other => Err(parse_error(format!(
                "顶层必须是映射，实际为 {}",
                other.kind()
            ))),
        }
    }

    /// 文档来源路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 获取命名空间对应的配置段
    ///
    /// # 错误
    /// 配置段缺失或不是列表时返回 [`ConfigError::SectionMissing`]
    pub fn section(&self, namespace: Namespace) -> Result<&[RawValue], ConfigError> {
        match self.root.get(namespace.section()) {
            Some(RawValue::Seq(items)) => Ok(items),
            _ => Err(ConfigError::SectionMissing {
                section: namespace.section(),
            }),
        }
    }

    /// 遍历配置段中的 `{name, value}` 条目
    ///
    /// 非映射项或缺少字符串 `name` 字段的条目会被跳过；缺少 `value` 的条目值为空
    pub fn entries(
        &self,
        namespace: Namespace,
    ) -> Result<impl Iterator<Item = (&str, &RawValue)> + '_, ConfigError> {
        Ok(self.section(namespace)?.iter().filter_map(entry_of))
    }

    /// 在配置段中查找第一个名称匹配的条目
    ///
    /// # 错误
    /// * [`ConfigError::SectionMissing`] - 配置段缺失
    /// * [`ConfigError::KeyNotFound`] - 无匹配条目
    pub fn lookup(&self, namespace: Namespace, name: &str) -> Result<Value, ConfigError> {
        self.entries(namespace)?
            .find(|(entry_name, _)| *entry_name == name)
            .map(|(_, value)| Value::new(value.clone()))
            .ok_or_else(|| ConfigError::KeyNotFound {
                key: format!("{}{}", namespace.prefix(), name),
            })
    }

    /// 实时配置条目
    ///
    /// `realtime_config` 段缺失时返回空列表；存在但不是列表时视为解析错误
    pub fn realtime_entries(&self) -> Result<Vec<(String, RawValue)>, ConfigError> {
        let section = Namespace::RealtimeConfig.section();
        match self.root.get(section) {
            None | Some(RawValue::Null) => Ok(Vec::new()),
            Some(RawValue::Seq(items)) => Ok(items
                .iter()
                .filter_map(entry_of)
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect()),
            Some(other) => Err(ConfigError::DocumentParse {
                path: self.path.clone(),
                message: format!("{section} 必须是列表，实际为 {}", other.kind()),
            }),
        }
    }
}

fn entry_of(item: &RawValue) -> Option<(&str, &RawValue)> {
    static NULL: RawValue = RawValue::Null;
    match item.get("name") {
        Some(RawValue::String(name)) => Some((name.as_str(), item.get("value").unwrap_or(&NULL))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DOCUMENT_YAML: &str = r#"
values:
  - name: curl_file
    value: values/curl.txt
realtime_config:
  - name: send_enabled
    value: false
  - value: orphan
  - name: chat_id
    value: 12345
  - name: chat_id
    value: 999
secrets: []
"#;

    fn yaml(content: &str) -> Document {
        Document::parse(content, DocumentFormat::Yaml, Path::new("config.yaml")).unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/config.toml")),
            DocumentFormat::Toml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("config.yml")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("config")),
            DocumentFormat::Yaml
        );
    }

    #[test]
    fn test_lookup_first_match() {
        let doc = yaml(TEST_DOCUMENT_YAML);
        let value = doc.lookup(Namespace::RealtimeConfig, "chat_id").unwrap();
        assert_eq!(value.int64().unwrap(), 12345);

        let curl = doc.lookup(Namespace::Values, "curl_file").unwrap();
        assert_eq!(curl.string(), "values/curl.txt");
    }

    #[test]
    fn test_lookup_errors() {
        let doc = yaml(TEST_DOCUMENT_YAML);
        assert!(matches!(
            doc.lookup(Namespace::Secrets, "token"),
            Err(ConfigError::KeyNotFound { .. })
        ));

        let doc = yaml("values: []\n");
        assert!(matches!(
            doc.lookup(Namespace::Secrets, "token"),
            Err(ConfigError::SectionMissing { section: "secrets" })
        ));
    }

    #[test]
    fn test_realtime_entries_skip_nameless() {
        let doc = yaml(TEST_DOCUMENT_YAML);
        let names: Vec<String> = doc
            .realtime_entries()
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["send_enabled", "chat_id", "chat_id"]);
    }

    #[test]
    fn test_realtime_section_absent_or_invalid() {
        assert!(yaml("values: []").realtime_entries().unwrap().is_empty());
        assert!(yaml("realtime_config: ~").realtime_entries().unwrap().is_empty());

        let doc = yaml("realtime_config: 3");
        assert!(matches!(
            doc.realtime_entries(),
            Err(ConfigError::DocumentParse { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        let result = Document::parse(
            "realtime_config: [unclosed",
            DocumentFormat::Yaml,
            Path::new("config.yaml"),
        );
        assert!(matches!(result, Err(ConfigError::DocumentParse { .. })));

        let result = Document::parse("- 1\n- 2\n", DocumentFormat::Yaml, Path::new("config.yaml"));
        assert!(matches!(result, Err(ConfigError::DocumentParse { .. })));
    }

    #[test]
    fn test_toml_document() {
        let content = r#"
[[realtime_config]]
name = "cron_expr"
value = "*/5 * * * *"

[[values]]
name = "curl_file"
value = "curl.txt"
"#;
        let doc = Document::parse(content, DocumentFormat::Toml, Path::new("config.toml")).unwrap();
        assert_eq!(
            doc.lookup(Namespace::RealtimeConfig, "cron_expr")
                .unwrap()
                .string(),
            "*/5 * * * *"
        );
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = Document::load(Path::new("/nonexistent/config.yaml")).await;
        assert!(matches!(result, Err(ConfigError::DocumentRead { .. })));
    }
}
