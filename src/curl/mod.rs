//! curl 请求描述解析
//!
//! 从浏览器开发者工具复制的 curl 命令中提取请求 URL、请求头和 cookie

use crate::error::RequestParseError;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

const URL_PATTERN: &str = r#"curl\s+['"]([^'"]+)['"]"#;
const HEADER_PATTERN: &str = r#"-H\s+(?:'([^']*)'|"([^"]*)")"#;
const COOKIE_PATTERN: &str = r#"(?:-b|--cookie)\s+(?:'([^']*)'|"([^"]*)")"#;

/// 解析后的 curl 请求
///
/// 各部分相互独立，缺失的部分只在访问时报错
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurlRequest {
    url: Option<String>,
    headers: Option<HashMap<String, String>>,
    cookie: Option<String>,
}

impl CurlRequest {
    /// 解析 curl 命令文本
    ///
    /// 行尾的 `\` 续行符和换行会先被替换为空格
    pub fn parse(command: &str) -> Result<Self, RequestParseError> {
        let command = command.replace("\\\r\n", " ").replace("\\\n", " ").replace('\n', " ");

        let url = compile(URL_PATTERN)?
            .captures(&command)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        let header_regex = compile(HEADER_PATTERN)?;
        let mut matched_any = false;
        let mut headers = HashMap::new();
        for caps in header_regex.captures_iter(&command) {
            matched_any = true;
            let line = quoted(&caps);
            // 没有冒号的请求头直接忽略
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let cookie = compile(COOKIE_PATTERN)?
            .captures(&command)
            .map(|caps| quoted(&caps).to_string())
            .filter(|cookie| !cookie.is_empty());

        debug!(
            "解析 curl 命令: url={}, 请求头 {} 个, cookie={}",
            url.is_some(),
            headers.len(),
            cookie.is_some()
        );

        Ok(Self {
            url,
            headers: matched_any.then_some(headers),
            cookie,
        })
    }

    /// 请求 URL
    pub fn request_url(&self) -> Result<&str, RequestParseError> {
        self.url.as_deref().ok_or(RequestParseError::UrlNotFound)
    }

    /// 请求头（同名请求头以最后一个为准）
    pub fn headers(&self) -> Result<&HashMap<String, String>, RequestParseError> {
        self.headers.as_ref().ok_or(RequestParseError::HeadersNotFound)
    }

    /// `-b` / `--cookie` 指定的 cookie
    pub fn cookie(&self) -> Result<&str, RequestParseError> {
        self.cookie.as_deref().ok_or(RequestParseError::CookieNotFound)
    }
}

fn compile(pattern: &str) -> Result<Regex, RequestParseError> {
    Regex::new(pattern).map_err(|e| RequestParseError::InvalidPattern(e.to_string()))
}

/// 单引号或双引号中的内容
fn quoted<'a>(caps: &regex::Captures<'a>) -> &'a str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}
