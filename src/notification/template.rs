//! 消息模板模块
//!
//! 使用 Handlebars 渲染消息文本，内置两个辅助函数：
//! - `{{NOW}}`：当前本地时间（RFC 3339）
//! - `{{DEBUG}}`：程序版本与运行平台信息（JSON）

use crate::error::NotificationError;
use chrono::{Local, SecondsFormat};
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason,
};
use serde_json::json;

/// 消息模板渲染器
pub struct MessageTemplate {
    registry: Handlebars<'static>,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTemplate {
    /// 创建注册了内置辅助函数的渲染器
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        // 消息是纯文本，不做 HTML 转义
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("NOW", Box::new(now_helper));
        registry.register_helper("DEBUG", Box::new(debug_helper));
        Self { registry }
    }

    /// 渲染模板
    ///
    /// # 参数
    /// * `template` - 模板字符串
    ///
    /// # 返回
    /// * `Result<String, NotificationError>` - 渲染后的文本
    pub fn render(&self, template: &str) -> Result<String, NotificationError> {
        self.registry
            .render_template(template, &())
            .map_err(|e| NotificationError::TemplateError(e.to_string()))
    }
}

/// 使用默认渲染器渲染模板
pub fn render_template(template: &str) -> Result<String, NotificationError> {
    MessageTemplate::new().render(template)
}

fn now_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&Local::now().to_rfc3339_opts(SecondsFormat::Secs, false))?;
    Ok(())
}

fn debug_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let info = json!({
        "app": crate::APP_NAME,
        "version": crate::VERSION,
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    });
    let encoded =
        serde_json::to_string(&info).map_err(|e| RenderErrorReason::Other(e.to_string()))?;
    out.write(&encoded)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(render_template("ping <b>&</b>").unwrap(), "ping <b>&</b>");
    }

    #[test]
    fn test_now_helper() {
        let rendered = render_template("{{NOW}}").unwrap();
        assert!(DateTime::parse_from_rfc3339(&rendered).is_ok(), "{rendered}");
    }

    #[test]
    fn test_debug_helper() {
        let rendered = render_template("info: {{DEBUG}}").unwrap();
        let json = rendered.strip_prefix("info: ").unwrap();
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["version"], crate::VERSION);
        assert_eq!(value["os"], std::env::consts::OS);
    }

    #[test]
    fn test_invalid_template() {
        let err = render_template("{{#if}}").unwrap_err();
        assert!(matches!(err, NotificationError::TemplateError(_)));
    }
}
