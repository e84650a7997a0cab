//! 触发表达式
//!
//! 支持的语法：
//! - 5 字段 cron（分 时 日 月 周，秒固定为 0）
//! - 6 字段 cron（秒 分 时 日 月 周）
//! - 描述符 `@yearly`、`@annually`、`@monthly`、`@weekly`、`@daily`、`@midnight`、`@hourly`
//! - `@every <时长>`，时长语法与配置值的时长转换一致，最小 1 秒
//!
//! 周字段的数字按 crontab 习惯解释：0 和 7 都是周日，1 是周一。

use crate::config::value::parse_duration;
use crate::error::SchedulerError;
use chrono::{DateTime, Local, TimeDelta};
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;

const WEEKDAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// 解析后的触发器
#[derive(Debug, Clone)]
pub enum Trigger {
    /// cron 日程
    Cron(Box<Schedule>),
    /// 固定间隔
    Every(Duration),
}

impl Trigger {
    /// 解析触发表达式
    ///
    /// # 错误
    /// 表达式不合法时返回 [`SchedulerError::InvalidExpression`]
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let invalid = |reason: String| SchedulerError::InvalidExpression {
            expression: expression.to_string(),
            reason,
        };

        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(invalid("表达式为空".to_string()));
        }

        if let Some(rest) = trimmed.strip_prefix("@every") {
            let interval = parse_duration(rest.trim()).map_err(invalid)?;
            if interval <= TimeDelta::zero() {
                return Err(invalid("间隔必须为正数".to_string()));
            }
            // 与 cron 精度一致，按秒向下取整，最少 1 秒
            let seconds = interval.num_seconds().max(1) as u64;
            return Ok(Trigger::Every(Duration::from_secs(seconds)));
        }

        let normalized = if trimmed.starts_with('@') {
            descriptor(trimmed)
                .ok_or_else(|| invalid(format!("未知的描述符 {trimmed}")))?
                .to_string()
        } else {
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            match fields.len() {
                5 => format!(
                    "0 {} {} {} {} {}",
                    fields[0],
                    fields[1],
                    fields[2],
                    fields[3],
                    translate_weekdays(fields[4])
                ),
                6 => format!(
                    "{} {} {} {} {} {}",
                    fields[0],
                    fields[1],
                    fields[2],
                    fields[3],
                    fields[4],
                    translate_weekdays(fields[5])
                ),
                n => return Err(invalid(format!("需要 5 或 6 个字段，实际为 {n} 个"))),
            }
        };

        Schedule::from_str(&normalized)
            .map(|schedule| Trigger::Cron(Box::new(schedule)))
            .map_err(|e| invalid(e.to_string()))
    }

    /// 计算严格晚于 `after` 的下一次触发时间
    pub fn next_after(&self, after: &DateTime<Local>) -> Option<DateTime<Local>> {
        match self {
            Trigger::Cron(schedule) => schedule.after(after).next(),
            Trigger::Every(interval) => TimeDelta::from_std(*interval)
                .ok()
                .and_then(|delta| after.checked_add_signed(delta)),
        }
    }
}

fn descriptor(name: &str) -> Option<&'static str> {
    match name {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@weekly" => Some("0 0 0 * * Sun"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    }
}

/// 将周字段中的数字（0-7，0 与 7 为周日）转换为星期名称
fn translate_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = range
                .split('-')
                .map(|bound| match bound.parse::<usize>() {
                    Ok(day) if day < WEEKDAY_NAMES.len() => WEEKDAY_NAMES[day].to_string(),
                    _ => bound.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
