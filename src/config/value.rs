//! 配置值与类型转换
//!
//! [`RawValue`] 是文档解码后的无类型值（标量或嵌套结构），
//! [`Value`] 对其进行包装并按需转换为具体类型。转换不修改值本身，
//! 重复调用结果一致。

use crate::error::ValueError;
use chrono::TimeDelta;
use std::collections::BTreeMap;
use std::fmt;

/// 文档解码后的原始值
///
/// 相等比较为结构化的深度比较：标量按值比较，序列逐项比较，映射按键值比较
/// （与键的出现顺序无关）。整数 `1` 与浮点数 `1.0` 视为不同的值。
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    /// 空值（字段缺失或显式 null）
    #[default]
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮点数
    Float(f64),
    /// 字符串
    String(String),
    /// 序列
    Seq(Vec<RawValue>),
    /// 映射
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// 原始值的类型名称，用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::Float(_) => "float",
            RawValue::String(_) => "string",
            RawValue::Seq(_) => "sequence",
            RawValue::Map(_) => "mapping",
        }
    }

    /// 以映射方式访问字段
    pub fn get(&self, field: &str) -> Option<&RawValue> {
        match self {
            RawValue::Map(map) => map.get(field),
            _ => None,
        }
    }

    /// 转换为 JSON 值
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            RawValue::Null => Json::Null,
            RawValue::Bool(b) => Json::Bool(*b),
            RawValue::Int(i) => Json::from(*i),
            RawValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            RawValue::String(s) => Json::String(s.clone()),
            RawValue::Seq(items) => Json::Array(items.iter().map(RawValue::to_json).collect()),
            RawValue::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_yaml::Value> for RawValue {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;
        match value {
            Yaml::Null => RawValue::Null,
            Yaml::Bool(b) => RawValue::Bool(b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Int(i),
                // 超出 i64 范围的无符号整数退化为浮点数
                None => RawValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Yaml::String(s) => RawValue::String(s),
            Yaml::Sequence(items) => RawValue::Seq(items.into_iter().map(RawValue::from).collect()),
            Yaml::Mapping(mapping) => RawValue::Map(
                mapping
                    .into_iter()
                    .map(|(k, v)| (RawValue::from(k).to_string(), RawValue::from(v)))
                    .collect(),
            ),
            Yaml::Tagged(tagged) => RawValue::from(tagged.value),
        }
    }
}

impl From<toml::Value> for RawValue {
    fn from(value: toml::Value) -> Self {
        use toml::Value as Toml;
        match value {
            Toml::String(s) => RawValue::String(s),
            Toml::Integer(i) => RawValue::Int(i),
            Toml::Float(f) => RawValue::Float(f),
            Toml::Boolean(b) => RawValue::Bool(b),
            Toml::Datetime(dt) => RawValue::String(dt.to_string()),
            Toml::Array(items) => RawValue::Seq(items.into_iter().map(RawValue::from).collect()),
            Toml::Table(table) => RawValue::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (k, RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Int(i) => write!(f, "{i}"),
            RawValue::Float(x) => write!(f, "{x}"),
            RawValue::String(s) => f.write_str(s),
            RawValue::Seq(_) | RawValue::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

/// 配置值
///
/// 构造后不可变，类型访问器要么成功要么返回 [`ValueError::TypeMismatch`]，
/// 不产生任何副作用。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Value {
    raw: RawValue,
}

impl Value {
    /// 包装原始值
    pub fn new(raw: RawValue) -> Self {
        Self { raw }
    }

    /// 空值（新出现的键的旧值）
    pub fn null() -> Self {
        Self::default()
    }

    /// 原始值
    pub fn raw(&self) -> &RawValue {
        &self.raw
    }

    /// 是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self.raw, RawValue::Null)
    }

    /// 转换为 32 位整数，数值类型直接截断
    pub fn int(&self) -> Result<i32, ValueError> {
        match &self.raw {
            RawValue::Int(i) => Ok(*i as i32),
            RawValue::Float(f) => Ok(*f as i32),
            RawValue::String(s) => s.parse::<i32>().map_err(|e| self.mismatch("int", e)),
            _ => Err(self.unsupported("int")),
        }
    }

    /// 转换为 64 位整数
    pub fn int64(&self) -> Result<i64, ValueError> {
        match &self.raw {
            RawValue::Int(i) => Ok(*i),
            RawValue::Float(f) => Ok(*f as i64),
            RawValue::String(s) => s.parse::<i64>().map_err(|e| self.mismatch("int64", e)),
            _ => Err(self.unsupported("int64")),
        }
    }

    /// 转换为 32 位浮点数
    pub fn float32(&self) -> Result<f32, ValueError> {
        match &self.raw {
            RawValue::Int(i) => Ok(*i as f32),
            RawValue::Float(f) => Ok(*f as f32),
            RawValue::String(s) => s.parse::<f32>().map_err(|e| self.mismatch("float32", e)),
            _ => Err(self.unsupported("float32")),
        }
    }

    /// 转换为 64 位浮点数
    pub fn float64(&self) -> Result<f64, ValueError> {
        match &self.raw {
            RawValue::Int(i) => Ok(*i as f64),
            RawValue::Float(f) => Ok(*f),
            RawValue::String(s) => s.parse::<f64>().map_err(|e| self.mismatch("float64", e)),
            _ => Err(self.unsupported("float64")),
        }
    }

    /// 转换为布尔值
    ///
    /// 字符串接受 `true`/`false`/`1`/`0`/`t`/`f`，不区分大小写
    pub fn bool(&self) -> Result<bool, ValueError> {
        match &self.raw {
            RawValue::Bool(b) => Ok(*b),
            RawValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(self.mismatch("bool", format!("无效的布尔字面量 {s:?}"))),
            },
            _ => Err(self.unsupported("bool")),
        }
    }

    /// 转换为字符串，任何值都有规范文本形式
    pub fn string(&self) -> String {
        self.raw.to_string()
    }

    /// 转换为时长
    ///
    /// 字符串按 `"1h30m"`、`"-1.5s"`、`"300ms"` 形式解析；数值视为纳秒数
    pub fn duration(&self) -> Result<TimeDelta, ValueError> {
        match &self.raw {
            RawValue::Int(i) => Ok(TimeDelta::nanoseconds(*i)),
            RawValue::Float(f) => Ok(TimeDelta::nanoseconds(*f as i64)),
            RawValue::String(s) => parse_duration(s).map_err(|e| self.mismatch("duration", e)),
            _ => Err(self.unsupported("duration")),
        }
    }

    fn mismatch(&self, target: &'static str, detail: impl fmt::Display) -> ValueError {
        ValueError::TypeMismatch {
            target,
            found: self.raw.kind(),
            detail: detail.to_string(),
        }
    }

    fn unsupported(&self, target: &'static str) -> ValueError {
        self.mismatch(target, "不支持的类型")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl From<RawValue> for Value {
    fn from(raw: RawValue) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::new(RawValue::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::new(RawValue::String(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::new(RawValue::Int(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::new(RawValue::Float(f))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::new(RawValue::Bool(b))
    }
}

const NANOSECOND: u128 = 1;
const MICROSECOND: u128 = 1_000 * NANOSECOND;
const MILLISECOND: u128 = 1_000 * MICROSECOND;
const SECOND: u128 = 1_000 * MILLISECOND;
const MINUTE: u128 = 60 * SECOND;
const HOUR: u128 = 60 * MINUTE;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(NANOSECOND),
        "us" | "µs" | "μs" => Some(MICROSECOND),
        "ms" => Some(MILLISECOND),
        "s" => Some(SECOND),
        "m" => Some(MINUTE),
        "h" => Some(HOUR),
        _ => None,
    }
}

/// 解析带单位的时长字符串
///
/// 语法：可选符号，后接一个或多个 `<十进制数><单位>`，单位为
/// `ns`、`us`（`µs`）、`ms`、`s`、`m`、`h`。单独的 `"0"` 表示零时长。
pub fn parse_duration(input: &str) -> Result<TimeDelta, String> {
    let invalid = || format!("无效的时长 {input:?}");

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if unit_len == 0 {
            return Err(format!("时长缺少单位 {input:?}"));
        }
        let unit = unit_nanos(&rest[..unit_len])
            .ok_or_else(|| format!("未知的时长单位 {:?} in {input:?}", &rest[..unit_len]))?;
        rest = &rest[unit_len..];

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut component = whole.checked_mul(unit).ok_or_else(invalid)?;

        // 小数部分超过 18 位后对纳秒精度没有影响
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        if !frac_digits.is_empty() {
            let frac: u128 = frac_digits.parse().map_err(|_| invalid())?;
            let scale = 10u128.pow(frac_digits.len() as u32);
            component += frac * unit / scale;
        }

        total = total.checked_add(component).ok_or_else(invalid)?;
    }

    let limit = if negative {
        i64::MAX as u128 + 1
    } else {
        i64::MAX as u128
    };
    if total > limit {
        return Err(invalid());
    }

    let nanos = if negative {
        (total as i128).wrapping_neg() as i64
    } else {
        total as i64
    };
    Ok(TimeDelta::nanoseconds(nanos))
}
