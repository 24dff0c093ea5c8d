//! 工具函数模块
//!
//! 提供时间戳转换、关联结果形状归一化、话题标签提取与临时 ID 生成等通用工具函数

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use ulid::Ulid;

/// 临时实体 ID 前缀
pub const TEMP_ID_PREFIX: &str = "temp-";

/// 获取当前时间戳（毫秒）
pub fn current_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 毫秒数转换为 DateTime
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// 解析后端返回的 RFC 3339 时间戳
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 把关联查询结果归一化为单条记录
///
/// 后端可能返回对象、数组或空值：对象直接解析，数组取第一个元素，其余情况为 None。
/// 解析失败同样视为 None。
pub fn normalize_join<T: DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    let record = match value? {
        Value::Object(_) => value?.clone(),
        Value::Array(items) => items.first()?.clone(),
        _ => return None,
    };
    match serde_json::from_value(record) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::debug!(error = %err, "join record has unexpected shape");
            None
        }
    }
}

/// 提取文本中的话题标签（小写、去重、保持出现顺序）
///
/// ```
/// use flare_social_core::utils::extract_hashtags;
///
/// assert_eq!(extract_hashtags("Hello #world #World #rust_lang!"), vec!["world", "rust_lang"]);
/// ```
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if ch != '#' {
            continue;
        }
        let mut tag = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                tag.extend(next.to_lowercase());
                chars.next();
            } else {
                break;
            }
        }
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// 生成临时实体 ID：`temp-{ULID}`
pub fn new_temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Ulid::new())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// 按字符截断文本，用于通知与会话预览
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
