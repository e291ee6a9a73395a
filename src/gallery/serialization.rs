use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// 反序列化时将 null 视为默认值（后端可选列常返回 null）
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let opt = Option::<T>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 解析后端时间戳
///
/// 表接口返回 RFC 3339，变更推送中可能出现 Postgres 文本格式（`2024-05-01 10:00:00.123+00`）。
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// 可选时间戳：缺失或 null 为 None，其余同 [`deserialize_timestamp`]
pub fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("无法解析时间戳 {}: {}", raw, e))
}

/// 选择器接受的图片扩展名
pub const ACCEPTED_IMAGE_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

/// 文件名中的扩展名（小写，不含点）
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}

/// 根据扩展名推断图片 MIME 类型
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// MIME 类型的子类型部分，例如 `image/jpeg; charset=binary` -> `jpeg`
pub fn content_subtype(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    let (_, subtype) = essence.split_once('/')?;
    let subtype = subtype.trim();
    if subtype.is_empty() {
        None
    } else {
        Some(subtype.to_ascii_lowercase())
    }
}

/// 由 MIME 类型得到存储时使用的扩展名
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_subtype(content_type)?.as_str() {
        "jpeg" | "jpg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "heic" => Some("heic"),
        _ => None,
    }
}

/// 构造 `data:` URI（用于本地预览）
pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    use base64::Engine;
    format!(
        "data:{};base64,{}",
        content_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// 文件名中不允许出现路径分隔符
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}
