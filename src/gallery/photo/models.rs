//! 照片模型定义

use crate::gallery::serialization::{deserialize_null_default, deserialize_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 照片（对应后端 `photos` 表的一行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    /// 客户端生成的 UUID
    pub id: String,
    pub event_id: String,
    /// 对象存储的公开地址
    pub url: String,
    /// 上传者显示名
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub user_name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub description: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// 新建照片请求体（created_at 由后端生成）
#[derive(Debug, Clone, Serialize)]
pub struct NewPhoto {
    pub id: String,
    pub event_id: String,
    pub url: String,
    pub user_name: String,
    pub description: String,
}
