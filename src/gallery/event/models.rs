//! 活动模型定义

use crate::gallery::serialization::deserialize_optional_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 创建活动时写入的固定创建者标识
pub const DEFAULT_ORGANIZER_ID: &str = "organizer";

/// 活动（对应后端 `events` 表的一行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// 6 位公开邀请码
    pub code: String,
    pub name: String,
    /// 8 位组织者口令，与邀请码相互独立
    pub organizer_code: String,
    #[serde(default)]
    pub organizer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    /// 将推送过来的部分字段覆盖到当前活动上，返回合并后的活动
    ///
    /// `patch` 中缺失的字段保持原值；合并结果无法解析时返回错误，原值不变。
    pub fn merged_with(&self, patch: &serde_json::Value) -> anyhow::Result<Event> {
        let mut base = serde_json::to_value(self)?;
        if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
            for (key, value) in patch_obj {
                base_obj.insert(key.clone(), value.clone());
            }
        }
        Ok(serde_json::from_value(base)?)
    }
}

/// 新建活动请求体
#[derive(Debug, Clone, Serialize)]
pub struct NewEvent {
    pub name: String,
    pub code: String,
    pub organizer_code: String,
    pub organizer_id: String,
}
