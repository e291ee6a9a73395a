//! 变更推送的数据结构
//!
//! 线上协议为 Phoenix channel（JSON 帧：`topic / event / payload / ref`），
//! 行级变更在 `postgres_changes` 事件的 `payload.data` 中。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Phoenix 保留事件名
pub mod phx_event {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const POSTGRES_CHANGES: &str = "postgres_changes";
}

/// 心跳使用的固定 topic
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Phoenix 消息帧
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhxMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

/// `phx_reply` 的 payload
#[derive(Debug, Clone, Deserialize)]
pub struct PhxReply {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

/// 行级变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// 订阅关心的变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvents {
    All,
    Only(ChangeKind),
}

impl ChangeEvents {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEvents::All => "*",
            ChangeEvents::Only(kind) => kind.as_str(),
        }
    }

    pub fn accepts(&self, kind: ChangeKind) -> bool {
        match self {
            ChangeEvents::All => true,
            ChangeEvents::Only(only) => *only == kind,
        }
    }
}

/// 订阅条件：表 + 变更类型 + 单列等值过滤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub events: ChangeEvents,
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    /// 某活动下照片的全部变更
    pub fn photos_of_event(event_id: &str) -> Self {
        Self {
            table: "photos".to_string(),
            events: ChangeEvents::All,
            column: "event_id".to_string(),
            value: event_id.to_string(),
        }
    }

    /// 某活动本身的更新
    pub fn event_updates(event_id: &str) -> Self {
        Self {
            table: "events".to_string(),
            events: ChangeEvents::Only(ChangeKind::Update),
            column: "id".to_string(),
            value: event_id.to_string(),
        }
    }

    /// 过滤表达式，例如 `event_id=eq.123`
    pub fn filter_expr(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// join 时发送的 postgres_changes 配置项
    pub fn to_join_config(&self) -> Value {
        serde_json::json!({
            "event": self.events.as_str(),
            "schema": "public",
            "table": self.table,
            "filter": self.filter_expr(),
        })
    }

    /// 变更是否命中本条件（删除事件按旧行判断）
    ///
    /// 删除事件的旧行通常只带主键，缺少过滤列时视为命中，由服务端过滤保证归属。
    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.table || !self.events.accepts(change.kind) {
            return false;
        }
        let row = match change.kind {
            ChangeKind::Delete => &change.old_record,
            _ => &change.record,
        };
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(other) => other.to_string() == self.value,
            None => change.kind == ChangeKind::Delete,
        }
    }
}

/// 一条行级变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Value,
    #[serde(default)]
    pub old_record: Value,
}

impl RowChange {
    /// 变更行的主键（删除事件取旧行）
    pub fn row_id(&self) -> Option<&str> {
        let row = match self.kind {
            ChangeKind::Delete => &self.old_record,
            _ => &self.record,
        };
        row.get("id").and_then(Value::as_str)
    }
}

/// 一个订阅：持有接收端，drop 时自动退订
pub struct ChangeSubscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<RowChange>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl ChangeSubscription {
    pub fn new(
        topic: String,
        receiver: mpsc::UnboundedReceiver<RowChange>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            topic,
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 等待下一条变更；连接关闭或被服务端踢出时返回 None
    pub async fn recv(&mut self) -> Option<RowChange> {
        self.receiver.recv().await
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("topic", &self.topic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn postgres_changes_payload_decodes() {
        let frame: PhxMessage = serde_json::from_value(json!({
            "topic": "realtime:photos-1",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "columns": [],
                    "commit_timestamp": "2024-05-01T10:00:00Z",
                    "errors": null,
                    "schema": "public",
                    "table": "photos",
                    "type": "DELETE",
                    "record": {},
                    "old_record": { "id": "p9" }
                },
                "ids": [1]
            },
            "ref": null
        }))
        .unwrap();
        let change: RowChange = serde_json::from_value(frame.payload["data"].clone()).unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.row_id(), Some("p9"));
    }

    #[test]
    fn filter_matches_table_kind_and_column() {
        let filter = ChangeFilter::photos_of_event("e1");
        assert_eq!(filter.filter_expr(), "event_id=eq.e1");
        let insert = RowChange {
            table: "photos".into(),
            kind: ChangeKind::Insert,
            record: json!({ "id": "p1", "event_id": "e1" }),
            old_record: Value::Null,
        };
        assert!(filter.matches(&insert));

        let other_event = RowChange {
            record: json!({ "id": "p2", "event_id": "e2" }),
            ..insert.clone()
        };
        assert!(!filter.matches(&other_event));

        let updates = ChangeFilter::event_updates("e1");
        assert!(!updates.matches(&insert));
        assert_eq!(updates.to_join_config()["event"], "UPDATE");
    }

    #[test]
    fn delete_with_key_only_old_record_matches() {
        let filter = ChangeFilter::photos_of_event("e1");
        let key_only = RowChange {
            table: "photos".into(),
            kind: ChangeKind::Delete,
            record: Value::Null,
            old_record: json!({ "id": "p1" }),
        };
        assert!(filter.matches(&key_only));

        let other_event = RowChange {
            old_record: json!({ "id": "p2", "event_id": "e2" }),
            ..key_only.clone()
        };
        assert!(!filter.matches(&other_event));

        // 非删除事件缺少过滤列不命中
        let insert = RowChange {
            kind: ChangeKind::Insert,
            record: json!({ "id": "p3" }),
            ..key_only
        };
        assert!(!filter.matches(&insert));
    }

    #[test]
    fn dropping_subscription_runs_unsubscribe_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        let sub = ChangeSubscription::new("t".into(), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
