//! 本地会话存储（DAO）
//!
//! 键值表 `local_storage`，只用到两个键：`event`（活动快照 JSON）和 `userName`。
//! 两个键都存在才视为有会话。

use crate::gallery::event::Event;
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, warn};

pub const EVENT_KEY: &str = "event";
pub const USER_NAME_KEY: &str = "userName";

/// 会话 DAO（基于 sqlx）
#[derive(Clone)]
pub struct SessionDao {
    db: Pool<Sqlite>,
}

impl SessionDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM local_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("读取本地存储失败: {}", key))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .with_context(|| format!("写入本地存储失败: {}", key))?;
        debug!("[SessionDAO] 写入 {}", key);
        Ok(())
    }

    pub async fn remove_item(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_storage WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .with_context(|| format!("删除本地存储失败: {}", key))?;
        Ok(())
    }

    /// 读取上次的会话；活动快照损坏时视为没有会话
    pub async fn load_session(&self) -> Result<Option<(Event, String)>> {
        let event_json = self.get_item(EVENT_KEY).await?;
        let user_name = self.get_item(USER_NAME_KEY).await?;

        let (Some(event_json), Some(user_name)) = (event_json, user_name) else {
            debug!("[SessionDAO] 本地无会话");
            return Ok(None);
        };
        if user_name.is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<Event>(&event_json) {
            Ok(event) => {
                info!(
                    "[SessionDAO] 恢复会话: 活动={}, 用户={}",
                    event.name, user_name
                );
                Ok(Some((event, user_name)))
            }
            Err(e) => {
                warn!("[SessionDAO] ⚠️ 本地活动快照损坏，忽略: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn save_session(&self, event: &Event, user_name: &str) -> Result<()> {
        self.save_event(event).await?;
        self.set_item(USER_NAME_KEY, user_name).await
    }

    pub async fn save_event(&self, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event).context("序列化活动失败")?;
        self.set_item(EVENT_KEY, &json).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.remove_item(EVENT_KEY).await?;
        self.remove_item(USER_NAME_KEY).await?;
        info!("[SessionDAO] 🧹 已清除本地会话");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::db::create_sqlite_pool_with_migration;

    fn event() -> Event {
        Event {
            id: "ev-1".into(),
            code: "ABC123".into(),
            name: "Wedding".into(),
            organizer_code: "ORG12345".into(),
            organizer_id: "organizer".into(),
            cover_image: None,
            created_at: None,
        }
    }

    async fn dao_in(dir: &tempfile::TempDir) -> SessionDao {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("session.db").display());
        SessionDao::new(create_sqlite_pool_with_migration(&url).await.unwrap())
    }

    #[tokio::test]
    async fn session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        dao_in(&dir).await.save_session(&event(), "Al").await.unwrap();

        let reopened = dao_in(&dir).await;
        let (ev, name) = reopened.load_session().await.unwrap().unwrap();
        assert_eq!(ev, event());
        assert_eq!(name, "Al");
    }

    #[tokio::test]
    async fn missing_key_means_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let dao = dao_in(&dir).await;
        dao.save_event(&event()).await.unwrap();
        assert!(dao.load_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_ignored_and_clear_removes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let dao = dao_in(&dir).await;
        dao.set_item(EVENT_KEY, "{not json").await.unwrap();
        dao.set_item(USER_NAME_KEY, "Al").await.unwrap();
        assert!(dao.load_session().await.unwrap().is_none());

        dao.clear().await.unwrap();
        assert_eq!(dao.get_item(EVENT_KEY).await.unwrap(), None);
        assert_eq!(dao.get_item(USER_NAME_KEY).await.unwrap(), None);
    }
}
