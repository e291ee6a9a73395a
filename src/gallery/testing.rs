//! 测试用内存后端
//!
//! 行为与远程后端一致：照片插入会回推给匹配的订阅，封面更新会推送活动 UPDATE。
//! 支持按调用序号注入上传 / 入库失败，以及按地址注入下载失败。

use crate::gallery::backend::GalleryBackend;
use crate::gallery::event::{Event, NewEvent};
use crate::gallery::photo::{NewPhoto, Photo};
use crate::gallery::realtime::{ChangeFilter, ChangeKind, ChangeSubscription, RowChange};
use crate::gallery::storage::FetchedObject;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct MemoryState {
    events: Vec<Event>,
    photos: Vec<Photo>,
    /// key: `bucket/path`
    objects: HashMap<String, (Vec<u8>, String)>,
    subscribers: Vec<(ChangeFilter, mpsc::UnboundedSender<RowChange>)>,
    upload_calls: usize,
    insert_calls: usize,
    fail_upload_at: Option<usize>,
    fail_insert_at: Option<usize>,
    fail_lookups: bool,
    failing_urls: HashSet<String>,
    clock: i64,
    disconnect_calls: usize,
}

impl MemoryState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        Utc.timestamp_opt(1_714_557_600 + self.clock, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn broadcast(&mut self, change: RowChange) {
        self.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (filter, tx) in &self.subscribers {
            if filter.matches(&change) {
                let _ = tx.send(change.clone());
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_event(&self, event: Event) {
        self.state().events.push(event);
    }

    pub fn add_photo(&self, photo: Photo) {
        self.state().photos.push(photo);
    }

    /// 第 `index` 次（从 0 开始）上传失败
    pub fn fail_upload_at(&self, index: usize) {
        self.state().fail_upload_at = Some(index);
    }

    /// 第 `index` 次（从 0 开始）入库失败
    pub fn fail_insert_at(&self, index: usize) {
        self.state().fail_insert_at = Some(index);
    }

    pub fn fail_lookups(&self) {
        self.state().fail_lookups = true;
    }

    pub fn fail_fetch(&self, url: &str) {
        self.state().failing_urls.insert(url.to_string());
    }

    pub fn put_object(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) {
        self.state().objects.insert(
            format!("{}/{}", bucket, path),
            (bytes.to_vec(), content_type.to_string()),
        );
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        let prefix = format!("{}/", bucket);
        self.state()
            .objects
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .count()
    }

    pub fn photo_rows(&self, event_id: &str) -> usize {
        self.state()
            .photos
            .iter()
            .filter(|p| p.event_id == event_id)
            .count()
    }

    pub fn event(&self, event_id: &str) -> Option<Event> {
        self.state().events.iter().find(|e| e.id == event_id).cloned()
    }

    /// 活跃订阅数（已关闭的接收端不计）
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.len()
    }

    /// 模拟其他客户端触发的变更
    pub fn push(&self, change: RowChange) {
        self.state().broadcast(change);
    }

    /// 删除一行照片并推送 DELETE（旧行带主键和 event_id）
    pub fn delete_photo(&self, photo_id: &str) {
        let mut state = self.state();
        let Some(index) = state.photos.iter().position(|p| p.id == photo_id) else {
            return;
        };
        let removed = state.photos.remove(index);
        state.broadcast(RowChange {
            table: "photos".into(),
            kind: ChangeKind::Delete,
            record: serde_json::json!({}),
            old_record: serde_json::json!({ "id": removed.id, "event_id": removed.event_id }),
        });
    }

    /// 绕过订阅条件，直接投递给某张表的全部订阅
    pub fn push_to_table(&self, change: RowChange) {
        let mut state = self.state();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (filter, tx) in &state.subscribers {
            if filter.table == change.table {
                let _ = tx.send(change.clone());
            }
        }
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state().disconnect_calls
    }
}

#[async_trait]
impl GalleryBackend for MemoryBackend {
    async fn insert_event(&self, new_event: &NewEvent) -> Result<Event> {
        let mut state = self.state();
        let created_at = state.tick();
        let event = Event {
            id: format!("event-{}", state.events.len() + 1),
            code: new_event.code.clone(),
            name: new_event.name.clone(),
            organizer_code: new_event.organizer_code.clone(),
            organizer_id: new_event.organizer_id.clone(),
            cover_image: None,
            created_at: Some(created_at),
        };
        state.events.push(event.clone());
        Ok(event)
    }

    async fn find_event_by_code(&self, code: &str) -> Result<Option<Event>> {
        let state = self.state();
        if state.fail_lookups {
            bail!("HTTP 错误 503: unavailable");
        }
        Ok(state.events.iter().find(|e| e.code == code).cloned())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self.event(event_id))
    }

    async fn update_event_cover(&self, event_id: &str, cover_url: &str) -> Result<()> {
        let mut state = self.state();
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| anyhow!("活动不存在: {}", event_id))?;
        event.cover_image = Some(cover_url.to_string());
        let record = serde_json::to_value(&*event)?;
        state.broadcast(RowChange {
            table: "events".into(),
            kind: ChangeKind::Update,
            record,
            old_record: serde_json::json!({}),
        });
        Ok(())
    }

    async fn list_photos(&self, event_id: &str) -> Result<Vec<Photo>> {
        let state = self.state();
        if state.fail_lookups {
            bail!("HTTP 错误 503: unavailable");
        }
        let mut photos: Vec<Photo> = state
            .photos
            .iter()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(photos)
    }

    async fn insert_photo(&self, new_photo: &NewPhoto) -> Result<Photo> {
        let mut state = self.state();
        let index = state.insert_calls;
        state.insert_calls += 1;
        if state.fail_insert_at == Some(index) {
            bail!("HTTP 错误 500: insert rejected");
        }
        let photo = Photo {
            id: new_photo.id.clone(),
            event_id: new_photo.event_id.clone(),
            url: new_photo.url.clone(),
            user_name: new_photo.user_name.clone(),
            description: new_photo.description.clone(),
            created_at: state.tick(),
        };
        state.photos.push(photo.clone());
        let record = serde_json::to_value(&photo)?;
        state.broadcast(RowChange {
            table: "photos".into(),
            kind: ChangeKind::Insert,
            record,
            old_record: serde_json::json!({}),
        });
        Ok(photo)
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        let mut state = self.state();
        let index = state.upload_calls;
        state.upload_calls += 1;
        if state.fail_upload_at == Some(index) {
            bail!("HTTP 错误 413: payload too large");
        }
        let key = format!("{}/{}", bucket, path);
        if !upsert && state.objects.contains_key(&key) {
            bail!("HTTP 错误 409: duplicate");
        }
        state
            .objects
            .insert(key, (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}", bucket, path)
    }

    async fn fetch_object(&self, url: &str) -> Result<FetchedObject> {
        let state = self.state();
        if state.failing_urls.contains(url) {
            bail!("HTTP 错误 404: not found");
        }
        let key = url
            .strip_prefix("memory://")
            .ok_or_else(|| anyhow!("未知地址: {}", url))?;
        let (bytes, content_type) = state
            .objects
            .get(key)
            .ok_or_else(|| anyhow!("对象不存在: {}", key))?;
        Ok(FetchedObject {
            bytes: bytes.clone(),
            content_type: Some(content_type.clone()),
        })
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let topic = format!("memory:{}:{}", filter.table, filter.value);
        self.state().subscribers.push((filter, tx));
        Ok(ChangeSubscription::new(topic, rx, || {}))
    }

    async fn disconnect(&self) {
        self.state().disconnect_calls += 1;
    }
}

/// 轮询等待条件成立（推送在后台任务中处理）
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn sample_event(id: &str, code: &str) -> Event {
    Event {
        id: id.into(),
        code: code.into(),
        name: "Wedding".into(),
        organizer_code: "ORG12345".into(),
        organizer_id: "organizer".into(),
        cover_image: None,
        created_at: None,
    }
}

pub fn sample_photo(id: &str, event_id: &str, user_name: &str, offset_secs: i64) -> Photo {
    Photo {
        id: id.into(),
        event_id: event_id.into(),
        url: format!("memory://photos/{}/{}.jpg", event_id, id),
        user_name: user_name.into(),
        description: String::new(),
        created_at: Utc
            .timestamp_opt(1_714_557_600 + offset_secs, 0)
            .single()
            .unwrap_or_else(Utc::now),
    }
}
