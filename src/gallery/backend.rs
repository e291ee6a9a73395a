//! 后端协作方接口
//!
//! 客户端只依赖 [`GalleryBackend`]，远程实现由表接口、对象存储和变更推送三部分组成。

use crate::gallery::client::ClientConfig;
use crate::gallery::event::{Event, EventApi, NewEvent};
use crate::gallery::photo::{NewPhoto, Photo, PhotoApi};
use crate::gallery::realtime::{ChangeFilter, ChangeSubscription, RealtimeClient, RealtimeConfig};
use crate::gallery::storage::{FetchedObject, StorageApi};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

#[async_trait]
pub trait GalleryBackend: Send + Sync {
    /// 插入活动并返回完整行
    async fn insert_event(&self, new_event: &NewEvent) -> Result<Event>;

    /// 按邀请码查询（期望单行）
    async fn find_event_by_code(&self, code: &str) -> Result<Option<Event>>;

    /// 按 id 查询（期望单行）
    async fn get_event(&self, event_id: &str) -> Result<Option<Event>>;

    async fn update_event_cover(&self, event_id: &str, cover_url: &str) -> Result<()>;

    /// 活动下的全部照片，按 created_at 倒序
    async fn list_photos(&self, event_id: &str) -> Result<Vec<Photo>>;

    async fn insert_photo(&self, new_photo: &NewPhoto) -> Result<Photo>;

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn fetch_object(&self, url: &str) -> Result<FetchedObject>;

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeSubscription>;

    /// 关闭推送连接，之后不再订阅
    async fn disconnect(&self);
}

/// 远程后端（REST 表接口 + 对象存储 + WebSocket 推送）
pub struct RemoteBackend {
    events: EventApi,
    photos: PhotoApi,
    storage: StorageApi,
    realtime_config: RealtimeConfig,
    /// 首次订阅时才建立推送连接
    realtime: OnceCell<RealtimeClient>,
}

impl RemoteBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // 创建带认证的 HTTP 客户端（apikey / Authorization 通过 default_headers 自动添加）
        let http_client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("apikey"),
                    reqwest::header::HeaderValue::from_str(&config.api_key)
                        .context("无效的 apikey")?,
                );
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                        .context("无效的 apikey")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;

        info!("[Backend] 创建远程后端: {}", config.api_base_url);
        Ok(Self {
            events: EventApi::new(http_client.clone(), &config.api_base_url),
            photos: PhotoApi::new(http_client.clone(), &config.api_base_url),
            storage: StorageApi::new(http_client, &config.api_base_url),
            realtime_config: config.realtime_config(),
            realtime: OnceCell::new(),
        })
    }

    async fn realtime(&self) -> Result<&RealtimeClient> {
        self.realtime
            .get_or_try_init(|| RealtimeClient::connect(self.realtime_config.clone()))
            .await
    }
}

#[async_trait]
impl GalleryBackend for RemoteBackend {
    async fn insert_event(&self, new_event: &NewEvent) -> Result<Event> {
        self.events.create_event(new_event).await
    }

    async fn find_event_by_code(&self, code: &str) -> Result<Option<Event>> {
        self.events.find_by_code(code).await
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>> {
        self.events.get_by_id(event_id).await
    }

    async fn update_event_cover(&self, event_id: &str, cover_url: &str) -> Result<()> {
        self.events.update_cover_image(event_id, cover_url).await
    }

    async fn list_photos(&self, event_id: &str) -> Result<Vec<Photo>> {
        self.photos.list_by_event(event_id).await
    }

    async fn insert_photo(&self, new_photo: &NewPhoto) -> Result<Photo> {
        self.photos.insert(new_photo).await
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        self.storage
            .upload(bucket, path, bytes, content_type, upsert)
            .await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.storage.public_url(bucket, path)
    }

    async fn fetch_object(&self, url: &str) -> Result<FetchedObject> {
        self.storage.fetch(url).await
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeSubscription> {
        self.realtime().await?.subscribe(filter).await
    }

    async fn disconnect(&self) {
        if let Some(realtime) = self.realtime.get() {
            info!(
                "[Backend] 关闭推送连接（剩余订阅 {}）",
                realtime.active_subscriptions()
            );
            realtime.disconnect();
        }
    }
}
