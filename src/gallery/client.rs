//! 活动相册客户端核心实现模块
//!
//! 持有会话状态与照片列表，负责加入 / 创建 / 离开活动、上传、封面更新，
//! 并在加入活动后维持两条变更订阅（照片增删、活动更新）。

use crate::gallery::access::{AccessForm, Credentials, Identity};
use crate::gallery::archive::{export_archive, ArchiveReport};
use crate::gallery::backend::{GalleryBackend, RemoteBackend};
use crate::gallery::db::create_sqlite_pool_with_migration;
use crate::gallery::error::{GalleryError, GalleryResult};
use crate::gallery::event::{
    generate_event_code, generate_organizer_code, EmptyEventListener, Event, EventListener,
    NewEvent, DEFAULT_ORGANIZER_ID,
};
use crate::gallery::photo::{
    EmptyPhotoListener, LocalImage, NewPhoto, Photo, PhotoListener, UploadOutcome, UploadReport,
    UploadStage,
};
use crate::gallery::realtime::{ChangeFilter, ChangeKind, ChangeSubscription, RealtimeConfig, RowChange};
use crate::gallery::session::{Session, SessionDao, ORGANIZER_NAME};
use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_DB_URL: &str = "sqlite://event_photos.db?mode=rwc";
pub const DEFAULT_PHOTOS_BUCKET: &str = "photos";
pub const DEFAULT_COVERS_BUCKET: &str = "covers";

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 后端基础地址，例如 `https://xyz.supabase.co`
    pub api_base_url: String,
    /// 匿名 API key
    pub api_key: String,
    /// 推送服务 WebSocket 地址（由基础地址推导）
    pub realtime_url: String,
    /// 本地会话数据库 URL
    ///
    /// 例如：`sqlite://event_photos.db?mode=rwc`
    pub db_url: String,
    pub photos_bucket: String,
    pub covers_bucket: String,
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.into();
        Self {
            realtime_url: realtime_url(&api_base_url, &api_key),
            api_base_url,
            api_key,
            db_url: DEFAULT_DB_URL.to_string(),
            photos_bucket: DEFAULT_PHOTOS_BUCKET.to_string(),
            covers_bucket: DEFAULT_COVERS_BUCKET.to_string(),
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
        }
    }

    /// 从环境变量读取配置
    pub fn from_env() -> Result<Self> {
        Self::from_env_or(None, None)
    }

    /// 显式给出的地址 / key 优先，其余从环境变量读取
    pub fn from_env_or(api_base_url: Option<String>, api_key: Option<String>) -> Result<Self> {
        let api_base_url = match api_base_url {
            Some(url) => url,
            None => env::var("SUPABASE_URL").context("缺少后端地址（SUPABASE_URL）")?,
        };
        let api_key = match api_key {
            Some(key) => key,
            None => env::var("SUPABASE_ANON_KEY").context("缺少 API key（SUPABASE_ANON_KEY）")?,
        };

        let mut config = Self::new(api_base_url, api_key);
        config.db_url = env_or("EVENT_PHOTOS_DB_URL", DEFAULT_DB_URL);
        config.photos_bucket = env_or("EVENT_PHOTOS_PHOTOS_BUCKET", DEFAULT_PHOTOS_BUCKET);
        config.covers_bucket = env_or("EVENT_PHOTOS_COVERS_BUCKET", DEFAULT_COVERS_BUCKET);
        Ok(config)
    }

    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            url: self.realtime_url.clone(),
            api_key: self.api_key.clone(),
            heartbeat_interval: self.heartbeat_interval,
            join_timeout: self.join_timeout,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("[Client] {} 未设置，使用默认值: {}", key, default);
        default.to_string()
    })
}

/// `http(s)://host` -> `ws(s)://host/realtime/v1/websocket?apikey=..&vsn=1.0.0`
fn realtime_url(api_base_url: &str, api_key: &str) -> String {
    let ws_base = if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_base_url.to_string()
    };
    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        ws_base, api_key
    )
}

#[derive(Default)]
struct ClientState {
    session: Session,
    photos: Vec<Photo>,
}

/// 当前活动的两条订阅任务，drop 时中止（订阅随任务一起退订）
struct LiveSync {
    event_id: String,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for LiveSync {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

struct ClientInner {
    config: ClientConfig,
    backend: Arc<dyn GalleryBackend>,
    dao: SessionDao,
    state: Mutex<ClientState>,
    event_listener: RwLock<Arc<dyn EventListener>>,
    photo_listener: RwLock<Arc<dyn PhotoListener>>,
    live_sync: tokio::sync::Mutex<Option<LiveSync>>,
    /// 串行化会话迁移（join / create / resume / leave）
    transition: tokio::sync::Mutex<()>,
}

/// 活动相册客户端（可廉价 clone）
#[derive(Clone)]
pub struct EventPhotosClient {
    inner: Arc<ClientInner>,
}

impl EventPhotosClient {
    pub fn new(config: ClientConfig, backend: Arc<dyn GalleryBackend>, dao: SessionDao) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                backend,
                dao,
                state: Mutex::new(ClientState::default()),
                event_listener: RwLock::new(Arc::new(EmptyEventListener)),
                photo_listener: RwLock::new(Arc::new(EmptyPhotoListener)),
                live_sync: tokio::sync::Mutex::new(None),
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// 使用远程后端和本地 SQLite 会话库创建客户端
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let pool = create_sqlite_pool_with_migration(&config.db_url).await?;
        let backend = RemoteBackend::new(&config)?;
        Ok(Self::new(config, Arc::new(backend), SessionDao::new(pool)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// 注册活动监听器
    pub fn set_event_listener(&self, listener: Arc<dyn EventListener>) {
        if let Ok(mut slot) = self.inner.event_listener.write() {
            *slot = listener;
        }
    }

    /// 注册照片监听器
    pub fn set_photo_listener(&self, listener: Arc<dyn PhotoListener>) {
        if let Ok(mut slot) = self.inner.photo_listener.write() {
            *slot = listener;
        }
    }

    pub fn session(&self) -> Session {
        self.inner.state().session.clone()
    }

    /// 当前照片列表（新的在前）
    pub fn photos(&self) -> Vec<Photo> {
        self.inner.state().photos.clone()
    }

    pub fn is_organizer(&self) -> bool {
        self.inner.state().session.is_organizer()
    }

    /// 恢复上次保存的会话，并重新开始同步
    pub async fn resume(&self) -> GalleryResult<Option<Session>> {
        let _guard = self.inner.transition.lock().await;
        {
            let state = self.inner.state();
            if state.session.is_joined() {
                return Ok(Some(state.session.clone()));
            }
        }

        let restored = match self.inner.dao.load_session().await {
            Ok(restored) => restored,
            Err(e) => {
                warn!("[Client] ⚠️ 读取本地会话失败: {:#}", e);
                None
            }
        };
        let Some((event, user_name)) = restored else {
            return Ok(None);
        };

        info!("[Client] 🔄 恢复会话: {} ({})", event.name, user_name);
        let session = Session::restored(event, user_name);
        self.inner.enter(session.clone(), false).await;
        Ok(Some(session))
    }

    /// 校验表单后加入活动
    pub async fn join_form(&self, form: &AccessForm) -> GalleryResult<Session> {
        let credentials = form.validate()?;
        self.join(&credentials).await
    }

    /// 以访客或组织者身份加入活动
    pub async fn join(&self, credentials: &Credentials) -> GalleryResult<Session> {
        let _guard = self.inner.transition.lock().await;
        self.inner.ensure_anonymous()?;
        if let Identity::Guest { user_name } = &credentials.identity {
            // 组织者身份只能由组织者口令取得
            if user_name.trim() == ORGANIZER_NAME {
                return Err(GalleryError::validation("This name is reserved"));
            }
        }

        info!("[Client] 🔍 查找活动: {}", credentials.event_code);
        let event = self
            .inner
            .backend
            .find_event_by_code(&credentials.event_code)
            .await
            .map_err(|e| {
                error!("[Client] 查找活动失败: {:#}", e);
                GalleryError::backend("Failed to access event", e)
            })?
            .ok_or(GalleryError::InvalidEventCode)?;

        let session = match &credentials.identity {
            Identity::Guest { user_name } => Session::guest(event, user_name.clone()),
            Identity::Organizer { organizer_code } => {
                if event.organizer_code != *organizer_code {
                    warn!("[Client] 组织者口令不匹配: {}", credentials.event_code);
                    return Err(GalleryError::InvalidOrganizerCode);
                }
                Session::organizer(event)
            }
        };

        self.inner.enter(session.clone(), true).await;
        Ok(session)
    }

    /// 创建活动，成功后以组织者身份进入
    pub async fn create_event(&self, name: &str) -> GalleryResult<Event> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GalleryError::validation("Please enter an event name"));
        }
        let _guard = self.inner.transition.lock().await;
        self.inner.ensure_anonymous()?;

        let new_event = NewEvent {
            name: name.to_string(),
            code: generate_event_code(),
            organizer_code: generate_organizer_code(),
            organizer_id: DEFAULT_ORGANIZER_ID.to_string(),
        };
        info!("[Client] ✨ 创建活动: {} ({})", new_event.name, new_event.code);

        let event = self
            .inner
            .backend
            .insert_event(&new_event)
            .await
            .map_err(|e| {
                error!("[Client] 创建活动失败: {:#}", e);
                GalleryError::backend("Failed to create event. Please try again.", e)
            })?;

        self.inner
            .enter(Session::organizer(event.clone()), true)
            .await;
        Ok(event)
    }

    /// 重新拉取当前活动的全部照片；失败时保留原列表
    pub async fn load_photos(&self) -> GalleryResult<Vec<Photo>> {
        self.inner.load_photos().await
    }

    /// 逐个上传，第一次失败后停止；全部成功后刷新列表
    pub async fn upload_photos(&self, files: Vec<LocalImage>) -> GalleryResult<UploadReport> {
        let (event_id, user_name) = {
            let state = self.inner.state();
            match &state.session {
                Session::Joined {
                    event, user_name, ..
                } => (event.id.clone(), user_name.clone()),
                Session::Anonymous => return Err(GalleryError::NotJoined),
            }
        };

        let mut report = UploadReport::default();
        if files.is_empty() {
            return Ok(report);
        }
        info!("[Client] 📤 开始上传 {} 张照片", files.len());

        let backend = &self.inner.backend;
        let bucket = &self.inner.config.photos_bucket;
        let mut failed = false;

        for file in files {
            if failed {
                report.outcomes.push(UploadOutcome::Skipped {
                    file_name: file.file_name,
                });
                continue;
            }

            let photo_id = Uuid::new_v4().to_string();
            let path = format!("{}/{}.{}", event_id, photo_id, file.extension());

            if let Err(e) = backend
                .upload_object(bucket, &path, file.bytes, &file.content_type, false)
                .await
            {
                error!("[Client] 上传失败: {} - {:#}", file.file_name, e);
                report.outcomes.push(UploadOutcome::Failed {
                    file_name: file.file_name,
                    stage: UploadStage::Storage,
                    stored_path: None,
                    error: format!("{:#}", e),
                });
                failed = true;
                continue;
            }

            let new_photo = NewPhoto {
                id: photo_id,
                event_id: event_id.clone(),
                url: backend.public_url(bucket, &path),
                user_name: user_name.clone(),
                description: String::new(),
            };
            match backend.insert_photo(&new_photo).await {
                Ok(photo) => {
                    debug!("[Client]   已上传: {} -> {}", file.file_name, photo.id);
                    report.outcomes.push(UploadOutcome::Uploaded(photo));
                }
                Err(e) => {
                    error!("[Client] 照片入库失败: {} - {:#}", file.file_name, e);
                    warn!("[Client] ⚠️ 存储中遗留对象: {}", path);
                    report.outcomes.push(UploadOutcome::Failed {
                        file_name: file.file_name,
                        stage: UploadStage::Insert,
                        stored_path: Some(path),
                        error: format!("{:#}", e),
                    });
                    failed = true;
                }
            }
        }

        if report.is_success() {
            info!("[Client] ✅ 上传完成: {} 张", report.outcomes.len());
            if let Err(e) = self.inner.load_photos().await {
                warn!("[Client] 上传后刷新失败: {:#}", e);
            }
        }
        Ok(report)
    }

    /// 更换封面（仅组织者；访客调用时什么也不做）
    pub async fn update_cover_image(&self, file: LocalImage) -> GalleryResult<Option<Event>> {
        let event_id = {
            let state = self.inner.state();
            if !state.session.is_organizer() {
                debug!("[Client] 非组织者，忽略封面更新");
                return Ok(None);
            }
            match state.session.event_id() {
                Some(id) => id.to_string(),
                None => return Ok(None),
            }
        };

        let event = self
            .inner
            .replace_cover(&event_id, file)
            .await
            .map_err(|e| {
                error!("[Client] 更新封面失败: {:#}", e);
                GalleryError::backend("Failed to update cover image", e)
            })?;

        self.inner.apply_event(event.clone()).await;
        info!("[Client] 🖼️ 封面已更新");
        Ok(Some(event))
    }

    /// 打包下载全部照片（仅组织者）
    pub async fn download_all(&self, out_dir: impl AsRef<Path>) -> GalleryResult<ArchiveReport> {
        let (event, photos) = {
            let state = self.inner.state();
            let event = state.session.event().cloned().ok_or(GalleryError::NotJoined)?;
            if !state.session.is_organizer() {
                return Err(GalleryError::NotOrganizer);
            }
            (event, state.photos.clone())
        };

        export_archive(self.inner.backend.as_ref(), &event, &photos, out_dir.as_ref())
            .await
            .map_err(|e| {
                error!("[Client] 打包下载失败: {:#}", e);
                GalleryError::backend("Failed to download photos", e)
            })
    }

    /// 离开活动：停止同步，清除本地会话与内存状态
    pub async fn leave(&self) -> GalleryResult<()> {
        let _guard = self.inner.transition.lock().await;
        self.inner.stop_live_sync().await;

        if let Err(e) = self.inner.dao.clear().await {
            warn!("[Client] ⚠️ 清除本地会话失败: {:#}", e);
        }
        *self.inner.state() = ClientState::default();
        info!("[Client] 👋 已离开活动");

        self.inner.event_listener().on_session_changed(None).await;
        self.inner
            .photo_listener()
            .on_photo_list_changed(Vec::new())
            .await;
        Ok(())
    }

    /// 停止后台同步并关闭推送连接，保留本地会话
    pub async fn shutdown(&self) {
        self.inner.stop_live_sync().await;
        self.inner.backend.disconnect().await;
        info!("[Client] 客户端已关闭");
    }
}

impl ClientInner {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn event_listener(&self) -> Arc<dyn EventListener> {
        match self.event_listener.read() {
            Ok(listener) => listener.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    fn photo_listener(&self) -> Arc<dyn PhotoListener> {
        match self.photo_listener.read() {
            Ok(listener) => listener.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    fn ensure_anonymous(&self) -> GalleryResult<()> {
        if self.state().session.is_joined() {
            return Err(GalleryError::AlreadyJoined);
        }
        Ok(())
    }

    /// 进入会话：持久化（恢复时跳过）、启动同步、加载照片
    async fn enter(self: &Arc<Self>, session: Session, persist: bool) {
        let Session::Joined {
            event, user_name, ..
        } = &session
        else {
            return;
        };
        let event = event.clone();

        if persist {
            if let Err(e) = self.dao.save_session(&event, user_name).await {
                warn!("[Client] ⚠️ 保存本地会话失败: {:#}", e);
            }
        }

        *self.state() = ClientState {
            session,
            photos: Vec::new(),
        };
        info!("[Client] ✅ 已进入活动: {} ({})", event.name, event.code);

        self.start_live_sync(&event.id).await;
        if let Err(e) = self.load_photos().await {
            warn!("[Client] 首次加载照片失败: {}", e);
        }
        self.event_listener().on_session_changed(Some(event)).await;
    }

    async fn load_photos(&self) -> GalleryResult<Vec<Photo>> {
        let event_id = self
            .state()
            .session
            .event_id()
            .map(str::to_string)
            .ok_or(GalleryError::NotJoined)?;

        let mut photos = self.backend.list_photos(&event_id).await.map_err(|e| {
            error!("[Client] 加载照片失败: {:#}", e);
            GalleryError::backend("Failed to load photos", e)
        })?;
        photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        {
            let mut state = self.state();
            if state.session.event_id() != Some(event_id.as_str()) {
                debug!("[Client] 会话已变化，丢弃照片列表");
                return Ok(photos);
            }
            state.photos = photos.clone();
        }
        debug!("[Client] 📷 照片数量: {}", photos.len());
        self.photo_listener()
            .on_photo_list_changed(photos.clone())
            .await;
        Ok(photos)
    }

    async fn replace_cover(&self, event_id: &str, file: LocalImage) -> Result<Event> {
        let bucket = &self.config.covers_bucket;
        let path = format!("{}/cover.{}", event_id, file.extension());
        self.backend
            .upload_object(bucket, &path, file.bytes, &file.content_type, true)
            .await?;
        let url = self.backend.public_url(bucket, &path);
        self.backend.update_event_cover(event_id, &url).await?;
        self.backend
            .get_event(event_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("活动不存在: {}", event_id))
    }

    /// 用最新的活动替换内存和本地快照，并通知监听器
    async fn apply_event(&self, event: Event) {
        {
            let mut state = self.state();
            match state.session.event_mut() {
                Some(current) if current.id == event.id => *current = event.clone(),
                _ => return,
            }
        }
        if let Err(e) = self.dao.save_event(&event).await {
            warn!("[Client] ⚠️ 保存活动快照失败: {:#}", e);
        }
        self.event_listener().on_event_updated(event).await;
    }

    async fn start_live_sync(self: &Arc<Self>, event_id: &str) {
        let mut live = self.live_sync.lock().await;
        // 先退订旧活动
        *live = None;

        let mut tasks = Vec::new();
        match self
            .backend
            .subscribe(ChangeFilter::photos_of_event(event_id))
            .await
        {
            Ok(sub) => tasks.push(tokio::spawn(run_photo_sync(Arc::downgrade(self), sub))),
            Err(e) => warn!("[Client] ⚠️ 订阅照片变更失败: {:#}", e),
        }
        match self
            .backend
            .subscribe(ChangeFilter::event_updates(event_id))
            .await
        {
            Ok(sub) => tasks.push(tokio::spawn(run_event_sync(Arc::downgrade(self), sub))),
            Err(e) => warn!("[Client] ⚠️ 订阅活动变更失败: {:#}", e),
        }

        info!("[Client] 📡 开始同步活动: {}", event_id);
        *live = Some(LiveSync {
            event_id: event_id.to_string(),
            tasks,
        });
    }

    async fn stop_live_sync(&self) {
        if let Some(live) = self.live_sync.lock().await.take() {
            info!("[Client] 停止同步活动: {}", live.event_id);
        }
    }

    async fn apply_photo_change(&self, change: RowChange) {
        match change.kind {
            ChangeKind::Insert => {
                let photo: Photo = match serde_json::from_value(change.record) {
                    Ok(photo) => photo,
                    Err(e) => {
                        warn!("[Client] 无法解析照片推送: {}", e);
                        return;
                    }
                };
                {
                    let mut state = self.state();
                    if state.session.event_id() != Some(photo.event_id.as_str()) {
                        debug!("[Client] 忽略其他活动的照片: {}", photo.id);
                        return;
                    }
                    if state.photos.iter().any(|p| p.id == photo.id) {
                        debug!("[Client] 照片已存在，跳过: {}", photo.id);
                        return;
                    }
                    state.photos.insert(0, photo.clone());
                }
                info!("[Client] 📥 新照片: {} (by {})", photo.id, photo.user_name);
                self.photo_listener().on_photo_added(photo).await;
            }
            ChangeKind::Delete => {
                let Some(photo_id) = change.row_id().map(str::to_string) else {
                    return;
                };
                let removed = {
                    let mut state = self.state();
                    let before = state.photos.len();
                    state.photos.retain(|p| p.id != photo_id);
                    state.photos.len() != before
                };
                if removed {
                    info!("[Client] 🗑️ 照片已删除: {}", photo_id);
                    self.photo_listener().on_photo_removed(photo_id).await;
                }
            }
            ChangeKind::Update => {
                debug!("[Client] 忽略照片更新推送");
            }
        }
    }

    async fn apply_event_change(&self, change: RowChange) {
        if change.kind != ChangeKind::Update {
            return;
        }
        let merged = {
            let state = self.state();
            let Some(current) = state.session.event() else {
                return;
            };
            if change.row_id().is_some_and(|id| id != current.id) {
                return;
            }
            current.merged_with(&change.record)
        };
        match merged {
            Ok(event) => {
                info!("[Client] 🔔 活动已更新: {}", event.name);
                self.apply_event(event).await;
            }
            Err(e) => warn!("[Client] 无法合并活动推送: {}", e),
        }
    }
}

async fn run_photo_sync(client: Weak<ClientInner>, mut subscription: ChangeSubscription) {
    while let Some(change) = subscription.recv().await {
        let Some(inner) = client.upgrade() else { break };
        inner.apply_photo_change(change).await;
    }
    debug!("[Client] 照片订阅结束: {}", subscription.topic());
}

async fn run_event_sync(client: Weak<ClientInner>, mut subscription: ChangeSubscription) {
    while let Some(change) = subscription.recv().await {
        let Some(inner) = client.upgrade() else { break };
        inner.apply_event_change(change).await;
    }
    debug!("[Client] 活动订阅结束: {}", subscription.topic());
}
