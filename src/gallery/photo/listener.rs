//! 照片监听器回调接口

use crate::gallery::photo::models::Photo;
use async_trait::async_trait;

/// 照片监听器（照片列表的增量推送与全量刷新）
#[async_trait]
pub trait PhotoListener: Send + Sync {
    /// 收到新照片推送（已插入到列表头部）
    async fn on_photo_added(&self, photo: Photo);

    /// 照片被删除（已从列表移除）
    async fn on_photo_removed(&self, photo_id: String);

    /// 照片列表被整体替换（首次加载、上传后的刷新、离开活动）
    async fn on_photo_list_changed(&self, photos: Vec<Photo>);
}

/// 默认空实现（无操作）
pub struct EmptyPhotoListener;

#[async_trait]
impl PhotoListener for EmptyPhotoListener {
    async fn on_photo_added(&self, _photo: Photo) {}
    async fn on_photo_removed(&self, _photo_id: String) {}
    async fn on_photo_list_changed(&self, _photos: Vec<Photo>) {}
}
