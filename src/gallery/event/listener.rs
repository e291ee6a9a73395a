//! 活动监听器回调接口

use crate::gallery::event::models::Event;
use async_trait::async_trait;

/// 活动监听器（封面等字段被其他客户端更新时回调）
#[async_trait]
pub trait EventListener: Send + Sync {
    /// 当前活动被更新（已合并并持久化后的完整活动）
    async fn on_event_updated(&self, event: Event);

    /// 会话发生变化：加入活动时为 Some，离开时为 None
    async fn on_session_changed(&self, event: Option<Event>);
}

/// 默认空实现（无操作）
pub struct EmptyEventListener;

#[async_trait]
impl EventListener for EmptyEventListener {
    async fn on_event_updated(&self, _event: Event) {}
    async fn on_session_changed(&self, _event: Option<Event>) {}
}
