//! 变更推送 WebSocket 客户端
//!
//! 一个连接上复用多个 channel（topic），每个订阅对应一个 topic。
//! 写入端由单独的任务持有，心跳与 join / leave 都通过 `outbound` 队列发送。

use crate::gallery::realtime::types::{
    phx_event, ChangeFilter, ChangeSubscription, PhxMessage, PhxReply, RowChange, PHOENIX_TOPIC,
};
use anyhow::{Context, Result};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 推送连接配置
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// 完整的 WebSocket 地址（含 apikey / vsn 参数）
    pub url: String,
    pub api_key: String,
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
}

/// 推送客户端（可廉价 clone）
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<RealtimeInner>,
}

struct RealtimeInner {
    config: RealtimeConfig,
    outbound: mpsc::UnboundedSender<WsMessage>,
    routes: Mutex<HashMap<String, mpsc::UnboundedSender<RowChange>>>,
    pending_replies: Mutex<HashMap<String, oneshot::Sender<PhxReply>>>,
    next_ref: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for RealtimeInner {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl RealtimeClient {
    /// 建立连接并启动写入、心跳、读取三个任务
    pub async fn connect(config: RealtimeConfig) -> Result<Self> {
        info!("[Realtime] 🔗 连接推送服务");
        debug!("[Realtime]   URL: {}", config.url);

        let (ws_stream, response) = connect_async(config.url.as_str())
            .await
            .context("WebSocket 连接失败")?;
        info!(
            "[Realtime] ✅ WebSocket 连接成功, 状态: {}",
            response.status()
        );

        let (mut write, read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        let inner = Arc::new(RealtimeInner {
            config,
            outbound,
            routes: Mutex::new(HashMap::new()),
            pending_replies: Mutex::new(HashMap::new()),
            next_ref: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        });

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!("[Realtime] 发送失败: {}", e);
                    break;
                }
            }
            debug!("[Realtime] 写入任务结束");
        });

        let heartbeat_task = {
            let weak = Arc::downgrade(&inner);
            let period = inner.config.heartbeat_interval;
            tokio::spawn(async move {
                let mut ticker = interval(period);
                // 第一次 tick 立即返回
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else { break };
                    let heartbeat = PhxMessage {
                        topic: PHOENIX_TOPIC.to_string(),
                        event: phx_event::HEARTBEAT.to_string(),
                        payload: serde_json::json!({}),
                        msg_ref: Some(inner.next_ref()),
                    };
                    if inner.send(&heartbeat).is_err() {
                        break;
                    }
                }
            })
        };

        let reader_task = {
            let weak = Arc::downgrade(&inner);
            tokio::spawn(async move {
                handle_messages(weak, read).await;
            })
        };

        if let Ok(mut tasks) = inner.tasks.lock() {
            tasks.extend([writer_task, heartbeat_task, reader_task]);
        }

        info!("[Realtime] 💓 启动心跳，📥 开始监听推送");
        Ok(Self { inner })
    }

    /// 订阅一类行级变更，等待服务端确认后返回
    pub async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeSubscription> {
        let inner = &self.inner;
        let topic = format!(
            "realtime:{}-{}-{}",
            filter.table,
            filter.value,
            inner.next_ref()
        );
        let join_ref = inner.next_ref();

        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        inner.lock_routes()?.insert(topic.clone(), change_tx);
        inner.lock_pending()?.insert(join_ref.clone(), reply_tx);

        info!(
            "[Realtime] 📡 订阅 {} (table={}, event={}, filter={})",
            topic,
            filter.table,
            filter.events.as_str(),
            filter.filter_expr()
        );
        let join = PhxMessage {
            topic: topic.clone(),
            event: phx_event::JOIN.to_string(),
            payload: serde_json::json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [filter.to_join_config()],
                },
                "access_token": inner.config.api_key,
            }),
            msg_ref: Some(join_ref.clone()),
        };

        let confirmed = match inner.send(&join) {
            Ok(()) => timeout(inner.config.join_timeout, reply_rx)
                .await
                .map_err(|_| anyhow::anyhow!("订阅 {} 超时", topic))
                .and_then(|r| r.map_err(|_| anyhow::anyhow!("订阅 {} 时连接已关闭", topic)))
                .and_then(|reply| {
                    if reply.status == "ok" {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!(
                            "订阅 {} 被拒绝: status={}, response={}",
                            topic,
                            reply.status,
                            reply.response
                        ))
                    }
                }),
            Err(e) => Err(e),
        };

        if let Err(e) = confirmed {
            error!("[Realtime] ❌ {}", e);
            inner.forget(&topic, Some(&join_ref));
            return Err(e);
        }
        info!("[Realtime] ✅ 订阅成功: {}", topic);

        let weak = Arc::downgrade(&self.inner);
        let leave_topic = topic.clone();
        Ok(ChangeSubscription::new(topic, change_rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.leave(&leave_topic);
            }
        }))
    }

    /// 主动关闭连接
    pub fn disconnect(&self) {
        info!("[Realtime] 👋 关闭推送连接");
        let _ = self.inner.outbound.send(WsMessage::Close(None));
    }

    /// 当前活跃的订阅数
    pub fn active_subscriptions(&self) -> usize {
        self.inner.routes.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl RealtimeInner {
    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn lock_routes(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<RowChange>>>> {
        self.routes
            .lock()
            .map_err(|_| anyhow::anyhow!("订阅路由表锁已损坏"))
    }

    fn lock_pending(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<PhxReply>>>> {
        self.pending_replies
            .lock()
            .map_err(|_| anyhow::anyhow!("回复等待表锁已损坏"))
    }

    fn send(&self, msg: &PhxMessage) -> Result<()> {
        let text = serde_json::to_string(msg)?;
        debug!("[Realtime] 📤 {}", text);
        self.outbound
            .send(WsMessage::Text(text))
            .map_err(|_| anyhow::anyhow!("推送连接已关闭"))
    }

    fn forget(&self, topic: &str, join_ref: Option<&str>) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.remove(topic);
        }
        if let (Some(join_ref), Ok(mut pending)) = (join_ref, self.pending_replies.lock()) {
            pending.remove(join_ref);
        }
    }

    /// 退订：移除路由并发送 phx_leave
    fn leave(&self, topic: &str) {
        self.forget(topic, None);
        let leave = PhxMessage {
            topic: topic.to_string(),
            event: phx_event::LEAVE.to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(self.next_ref()),
        };
        match self.send(&leave) {
            Ok(()) => info!("[Realtime] 🔕 已退订: {}", topic),
            Err(e) => debug!("[Realtime] 退订 {} 时连接已关闭: {}", topic, e),
        }
    }

    fn dispatch(&self, msg: PhxMessage) {
        match msg.event.as_str() {
            phx_event::REPLY => {
                let Some(msg_ref) = msg.msg_ref else { return };
                let waiter = self
                    .pending_replies
                    .lock()
                    .ok()
                    .and_then(|mut p| p.remove(&msg_ref));
                if let Some(waiter) = waiter {
                    match serde_json::from_value::<PhxReply>(msg.payload) {
                        Ok(reply) => {
                            let _ = waiter.send(reply);
                        }
                        Err(e) => error!("[Realtime] phx_reply 解析失败: {}", e),
                    }
                }
            }
            phx_event::POSTGRES_CHANGES => {
                let change = match serde_json::from_value::<RowChange>(msg.payload["data"].clone())
                {
                    Ok(change) => change,
                    Err(e) => {
                        error!(
                            "[Realtime] 变更解析失败: {}, 原始数据: {}",
                            e, msg.payload
                        );
                        return;
                    }
                };
                debug!(
                    "[Realtime] 📥 {} {} on {}",
                    msg.topic,
                    change.kind.as_str(),
                    change.table
                );
                if let Ok(mut routes) = self.routes.lock() {
                    let closed = match routes.get(&msg.topic) {
                        Some(tx) => tx.send(change).is_err(),
                        None => {
                            debug!("[Realtime] 未知 topic 的推送: {}", msg.topic);
                            false
                        }
                    };
                    if closed {
                        routes.remove(&msg.topic);
                    }
                }
            }
            phx_event::ERROR | phx_event::CLOSE => {
                warn!("[Realtime] ⚠️ channel {} 收到 {}", msg.topic, msg.event);
                if let Ok(mut routes) = self.routes.lock() {
                    routes.remove(&msg.topic);
                }
            }
            other => {
                debug!("[Realtime] 忽略事件 {} (topic={})", other, msg.topic);
            }
        }
    }
}

/// 处理接收消息（事件循环）
async fn handle_messages(inner: Weak<RealtimeInner>, mut read: WsReader) {
    while let Some(msg_result) = read.next().await {
        let Some(inner) = inner.upgrade() else { break };
        match msg_result {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<PhxMessage>(&text) {
                Ok(msg) => inner.dispatch(msg),
                Err(e) => error!("[Realtime] JSON 解析失败: {}, 原始数据: {}", e, text),
            },
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Ok(WsMessage::Close(frame)) => {
                warn!("[Realtime] 👋 连接关闭: {:?}", frame);
                break;
            }
            Err(e) => {
                error!("[Realtime] WebSocket 错误: {}", e);
                break;
            }
            _ => {}
        }
    }

    // 连接结束：丢弃所有路由，订阅方的 recv() 随之返回 None
    if let Some(inner) = inner.upgrade() {
        if let Ok(mut routes) = inner.routes.lock() {
            routes.clear();
        }
        if let Ok(mut pending) = inner.pending_replies.lock() {
            pending.clear();
        }
    }
    debug!("[Realtime] 读取任务结束");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::realtime::types::ChangeKind;
    use serde_json::json;

    fn inner_for_test() -> (Arc<RealtimeInner>, mpsc::UnboundedReceiver<WsMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(RealtimeInner {
            config: RealtimeConfig {
                url: "ws://localhost".into(),
                api_key: "key".into(),
                heartbeat_interval: Duration::from_secs(25),
                join_timeout: Duration::from_secs(1),
            },
            outbound,
            routes: Mutex::new(HashMap::new()),
            pending_replies: Mutex::new(HashMap::new()),
            next_ref: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        });
        (inner, rx)
    }

    #[tokio::test]
    async fn changes_are_routed_by_topic() {
        let (inner, _rx) = inner_for_test();
        let (tx, mut change_rx) = mpsc::unbounded_channel();
        inner
            .routes
            .lock()
            .unwrap()
            .insert("realtime:photos-e1-1".into(), tx);

        inner.dispatch(
            serde_json::from_value(json!({
                "topic": "realtime:photos-e1-1",
                "event": "postgres_changes",
                "payload": { "data": {
                    "table": "photos", "type": "INSERT",
                    "record": { "id": "p1", "event_id": "e1" }, "old_record": {}
                }},
                "ref": null
            }))
            .unwrap(),
        );

        let change = change_rx.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.row_id(), Some("p1"));
    }

    #[tokio::test]
    async fn reply_resolves_pending_join() {
        let (inner, _rx) = inner_for_test();
        let (tx, rx) = oneshot::channel();
        inner.pending_replies.lock().unwrap().insert("7".into(), tx);

        inner.dispatch(
            serde_json::from_value(json!({
                "topic": "realtime:photos-e1-1",
                "event": "phx_reply",
                "payload": { "status": "ok", "response": {} },
                "ref": "7"
            }))
            .unwrap(),
        );

        assert_eq!(rx.await.unwrap().status, "ok");
    }

    #[tokio::test]
    async fn leave_removes_route_and_sends_phx_leave() {
        let (inner, mut rx) = inner_for_test();
        let (tx, _change_rx) = mpsc::unbounded_channel();
        inner.routes.lock().unwrap().insert("realtime:t".into(), tx);

        inner.leave("realtime:t");

        assert!(inner.routes.lock().unwrap().is_empty());
        match rx.recv().await {
            Some(WsMessage::Text(text)) => {
                let msg: PhxMessage = serde_json::from_str(&text).unwrap();
                assert_eq!(msg.event, "phx_leave");
                assert_eq!(msg.topic, "realtime:t");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
