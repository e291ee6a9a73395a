//! 变更推送模块
//!
//! 基于 WebSocket 的行级变更订阅（insert / update / delete）

pub mod client;
pub mod types;

pub use client::{RealtimeClient, RealtimeConfig};
pub use types::{ChangeEvents, ChangeFilter, ChangeKind, ChangeSubscription, RowChange};
