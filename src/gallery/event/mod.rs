//! 活动模块
//!
//! 活动的创建（邀请码生成）、查询与封面更新

pub mod api;
pub mod codes;
pub mod listener;
pub mod models;

// 重新导出主要类型和函数
pub use api::EventApi;
pub use codes::{generate_event_code, generate_organizer_code};
pub use listener::{EmptyEventListener, EventListener};
pub use models::{Event, NewEvent, DEFAULT_ORGANIZER_ID};
