//! 会话模块
//!
//! 会话状态机与本地持久化

pub mod dao;
pub mod models;

pub use dao::SessionDao;
pub use models::{Role, Session, ORGANIZER_NAME};
