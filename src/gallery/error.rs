//! 错误类型
//!
//! `Display` 文本即面向用户的提示语，调用方可以直接展示。
//! api / dao 层内部仍使用 `anyhow`，在操作边界统一包装为 [`GalleryError::Backend`]。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    /// 本地校验失败（不会发起任何网络请求）
    #[error("{0}")]
    Validation(String),

    #[error("Invalid event code")]
    InvalidEventCode,

    #[error("Invalid organizer code")]
    InvalidOrganizerCode,

    #[error("No active event")]
    NotJoined,

    #[error("Leave the current event first")]
    AlreadyJoined,

    #[error("Only the organizer can do that")]
    NotOrganizer,

    /// 后端 / 网络错误，`message` 为按操作区分的通用提示
    #[error("{message}")]
    Backend {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl GalleryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn backend(message: &'static str, source: anyhow::Error) -> Self {
        Self::Backend { message, source }
    }

    /// 是否在发起网络请求之前就被拦截
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type GalleryResult<T> = std::result::Result<T, GalleryError>;
