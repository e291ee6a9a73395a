//! 入场校验
//!
//! 只做本地校验与规范化（去空白、转大写），不访问后端；
//! 校验通过后得到 [`Credentials`]，交给客户端的 `join` 完成验证。

use crate::gallery::error::{GalleryError, GalleryResult};
use crate::gallery::session::ORGANIZER_NAME;

pub const MIN_GUEST_NAME_LEN: usize = 2;
pub const MIN_EVENT_CODE_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Guest,
    Organizer,
}

/// 入场表单
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessForm {
    pub mode: AccessMode,
    pub event_code: String,
    pub user_name: String,
    pub organizer_code: String,
}

/// 身份凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Guest { user_name: String },
    /// 组织者口令没有本地长度校验
    Organizer { organizer_code: String },
}

/// 校验并规范化后的入场凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// 已转为大写
    pub event_code: String,
    pub identity: Identity,
}

impl AccessForm {
    pub fn guest(event_code: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            mode: AccessMode::Guest,
            event_code: event_code.into(),
            user_name: user_name.into(),
            organizer_code: String::new(),
        }
    }

    pub fn organizer(event_code: impl Into<String>, organizer_code: impl Into<String>) -> Self {
        Self {
            mode: AccessMode::Organizer,
            event_code: event_code.into(),
            user_name: String::new(),
            organizer_code: organizer_code.into(),
        }
    }

    /// 在访客 / 组织者之间切换，同时清空已填内容
    pub fn toggle_mode(&mut self) {
        let mode = match self.mode {
            AccessMode::Guest => AccessMode::Organizer,
            AccessMode::Organizer => AccessMode::Guest,
        };
        *self = Self {
            mode,
            ..Self::default()
        };
    }

    pub fn validate(&self) -> GalleryResult<Credentials> {
        let user_name = self.user_name.trim();
        if self.mode == AccessMode::Guest {
            if user_name.chars().count() < MIN_GUEST_NAME_LEN {
                return Err(GalleryError::validation("Please enter a valid name"));
            }
            if user_name == ORGANIZER_NAME {
                return Err(GalleryError::validation("This name is reserved"));
            }
        }

        let event_code = self.event_code.trim();
        if event_code.chars().count() < MIN_EVENT_CODE_LEN {
            return Err(GalleryError::validation("Please enter a valid event code"));
        }

        let identity = match self.mode {
            AccessMode::Guest => Identity::Guest {
                user_name: user_name.to_string(),
            },
            AccessMode::Organizer => Identity::Organizer {
                organizer_code: self.organizer_code.trim().to_uppercase(),
            },
        };

        Ok(Credentials {
            event_code: event_code.to_uppercase(),
            identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_credentials_are_normalized() {
        let creds = AccessForm::guest(" abc123 ", "  Al ").validate().unwrap();
        assert_eq!(creds.event_code, "ABC123");
        assert_eq!(
            creds.identity,
            Identity::Guest {
                user_name: "Al".into()
            }
        );
    }

    #[test]
    fn short_name_is_rejected_before_code() {
        let err = AccessForm::guest("x", "A").validate().unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid name");
    }

    #[test]
    fn short_code_is_rejected() {
        let err = AccessForm::guest("ab", "Alice").validate().unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid event code");
        let err = AccessForm::organizer("ab", "ORG").validate().unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid event code");
    }

    #[test]
    fn organizer_sentinel_name_is_reserved_for_guests() {
        let err = AccessForm::guest("ABC123", "Organizer").validate().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn organizer_code_is_uppercased_without_length_check() {
        let creds = AccessForm::organizer("abc123", "x").validate().unwrap();
        assert_eq!(
            creds.identity,
            Identity::Organizer {
                organizer_code: "X".into()
            }
        );
    }

    #[test]
    fn toggling_clears_fields() {
        let mut form = AccessForm::guest("ABC123", "Al");
        form.toggle_mode();
        assert_eq!(form.mode, AccessMode::Organizer);
        assert!(form.event_code.is_empty());
        assert!(form.user_name.is_empty());
    }
}
