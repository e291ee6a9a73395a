//! 会话状态模型

use crate::gallery::event::Event;

/// 组织者会话使用的固定显示名，重启后据此恢复组织者身份
pub const ORGANIZER_NAME: &str = "Organizer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    Organizer,
}

impl Role {
    /// 由持久化的显示名推导身份
    pub fn from_user_name(user_name: &str) -> Self {
        if user_name == ORGANIZER_NAME {
            Role::Organizer
        } else {
            Role::Guest
        }
    }
}

/// 会话状态机：`Anonymous -> Joined -> Anonymous`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Joined {
        event: Event,
        user_name: String,
        role: Role,
    },
}

impl Session {
    pub fn guest(event: Event, user_name: impl Into<String>) -> Self {
        Session::Joined {
            event,
            user_name: user_name.into(),
            role: Role::Guest,
        }
    }

    pub fn organizer(event: Event) -> Self {
        Session::Joined {
            event,
            user_name: ORGANIZER_NAME.to_string(),
            role: Role::Organizer,
        }
    }

    /// 从本地存储恢复
    pub fn restored(event: Event, user_name: String) -> Self {
        let role = Role::from_user_name(&user_name);
        Session::Joined {
            event,
            user_name,
            role,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, Session::Joined { .. })
    }

    pub fn is_organizer(&self) -> bool {
        matches!(
            self,
            Session::Joined {
                role: Role::Organizer,
                ..
            }
        )
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Session::Joined { event, .. } => Some(event),
            Session::Anonymous => None,
        }
    }

    pub fn event_mut(&mut self) -> Option<&mut Event> {
        match self {
            Session::Joined { event, .. } => Some(event),
            Session::Anonymous => None,
        }
    }

    pub fn user_name(&self) -> Option<&str> {
        match self {
            Session::Joined { user_name, .. } => Some(user_name),
            Session::Anonymous => None,
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event().map(|e| e.id.as_str())
    }
}
