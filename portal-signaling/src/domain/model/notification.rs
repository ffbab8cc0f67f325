//! 通知模型
//!
//! 由通知分发器根据领域事件生成，归接收者所有，只允许标记已读

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_object::{NotificationId, Role, UserId};

/// 每个接收者保留的通知上限
pub const DEFAULT_NOTIFICATION_CAP: usize = 50;

/// 通知类型，类型集合是开放的：其它组件写入的未知类型原样保留
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Appointment,
    Workshop,
    Call,
    Message,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Appointment => "appointment",
            NotificationKind::Workshop => "workshop",
            NotificationKind::Call => "call",
            NotificationKind::Message => "message",
            NotificationKind::Other(raw) => raw,
        }
    }
}

impl From<String> for NotificationKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "appointment" => NotificationKind::Appointment,
            "workshop" => NotificationKind::Workshop,
            "call" => NotificationKind::Call,
            "message" => NotificationKind::Message,
            _ => NotificationKind::Other(raw),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub read: bool,
    pub source_id: String,
}

impl Notification {
    /// 同一逻辑事件的去重键
    pub fn is_same_occurrence(&self, kind: &NotificationKind, source_id: &str) -> bool {
        self.kind == *kind && self.source_id == source_id
    }
}

/// 通知接收者
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub user_id: UserId,
    pub role: Role,
}

impl Recipient {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// 接收者通知列表的存储键
    pub fn storage_key(&self) -> String {
        let prefix = match self.role {
            Role::Student => "studentNotifications",
            Role::Scad => "scadNotifications",
        };
        format!("{}:{}", prefix, self.user_id)
    }
}
