//! 领域事件（Domain Events）
//!
//! 预约批准、通话邀请、聊天消息三类事件，每个变体只携带该事件需要的字段。
//! 通知分发器把事件转换为接收者的通知记录。

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::model::{NotificationKind, Recipient};
use crate::domain::value_object::{AppointmentId, CallId, Role, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    AppointmentApproved {
        appointment_id: AppointmentId,
        student_id: UserId,
        date: NaiveDate,
        time: NaiveTime,
        purpose: String,
        occurred_at: DateTime<Utc>,
    },
    CallInvited {
        call_id: CallId,
        appointment_id: AppointmentId,
        caller_role: Role,
        callee_id: UserId,
        occurred_at: DateTime<Utc>,
    },
    ChatMessagePosted {
        message_id: String,
        sender_name: String,
        recipient_id: UserId,
        recipient_role: Role,
        preview: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AppointmentApproved { .. } => "AppointmentApproved",
            DomainEvent::CallInvited { .. } => "CallInvited",
            DomainEvent::ChatMessagePosted { .. } => "ChatMessagePosted",
        }
    }

    /// 事件的接收者
    pub fn recipients(&self) -> Vec<Recipient> {
        match self {
            DomainEvent::AppointmentApproved { student_id, .. } => {
                vec![Recipient::new(student_id.clone(), Role::Student)]
            }
            DomainEvent::CallInvited {
                callee_id,
                caller_role,
                ..
            } => vec![Recipient::new(callee_id.clone(), caller_role.counterpart())],
            DomainEvent::ChatMessagePosted {
                recipient_id,
                recipient_role,
                ..
            } => vec![Recipient::new(recipient_id.clone(), *recipient_role)],
        }
    }

    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            DomainEvent::AppointmentApproved { .. } => NotificationKind::Appointment,
            DomainEvent::CallInvited { .. } => NotificationKind::Call,
            DomainEvent::ChatMessagePosted { .. } => NotificationKind::Message,
        }
    }

    /// 逻辑事件来源ID（用于通知去重）
    pub fn source_id(&self) -> String {
        match self {
            DomainEvent::AppointmentApproved { appointment_id, .. } => {
                format!("appointment-{}", appointment_id)
            }
            DomainEvent::CallInvited { call_id, .. } => format!("call-{}", call_id),
            DomainEvent::ChatMessagePosted { message_id, .. } => format!("chat-{}", message_id),
        }
    }

    /// 通知标题与正文
    pub fn render(&self) -> (String, String) {
        match self {
            DomainEvent::AppointmentApproved {
                date,
                time,
                purpose,
                ..
            } => (
                "Appointment Approved".to_string(),
                format!(
                    "Your appointment on {} at {} ({}) has been approved.",
                    date,
                    time.format("%H:%M"),
                    purpose
                ),
            ),
            DomainEvent::CallInvited { caller_role, .. } => (
                "Incoming Call".to_string(),
                match caller_role {
                    Role::Scad => "SCAD officer is calling you.".to_string(),
                    Role::Student => "A student is calling you.".to_string(),
                },
            ),
            DomainEvent::ChatMessagePosted {
                sender_name,
                preview,
                ..
            } => (format!("New message from {}", sender_name), preview.clone()),
        }
    }
}
