//! 命令结构体定义（Command DTO）

use crate::domain::model::{AppointmentDraft, AppointmentStatus, Recipient};
use crate::domain::value_object::{AppointmentId, CallId, NotificationId, Role, UserId};

/// 创建预约命令
#[derive(Debug, Clone)]
pub struct CreateAppointmentCommand {
    /// 表单草稿
    pub draft: AppointmentDraft,
}

/// 设置预约状态命令
#[derive(Debug, Clone)]
pub struct SetAppointmentStatusCommand {
    pub appointment_id: AppointmentId,
    pub status: AppointmentStatus,
}

/// 发起通话命令
#[derive(Debug, Clone)]
pub struct InitiateCallCommand {
    pub appointment_id: AppointmentId,
    pub caller_role: Role,
    pub caller_id: UserId,
    pub callee_id: UserId,
}

/// 通话动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    Accept,
    Reject,
    End,
}

/// 通话动作命令
#[derive(Debug, Clone)]
pub struct CallActionCommand {
    pub call_id: CallId,
    pub action: CallAction,
}

/// 发布聊天消息命令（只生成通知，消息本身由聊天协作方保存）
#[derive(Debug, Clone)]
pub struct PostChatMessageCommand {
    /// 为空时自动生成
    pub message_id: Option<String>,
    pub sender_name: String,
    pub recipient_id: UserId,
    pub recipient_role: Role,
    pub body: String,
}

/// 标记通知已读命令
#[derive(Debug, Clone)]
pub struct MarkNotificationsReadCommand {
    pub recipient: Recipient,
    /// 为空时全部标记
    pub notification_id: Option<NotificationId>,
}
