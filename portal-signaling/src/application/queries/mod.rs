//! 查询结构体定义（Query DTO）

use crate::domain::model::{AppointmentStatus, Notification, Recipient};
use crate::domain::value_object::{Role, UserId};

/// 预约列表查询，条件为空表示不过滤
#[derive(Debug, Clone, Default)]
pub struct ListAppointmentsQuery {
    pub student_id: Option<UserId>,
    pub status: Option<AppointmentStatus>,
}

/// 来电查询
#[derive(Debug, Clone)]
pub struct IncomingCallQuery {
    pub user_id: UserId,
    pub role: Role,
}

/// 通话记录查询
#[derive(Debug, Clone)]
pub struct CallHistoryQuery {
    pub user_id: UserId,
}

/// 通知查询
#[derive(Debug, Clone)]
pub struct NotificationsQuery {
    pub recipient: Recipient,
}

/// 在线状态查询，`user_id` 为空时返回全部快照
#[derive(Debug, Clone, Default)]
pub struct PresenceQuery {
    pub user_id: Option<UserId>,
}

/// 通知收件箱视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationsView {
    pub items: Vec<Notification>,
    pub unread: usize,
}
