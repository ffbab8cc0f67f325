//! CallSession 聚合根
//!
//! 职责：表示一次通话的邀请 / 接听 / 拒绝 / 结束生命周期
//!
//! 聚合根特性：
//! 1. 所有状态修改都通过方法，保证不变性约束
//! 2. ended / rejected 为吸收态，之后的任何迁移都是无操作
//! 3. accepted 与 rejected 至多一个为 true，两者都为 false 表示仍在振铃

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_object::{AppointmentId, CallId, Role, UserId};

/// 通话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Active,
    Ended,
    Rejected,
}

/// 通话离开 active 的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// 接通后挂断
    Hangup,
    /// 振铃中主叫取消
    Cancelled,
    /// 被叫拒接
    Declined,
    /// 振铃超时未接
    Missed,
}

/// CallSession 聚合根
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    id: CallId,
    appointment_id: AppointmentId,
    participants: BTreeSet<UserId>,
    initiated_by: Role,
    status: CallStatus,
    accepted: bool,
    rejected: bool,
    start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_reason: Option<EndReason>,
}

/// CallSession 创建参数
pub struct CallSessionCreateParams {
    pub id: CallId,
    pub appointment_id: AppointmentId,
    pub caller_id: UserId,
    pub caller_role: Role,
    pub callee_id: UserId,
}

impl CallSession {
    // ==================== 工厂方法 ====================

    /// 发起新通话：active、未接听、未拒绝
    pub fn initiate(params: CallSessionCreateParams, now: DateTime<Utc>) -> Self {
        let mut participants = BTreeSet::new();
        participants.insert(params.caller_id);
        participants.insert(params.callee_id);

        Self {
            id: params.id,
            appointment_id: params.appointment_id,
            participants,
            initiated_by: params.caller_role,
            status: CallStatus::Active,
            accepted: false,
            rejected: false,
            start_time: now,
            end_time: None,
            end_reason: None,
        }
    }

    // ==================== 命令方法（修改状态）====================
    // 返回值表示是否发生了可观察的变化

    /// 接听：仅振铃中有效，幂等
    pub fn accept(&mut self) -> bool {
        if !self.is_ringing() {
            return false;
        }
        self.accepted = true;
        true
    }

    /// 拒接：仅振铃中有效，幂等
    pub fn reject(&mut self, now: DateTime<Utc>) -> bool {
        self.reject_with(now, EndReason::Declined)
    }

    /// 结束：active 期间任一方可调用；振铃中结束视为取消
    pub fn end(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != CallStatus::Active {
            return false;
        }
        self.status = CallStatus::Ended;
        self.end_time = Some(now);
        self.end_reason = Some(if self.accepted {
            EndReason::Hangup
        } else {
            EndReason::Cancelled
        });
        true
    }

    /// 振铃超时：超过 `timeout` 仍未应答则自动拒接为未接
    pub fn expire_if_unanswered(&mut self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if !self.is_ringing() || now - self.start_time < timeout {
            return false;
        }
        self.reject_with(now, EndReason::Missed)
    }

    fn reject_with(&mut self, now: DateTime<Utc>, reason: EndReason) -> bool {
        if !self.is_ringing() {
            return false;
        }
        self.rejected = true;
        self.status = CallStatus::Rejected;
        self.end_time = Some(now);
        self.end_reason = Some(reason);
        true
    }

    // ==================== 查询方法 ====================

    /// 仍在振铃：active 且既未接听也未拒绝
    pub fn is_ringing(&self) -> bool {
        self.status == CallStatus::Active && !self.accepted && !self.rejected
    }

    /// 已接通
    pub fn is_connected(&self) -> bool {
        self.status == CallStatus::Active && self.accepted
    }

    /// ended / rejected 为吸收态
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, CallStatus::Ended | CallStatus::Rejected)
    }

    /// 对用户 `user`（角色 `role`）而言是否为来电
    ///
    /// 一方永远不会把自己发起的通话视为来电
    pub fn is_incoming_for(&self, user: &UserId, role: Role) -> bool {
        self.is_ringing() && self.participants.contains(user) && self.initiated_by != role
    }

    pub fn involves(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    /// 对端参与者（用于媒体远端标签）
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        self.participants.iter().find(|p| *p != user)
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn appointment_id(&self) -> AppointmentId {
        self.appointment_id
    }

    pub fn participants(&self) -> &BTreeSet<UserId> {
        &self.participants
    }

    pub fn initiated_by(&self) -> Role {
        self.initiated_by
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }

    pub fn rejected(&self) -> bool {
        self.rejected
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }
}
