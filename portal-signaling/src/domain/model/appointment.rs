//! 预约模型
//!
//! 学生与 SCAD 之间的面谈预约，状态单调：pending → approved | rejected

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use portal_core::{PortalError, Result, ensure_present};

use crate::domain::value_object::{AppointmentId, Role, UserId};

/// 预约状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppointmentStatus {
    /// approved / rejected 为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Approved => "approved",
            AppointmentStatus::Rejected => "rejected",
        }
    }
}

/// 状态迁移结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// 状态发生变化
    Applied,
    /// 目标状态与当前一致，无操作
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub date: NaiveDate,
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
    pub purpose: String,
    pub status: AppointmentStatus,
    pub requested_by: Role,
    pub student_id: UserId,
    #[serde(default)]
    pub student_name: String,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// 由表单草稿创建新预约，初始状态固定为 pending
    pub fn from_draft(id: AppointmentId, draft: ValidatedDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            date: draft.date,
            time: draft.time,
            purpose: draft.purpose,
            status: AppointmentStatus::Pending,
            requested_by: draft.requested_by,
            student_id: draft.student_id,
            student_name: draft.student_name,
            created_at: now,
        }
    }

    /// 迁移状态
    ///
    /// - 目标与当前相同：无操作
    /// - 目标为 pending：不允许回退
    /// - 当前已是终态：单调约束，拒绝
    pub fn transition(&mut self, target: AppointmentStatus) -> Result<StatusTransition> {
        if self.status == target {
            return Ok(StatusTransition::Unchanged);
        }
        if target == AppointmentStatus::Pending {
            return Err(PortalError::validation(
                "appointment status cannot be set back to pending",
            ));
        }
        if self.status.is_terminal() {
            return Err(PortalError::precondition(format!(
                "appointment {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = target;
        Ok(StatusTransition::Applied)
    }
}

/// 预约表单草稿（来自 UI 表单协作方，字段均为原始字符串）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDraft {
    pub date: String,
    pub time: String,
    pub purpose: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    pub requested_by: Option<Role>,
}

/// 校验通过的草稿
#[derive(Debug, Clone)]
pub struct ValidatedDraft {
    date: NaiveDate,
    time: NaiveTime,
    purpose: String,
    student_id: UserId,
    student_name: String,
    requested_by: Role,
}

impl AppointmentDraft {
    /// 校验必填字段（date、time、purpose、studentId）及日期时间格式
    pub fn validate(self) -> Result<ValidatedDraft> {
        ensure_present!(self.date, "date");
        ensure_present!(self.time, "time");
        ensure_present!(self.purpose, "purpose");
        ensure_present!(self.student_id, "studentId");

        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|e| {
            PortalError::validation(format!("invalid date `{}`: {e}", self.date))
        })?;
        let time = hh_mm::parse(self.time.trim())
            .map_err(|e| PortalError::validation(format!("invalid time `{}`: {e}", self.time)))?;

        Ok(ValidatedDraft {
            date,
            time,
            purpose: self.purpose.trim().to_string(),
            student_id: UserId::new(self.student_id.trim())?,
            student_name: self.student_name.trim().to_string(),
            requested_by: self.requested_by.unwrap_or(Role::Student),
        })
    }
}

/// `HH:MM` 格式的时间（兼容 `HH:MM:SS`，秒不为 0 时原样写回）
mod hh_mm {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        let format = if time.second() == 0 { "%H:%M" } else { "%H:%M:%S" };
        serializer.serialize_str(&time.format(format).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AppointmentDraft {
        AppointmentDraft {
            date: "2025-06-01".to_string(),
            time: "10:00".to_string(),
            purpose: "CV review".to_string(),
            student_id: "s-1".to_string(),
            student_name: "Mona".to_string(),
            requested_by: None,
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        for field in ["date", "time", "purpose", "studentId"] {
            let mut d = draft();
            match field {
                "date" => d.date.clear(),
                "time" => d.time.clear(),
                "purpose" => d.purpose.clear(),
                _ => d.student_id.clear(),
            }
            let err = d.validate().unwrap_err();
            assert!(matches!(err, PortalError::Validation(ref m) if m.contains(field)));
        }
    }

    #[test]
    fn test_malformed_date_rejected() {
        let mut d = draft();
        d.date = "01/06/2025".to_string();
        assert!(matches!(d.validate(), Err(PortalError::Validation(_))));
    }

    #[test]
    fn test_transition_is_monotone() {
        let mut appt = Appointment::from_draft(AppointmentId::new(1), draft().validate().unwrap(), Utc::now());
        assert_eq!(appt.status, AppointmentStatus::Pending);
        assert_eq!(
            appt.transition(AppointmentStatus::Approved).unwrap(),
            StatusTransition::Applied
        );
        assert_eq!(
            appt.transition(AppointmentStatus::Approved).unwrap(),
            StatusTransition::Unchanged
        );
        assert!(matches!(
            appt.transition(AppointmentStatus::Rejected),
            Err(PortalError::Precondition(_))
        ));
        assert!(matches!(
            appt.transition(AppointmentStatus::Pending),
            Err(PortalError::Validation(_))
        ));
    }

    #[test]
    fn test_persisted_layout() {
        let appt = Appointment::from_draft(AppointmentId::new(3), draft().validate().unwrap(), Utc::now());
        let json = serde_json::to_value(&appt).unwrap();
        assert_eq!(json["time"], "10:00");
        assert_eq!(json["date"], "2025-06-01");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["requestedBy"], "student");
        assert_eq!(json["studentId"], "s-1");
    }

    #[test]
    fn test_seconds_survive_persistence() {
        let mut d = draft();
        d.time = "10:00:30".to_string();
        let appt = Appointment::from_draft(AppointmentId::new(4), d.validate().unwrap(), Utc::now());

        let json = serde_json::to_string(&appt).unwrap();
        assert!(json.contains("\"time\":\"10:00:30\""));
        let restored: Appointment = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, appt);
    }
}
