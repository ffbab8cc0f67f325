//! 预约登记领域服务
//!
//! 负责预约的创建、查询与状态迁移。状态机：pending → approved | rejected，
//! 两个终态都不会再迁移，重新提交会创建新记录。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use portal_core::{PortalError, Result};

use crate::domain::event::DomainEvent;
use crate::domain::model::{Appointment, AppointmentDraft, AppointmentStatus, StatusTransition};
use crate::domain::repository::{
    APPOINTMENTS_KEY, Collection, DomainEventPublisher, EntitlementChecker, Mutation, SharedStore,
};
use crate::domain::value_object::AppointmentId;

pub struct AppointmentRegistry {
    appointments: Collection<Appointment>,
    entitlement: Arc<dyn EntitlementChecker>,
    publisher: Arc<dyn DomainEventPublisher>,
}

/// 预约列表快照，可重复惰性遍历
pub struct AppointmentList<F> {
    snapshot: Vec<Appointment>,
    filter: F,
}

impl<F> AppointmentList<F>
where
    F: Fn(&Appointment) -> bool,
{
    /// 每次调用都从头开始遍历
    pub fn iter(&self) -> impl Iterator<Item = &Appointment> + '_ {
        self.snapshot.iter().filter(move |a| (self.filter)(*a))
    }

    pub fn to_vec(&self) -> Vec<Appointment> {
        self.iter().cloned().collect()
    }
}

impl AppointmentRegistry {
    pub fn new(
        store: Arc<dyn SharedStore>,
        max_retries: u32,
        entitlement: Arc<dyn EntitlementChecker>,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self {
            appointments: Collection::new(store, APPOINTMENTS_KEY, max_retries),
            entitlement,
            publisher,
        }
    }

    /// 创建预约，初始状态为 pending
    pub async fn create(&self, draft: AppointmentDraft) -> Result<Appointment> {
        let validated = draft.validate()?;

        let appointment = self
            .appointments
            .update(|appointments| {
                let id = AppointmentId::next_after(appointments.iter().map(|a| a.id));
                let appointment = Appointment::from_draft(id, validated.clone(), Utc::now());
                appointments.push(appointment.clone());
                Ok(Mutation::Commit(appointment))
            })
            .await?;

        info!(
            appointment_id = %appointment.id,
            student_id = %appointment.student_id,
            requested_by = %appointment.requested_by,
            "appointment created"
        );
        Ok(appointment)
    }

    /// 设置预约状态（approved / rejected），重复设置相同状态为无操作
    ///
    /// 迁移到 approved 时，仅当学生享有 pro 权益才发布 `AppointmentApproved` 事件
    pub async fn set_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        let (appointment, transition) = self
            .appointments
            .update(|appointments| {
                let appointment = appointments
                    .iter_mut()
                    .find(|a| a.id == id)
                    .ok_or_else(|| PortalError::not_found("Appointment", id))?;

                match appointment.transition(status)? {
                    StatusTransition::Applied => {
                        Ok(Mutation::Commit((appointment.clone(), StatusTransition::Applied)))
                    }
                    StatusTransition::Unchanged => Ok(Mutation::Unchanged((
                        appointment.clone(),
                        StatusTransition::Unchanged,
                    ))),
                }
            })
            .await?;

        if transition == StatusTransition::Unchanged {
            return Ok(appointment);
        }

        info!(
            appointment_id = %appointment.id,
            status = appointment.status.as_str(),
            "appointment status changed"
        );

        if appointment.status == AppointmentStatus::Approved {
            self.announce_approval(&appointment).await;
        }

        Ok(appointment)
    }

    async fn announce_approval(&self, appointment: &Appointment) {
        if !self.entitlement.is_pro(&appointment.student_id).await {
            info!(
                appointment_id = %appointment.id,
                student_id = %appointment.student_id,
                "student has no pro entitlement, skipping approval notification"
            );
            return;
        }

        let event = DomainEvent::AppointmentApproved {
            appointment_id: appointment.id,
            student_id: appointment.student_id.clone(),
            date: appointment.date,
            time: appointment.time,
            purpose: appointment.purpose.clone(),
            occurred_at: Utc::now(),
        };

        // 状态已提交，通知失败不回滚
        if let Err(e) = self.publisher.publish(event).await {
            warn!(
                appointment_id = %appointment.id,
                error = %e,
                "failed to publish AppointmentApproved"
            );
        }
    }

    pub async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        Ok(self
            .appointments
            .load()
            .await?
            .into_iter()
            .find(|a| a.id == id))
    }

    /// 按条件列出预约
    pub async fn list<F>(&self, filter: F) -> Result<AppointmentList<F>>
    where
        F: Fn(&Appointment) -> bool,
    {
        Ok(AppointmentList {
            snapshot: self.appointments.load().await?,
            filter,
        })
    }
}
