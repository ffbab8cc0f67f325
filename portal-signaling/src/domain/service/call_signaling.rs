//! 通话信令领域服务
//!
//! 双方从不直接通信，只通过共享存储中的 `callHistory` 集合重新发现状态。
//! 每个迁移都是幂等的，ended / rejected 为吸收态，因此任意交错下结果收敛。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use portal_core::{PortalError, Result, elapsed_secs};

use crate::domain::event::DomainEvent;
use crate::domain::model::{
    Appointment, AppointmentStatus, CallSession, CallSessionCreateParams,
};
use crate::domain::repository::{
    APPOINTMENTS_KEY, CALL_HISTORY_KEY, Collection, DomainEventPublisher, Mutation, SharedStore,
    StoreChange,
};
use crate::domain::value_object::{AppointmentId, CallId, Role, UserId};

pub struct CallSignalingChannel {
    calls: Collection<CallSession>,
    appointments: Collection<Appointment>,
    publisher: Arc<dyn DomainEventPublisher>,
    /// None 表示振铃不超时
    ring_timeout: Option<chrono::Duration>,
}

impl CallSignalingChannel {
    pub fn new(
        store: Arc<dyn SharedStore>,
        max_retries: u32,
        ring_timeout: Option<Duration>,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self {
            calls: Collection::new(store.clone(), CALL_HISTORY_KEY, max_retries),
            appointments: Collection::new(store, APPOINTMENTS_KEY, max_retries),
            publisher,
            ring_timeout: ring_timeout
                .map(|t| chrono::Duration::from_std(t).unwrap_or(chrono::Duration::MAX)),
        }
    }

    /// 发起通话
    ///
    /// 预约必须存在且已批准，否则返回 `Precondition` 且不创建会话
    pub async fn initiate(
        &self,
        appointment_id: AppointmentId,
        caller_role: Role,
        caller_id: UserId,
        callee_id: UserId,
    ) -> Result<CallSession> {
        if caller_id == callee_id {
            return Err(PortalError::validation("caller and callee must differ"));
        }

        let appointment = self
            .appointments
            .load()
            .await?
            .into_iter()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| {
                PortalError::precondition(format!("appointment {appointment_id} does not exist"))
            })?;

        if appointment.status != AppointmentStatus::Approved {
            return Err(PortalError::precondition(format!(
                "appointment {appointment_id} is {}, calls require an approved appointment",
                appointment.status.as_str()
            )));
        }

        let student = match caller_role {
            Role::Student => &caller_id,
            Role::Scad => &callee_id,
        };
        if *student != appointment.student_id {
            return Err(PortalError::precondition(format!(
                "appointment {appointment_id} belongs to another student"
            )));
        }

        let session = self
            .calls
            .update(|calls| {
                let id = CallId::next_after(calls.iter().map(|c| c.id()));
                let session = CallSession::initiate(
                    CallSessionCreateParams {
                        id,
                        appointment_id,
                        caller_id: caller_id.clone(),
                        caller_role,
                        callee_id: callee_id.clone(),
                    },
                    Utc::now(),
                );
                calls.push(session.clone());
                Ok(Mutation::Commit(session))
            })
            .await?;

        info!(
            call_id = %session.id(),
            appointment_id = %appointment_id,
            caller = %caller_id,
            callee = %callee_id,
            caller_role = %caller_role,
            "call initiated"
        );

        let event = DomainEvent::CallInvited {
            call_id: session.id(),
            appointment_id,
            caller_role,
            callee_id,
            occurred_at: session.start_time(),
        };
        if let Err(e) = self.publisher.publish(event).await {
            warn!(call_id = %session.id(), error = %e, "failed to publish CallInvited");
        }

        Ok(session)
    }

    /// 查询用户的来电，返回 id 最小的一条
    ///
    /// 存储数据无法解析时视为没有来电，不让轮询方卡住
    pub async fn poll_incoming(&self, user: &UserId, role: Role) -> Option<CallSession> {
        let calls = match self.calls.load_strict().await {
            Ok(calls) => calls,
            Err(e) => {
                warn!(user = %user, error = %e, "incoming poll failed, reporting no call");
                return None;
            }
        };

        calls
            .into_iter()
            .filter(|c| c.is_incoming_for(user, role))
            .min_by_key(|c| c.id())
    }

    /// 接听，幂等
    pub async fn accept(&self, id: CallId) -> Result<CallSession> {
        self.apply(id, "accept", |session| session.accept()).await
    }

    /// 拒接，幂等
    pub async fn reject(&self, id: CallId) -> Result<CallSession> {
        self.apply(id, "reject", |session| session.reject(Utc::now()))
            .await
    }

    /// 结束，双方在 active 期间任意时刻均可调用
    pub async fn end(&self, id: CallId) -> Result<CallSession> {
        self.apply(id, "end", |session| session.end(Utc::now())).await
    }

    async fn apply<F>(&self, id: CallId, action: &'static str, transition: F) -> Result<CallSession>
    where
        F: Fn(&mut CallSession) -> bool + Send + Sync,
    {
        let (session, changed) = self
            .calls
            .update(|calls| {
                let session = calls
                    .iter_mut()
                    .find(|c| c.id() == id)
                    .ok_or_else(|| PortalError::not_found("CallSession", id))?;
                if transition(session) {
                    Ok(Mutation::Commit((session.clone(), true)))
                } else {
                    Ok(Mutation::Unchanged((session.clone(), false)))
                }
            })
            .await?;

        if changed {
            let duration_secs = session
                .end_time()
                .map(|end| elapsed_secs(session.start_time(), end));
            info!(
                call_id = %id,
                action,
                status = ?session.status(),
                end_reason = ?session.end_reason(),
                duration_secs = ?duration_secs,
                "call session updated"
            );
        } else {
            debug!(call_id = %id, action, status = ?session.status(), "call transition was a no-op");
        }
        Ok(session)
    }

    /// 把振铃超时的会话标记为未接，返回受影响的会话 id；未配置超时时不做任何事
    pub async fn expire_ringing(&self, now: DateTime<Utc>) -> Result<Vec<CallId>> {
        let Some(timeout) = self.ring_timeout else {
            return Ok(Vec::new());
        };
        let expired = self
            .calls
            .update(|calls| {
                let expired: Vec<CallId> = calls
                    .iter_mut()
                    .filter_map(|c| c.expire_if_unanswered(now, timeout).then(|| c.id()))
                    .collect();
                Ok(if expired.is_empty() {
                    Mutation::Unchanged(expired)
                } else {
                    Mutation::Commit(expired)
                })
            })
            .await?;

        for id in &expired {
            info!(call_id = %id, "ringing call timed out, marked as missed");
        }
        Ok(expired)
    }

    pub async fn get(&self, id: CallId) -> Result<Option<CallSession>> {
        Ok(self.calls.load().await?.into_iter().find(|c| c.id() == id))
    }

    /// 用户参与过的全部通话，最新在前
    pub async fn history(&self, user: &UserId) -> Result<Vec<CallSession>> {
        let mut calls: Vec<CallSession> = self
            .calls
            .load()
            .await?
            .into_iter()
            .filter(|c| c.involves(user))
            .collect();
        calls.sort_by(|a, b| {
            b.start_time()
                .cmp(&a.start_time())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(calls)
    }

    /// 订阅通话集合变更
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<StoreChange>> {
        self.calls.subscribe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{AppointmentDraft, CallStatus, EndReason, Recipient};
    use crate::domain::service::{AppointmentRegistry, NotificationDispatcher};
    use crate::infrastructure::adapters::AllowListEntitlement;
    use crate::infrastructure::store::InMemorySharedStore;

    struct Fixture {
        store: Arc<InMemorySharedStore>,
        registry: AppointmentRegistry,
        channel: CallSignalingChannel,
        dispatcher: Arc<NotificationDispatcher>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemorySharedStore::new());
        let shared: Arc<dyn SharedStore> = store.clone();
        let dispatcher = Arc::new(NotificationDispatcher::new(shared.clone(), 50, 8));
        let registry = AppointmentRegistry::new(
            shared.clone(),
            8,
            Arc::new(AllowListEntitlement::default()),
            dispatcher.clone(),
        );
        let channel =
            CallSignalingChannel::new(shared, 8, Some(Duration::from_secs(45)), dispatcher.clone());
        Fixture {
            store,
            registry,
            channel,
            dispatcher,
        }
    }

    fn student() -> UserId {
        UserId::new("s-1").unwrap()
    }

    fn scad() -> UserId {
        UserId::new("scad-1").unwrap()
    }

    async fn approved_appointment(f: &Fixture) -> AppointmentId {
        let appt = f
            .registry
            .create(AppointmentDraft {
                date: "2025-06-01".to_string(),
                time: "10:00".to_string(),
                purpose: "CV review".to_string(),
                student_id: "s-1".to_string(),
                student_name: "Mona".to_string(),
                requested_by: Some(Role::Student),
            })
            .await
            .unwrap();
        f.registry
            .set_status(appt.id, AppointmentStatus::Approved)
            .await
            .unwrap();
        appt.id
    }

    #[tokio::test]
    async fn test_initiate_requires_approved_appointment() {
        let f = fixture();
        let appt = f
            .registry
            .create(AppointmentDraft {
                date: "2025-06-01".to_string(),
                time: "10:00".to_string(),
                purpose: "CV review".to_string(),
                student_id: "s-1".to_string(),
                student_name: String::new(),
                requested_by: None,
            })
            .await
            .unwrap();

        let result = f
            .channel
            .initiate(appt.id, Role::Scad, scad(), student())
            .await;
        assert!(matches!(result, Err(PortalError::Precondition(_))));
        assert!(f.channel.history(&student()).await.unwrap().is_empty());

        let missing = f
            .channel
            .initiate(AppointmentId::new(42), Role::Scad, scad(), student())
            .await;
        assert!(matches!(missing, Err(PortalError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_initiate_checks_student_participant() {
        let f = fixture();
        let appt = approved_appointment(&f).await;
        let other = UserId::new("s-2").unwrap();
        let result = f.channel.initiate(appt, Role::Scad, scad(), other).await;
        assert!(matches!(result, Err(PortalError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_invite_is_incoming_only_for_callee() {
        let f = fixture();
        let appt = approved_appointment(&f).await;
        let session = f
            .channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();

        let incoming = f.channel.poll_incoming(&student(), Role::Student).await;
        assert_eq!(incoming.as_ref().map(|c| c.id()), Some(session.id()));
        assert_eq!(incoming.unwrap().initiated_by(), Role::Scad);
        assert!(f.channel.poll_incoming(&scad(), Role::Scad).await.is_none());

        // 被叫收到来电通知
        let inbox = f
            .dispatcher
            .list(&Recipient::new(student(), Role::Student))
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].source_id, format!("call-{}", session.id()));
    }

    #[tokio::test]
    async fn test_poll_returns_lowest_id() {
        let f = fixture();
        let appt = approved_appointment(&f).await;
        let first = f
            .channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();
        f.channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();

        let incoming = f.channel.poll_incoming(&student(), Role::Student).await;
        assert_eq!(incoming.map(|c| c.id()), Some(first.id()));
    }

    #[tokio::test]
    async fn test_poll_fails_open_on_corrupt_data() {
        let f = fixture();
        f.store.put_raw(CALL_HISTORY_KEY, "{not json");
        assert!(f.channel.poll_incoming(&student(), Role::Student).await.is_none());
    }

    #[tokio::test]
    async fn test_accept_then_end() {
        let f = fixture();
        let appt = approved_appointment(&f).await;
        let session = f
            .channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();

        let accepted = f.channel.accept(session.id()).await.unwrap();
        assert!(accepted.accepted());
        assert!(f.channel.poll_incoming(&student(), Role::Student).await.is_none());

        let ended = f.channel.end(session.id()).await.unwrap();
        assert_eq!(ended.status(), CallStatus::Ended);
        assert_eq!(ended.end_reason(), Some(EndReason::Hangup));

        // 吸收态
        assert_eq!(f.channel.accept(session.id()).await.unwrap(), ended);
        assert_eq!(f.channel.reject(session.id()).await.unwrap(), ended);
        assert_eq!(f.channel.end(session.id()).await.unwrap(), ended);
    }

    #[tokio::test]
    async fn test_reject_is_absorbing() {
        let f = fixture();
        let appt = approved_appointment(&f).await;
        let session = f
            .channel
            .initiate(appt, Role::Student, student(), scad())
            .await
            .unwrap();

        let rejected = f.channel.reject(session.id()).await.unwrap();
        assert_eq!(rejected.status(), CallStatus::Rejected);
        assert!(rejected.end_time().is_some());
        assert_eq!(f.channel.accept(session.id()).await.unwrap(), rejected);
        assert_eq!(f.channel.end(session.id()).await.unwrap(), rejected);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture();
        assert!(matches!(
            f.channel.accept(CallId::new(9)).await,
            Err(PortalError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_expire_ringing() {
        let f = fixture();
        let appt = approved_appointment(&f).await;
        let ringing = f
            .channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();
        let answered = f
            .channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();
        f.channel.accept(answered.id()).await.unwrap();

        let now = ringing.start_time();
        assert!(f.channel.expire_ringing(now).await.unwrap().is_empty());

        let later = now + chrono::Duration::seconds(46);
        assert_eq!(
            f.channel.expire_ringing(later).await.unwrap(),
            vec![ringing.id()]
        );
        let missed = f.channel.get(ringing.id()).await.unwrap().unwrap();
        assert_eq!(missed.end_reason(), Some(EndReason::Missed));
        assert!(f.channel.get(answered.id()).await.unwrap().unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_expire_ringing_disabled() {
        let f = fixture();
        let channel = CallSignalingChannel::new(f.store.clone(), 8, None, f.dispatcher.clone());
        let appt = approved_appointment(&f).await;
        let ringing = channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();

        let much_later = ringing.start_time() + chrono::Duration::hours(6);
        assert!(channel.expire_ringing(much_later).await.unwrap().is_empty());
        assert!(channel.get(ringing.id()).await.unwrap().unwrap().is_ringing());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let f = fixture();
        let appt = approved_appointment(&f).await;
        let a = f
            .channel
            .initiate(appt, Role::Scad, scad(), student())
            .await
            .unwrap();
        let b = f
            .channel
            .initiate(appt, Role::Student, student(), scad())
            .await
            .unwrap();

        let ids: Vec<CallId> = f
            .channel
            .history(&student())
            .await
            .unwrap()
            .iter()
            .map(|c| c.id())
            .collect();
        assert_eq!(ids, vec![b.id(), a.id()]);
        assert!(
            f.channel
                .history(&UserId::new("s-9").unwrap())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
