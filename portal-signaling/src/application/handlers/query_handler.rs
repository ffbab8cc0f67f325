//! 查询处理器（编排层）

use std::sync::Arc;

use tracing::instrument;

use portal_core::Result;

use crate::application::queries::{
    CallHistoryQuery, IncomingCallQuery, ListAppointmentsQuery, NotificationsQuery,
    NotificationsView, PresenceQuery,
};
use crate::domain::model::{Appointment, CallSession, PresenceRecord};
use crate::domain::service::{
    AppointmentRegistry, CallSignalingChannel, NotificationDispatcher, PresenceTracker,
};

/// 门户查询处理器
pub struct PortalQueryHandler {
    registry: Arc<AppointmentRegistry>,
    channel: Arc<CallSignalingChannel>,
    dispatcher: Arc<NotificationDispatcher>,
    presence: Arc<PresenceTracker>,
}

impl PortalQueryHandler {
    pub fn new(
        registry: Arc<AppointmentRegistry>,
        channel: Arc<CallSignalingChannel>,
        dispatcher: Arc<NotificationDispatcher>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            registry,
            channel,
            dispatcher,
            presence,
        }
    }

    #[instrument(skip(self))]
    pub async fn handle_list_appointments(
        &self,
        query: ListAppointmentsQuery,
    ) -> Result<Vec<Appointment>> {
        let list = self
            .registry
            .list(move |a| {
                query.student_id.as_ref().is_none_or(|s| a.student_id == *s)
                    && query.status.is_none_or(|s| a.status == s)
            })
            .await?;
        Ok(list.to_vec())
    }

    #[instrument(skip(self), fields(user_id = %query.user_id))]
    pub async fn handle_incoming_call(&self, query: IncomingCallQuery) -> Option<CallSession> {
        self.channel.poll_incoming(&query.user_id, query.role).await
    }

    #[instrument(skip(self), fields(user_id = %query.user_id))]
    pub async fn handle_call_history(&self, query: CallHistoryQuery) -> Result<Vec<CallSession>> {
        self.channel.history(&query.user_id).await
    }

    #[instrument(skip(self), fields(recipient = %query.recipient.user_id))]
    pub async fn handle_notifications(&self, query: NotificationsQuery) -> Result<NotificationsView> {
        let items = self.dispatcher.list(&query.recipient).await?;
        let unread = items.iter().filter(|n| !n.read).count();
        Ok(NotificationsView { items, unread })
    }

    /// 在线状态仅供参考
    #[instrument(skip(self))]
    pub async fn handle_presence(&self, query: PresenceQuery) -> Vec<PresenceRecord> {
        let snapshot = self.presence.snapshot().await;
        match query.user_id {
            Some(user) => snapshot.into_iter().filter(|r| r.user_id == user).collect(),
            None => snapshot,
        }
    }
}
