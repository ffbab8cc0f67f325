//! 命令处理器（编排层）- 轻量级，只负责编排领域服务

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use portal_core::Result;

use crate::application::commands::{
    CallAction, CallActionCommand, CreateAppointmentCommand, InitiateCallCommand,
    MarkNotificationsReadCommand, PostChatMessageCommand, SetAppointmentStatusCommand,
};
use crate::domain::event::DomainEvent;
use crate::domain::model::{Appointment, CallSession};
use crate::domain::service::{AppointmentRegistry, CallSignalingChannel, NotificationDispatcher};

/// 聊天通知正文的最大字符数
const CHAT_PREVIEW_CHARS: usize = 80;

/// 门户命令处理器（编排层）
pub struct PortalCommandHandler {
    registry: Arc<AppointmentRegistry>,
    channel: Arc<CallSignalingChannel>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl PortalCommandHandler {
    pub fn new(
        registry: Arc<AppointmentRegistry>,
        channel: Arc<CallSignalingChannel>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            registry,
            channel,
            dispatcher,
        }
    }

    /// 处理创建预约命令
    #[instrument(skip(self, command), fields(student_id = %command.draft.student_id))]
    pub async fn handle_create_appointment(
        &self,
        command: CreateAppointmentCommand,
    ) -> Result<Appointment> {
        self.registry.create(command.draft).await
    }

    /// 处理设置预约状态命令
    #[instrument(skip(self), fields(appointment_id = %command.appointment_id))]
    pub async fn handle_set_appointment_status(
        &self,
        command: SetAppointmentStatusCommand,
    ) -> Result<Appointment> {
        self.registry
            .set_status(command.appointment_id, command.status)
            .await
    }

    /// 处理发起通话命令
    #[instrument(skip(self), fields(appointment_id = %command.appointment_id, caller = %command.caller_id))]
    pub async fn handle_initiate_call(&self, command: InitiateCallCommand) -> Result<CallSession> {
        self.channel
            .initiate(
                command.appointment_id,
                command.caller_role,
                command.caller_id,
                command.callee_id,
            )
            .await
    }

    /// 处理通话动作命令
    #[instrument(skip(self), fields(call_id = %command.call_id))]
    pub async fn handle_call_action(&self, command: CallActionCommand) -> Result<CallSession> {
        match command.action {
            CallAction::Accept => self.channel.accept(command.call_id).await,
            CallAction::Reject => self.channel.reject(command.call_id).await,
            CallAction::End => self.channel.end(command.call_id).await,
        }
    }

    /// 处理聊天消息命令，返回新生成的通知数量
    #[instrument(skip(self, command), fields(recipient = %command.recipient_id))]
    pub async fn handle_post_chat_message(&self, command: PostChatMessageCommand) -> Result<usize> {
        let message_id = command
            .message_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let preview: String = command.body.chars().take(CHAT_PREVIEW_CHARS).collect();

        self.dispatcher
            .emit(&DomainEvent::ChatMessagePosted {
                message_id,
                sender_name: command.sender_name,
                recipient_id: command.recipient_id,
                recipient_role: command.recipient_role,
                preview,
                occurred_at: Utc::now(),
            })
            .await
    }

    /// 处理标记已读命令，返回被标记的数量
    #[instrument(skip(self), fields(recipient = %command.recipient.user_id))]
    pub async fn handle_mark_notifications_read(
        &self,
        command: MarkNotificationsReadCommand,
    ) -> Result<usize> {
        match command.notification_id {
            Some(id) => Ok(usize::from(
                self.dispatcher.mark_read(&command.recipient, id).await?,
            )),
            None => self.dispatcher.mark_all_read(&command.recipient).await,
        }
    }
}
