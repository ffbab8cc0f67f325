//! 通话会话控制器
//!
//! 为本地参与者驱动一次通话的可见生命周期：
//! `idle → ringing → connected → ended`，或 `ringing → rejected → idle`；
//! 主叫在等待应答期间处于 `outgoing`。
//!
//! 控制器只通过信令通道访问共享存储，自身只持有不需要持久化的瞬时状态
//! （麦克风、摄像头、屏幕共享开关）。进入 connected 时启动媒体流，
//! 离开 connected 或被拒接时停止全部媒体流。

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use portal_core::{PortalError, Result};

use crate::domain::model::{CallSession, CallStatus};
use crate::domain::repository::MediaProvider;
use crate::domain::service::CallSignalingChannel;
use crate::domain::value_object::{AppointmentId, CallId, Role, UserId};

/// 本地可见的通话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPhase {
    Idle,
    /// 主叫等待应答
    Outgoing,
    /// 被叫振铃中
    Ringing,
    Connected,
    Ended,
    Rejected,
}

impl CallPhase {
    pub fn is_finished(&self) -> bool {
        matches!(self, CallPhase::Ended | CallPhase::Rejected)
    }

    fn is_busy(&self) -> bool {
        matches!(
            self,
            CallPhase::Outgoing | CallPhase::Ringing | CallPhase::Connected
        )
    }
}

/// 媒体开关（不持久化）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaToggles {
    pub mic: bool,
    pub camera: bool,
    pub screen_share: bool,
}

impl Default for MediaToggles {
    fn default() -> Self {
        Self {
            mic: true,
            camera: true,
            screen_share: false,
        }
    }
}

struct ControllerState {
    phase: CallPhase,
    session: Option<CallSession>,
    toggles: MediaToggles,
    media_live: bool,
}

pub struct CallSessionController {
    local_user: UserId,
    local_role: Role,
    channel: Arc<CallSignalingChannel>,
    media: Arc<dyn MediaProvider>,
    state: Mutex<ControllerState>,
}

impl CallSessionController {
    pub fn new(
        local_user: UserId,
        local_role: Role,
        channel: Arc<CallSignalingChannel>,
        media: Arc<dyn MediaProvider>,
    ) -> Self {
        Self {
            local_user,
            local_role,
            channel,
            media,
            state: Mutex::new(ControllerState {
                phase: CallPhase::Idle,
                session: None,
                toggles: MediaToggles::default(),
                media_live: false,
            }),
        }
    }

    pub async fn phase(&self) -> CallPhase {
        self.state.lock().await.phase
    }

    pub async fn session(&self) -> Option<CallSession> {
        self.state.lock().await.session.clone()
    }

    pub async fn toggles(&self) -> MediaToggles {
        self.state.lock().await.toggles
    }

    /// 发起通话，进入 outgoing
    pub async fn place_call(
        &self,
        appointment_id: AppointmentId,
        callee: UserId,
    ) -> Result<CallSession> {
        let mut state = self.state.lock().await;
        if state.phase.is_busy() {
            return Err(PortalError::precondition(format!(
                "a call is already {:?}",
                state.phase
            )));
        }

        let session = self
            .channel
            .initiate(appointment_id, self.local_role, self.local_user.clone(), callee)
            .await?;
        state.session = None;
        state.phase = CallPhase::Idle;
        self.reconcile(&mut state, session.clone()).await;
        Ok(session)
    }

    /// 展示来电；已有进行中的通话时忽略
    pub async fn ring(&self, incoming: CallSession) -> CallPhase {
        let mut state = self.state.lock().await;
        if state.phase.is_busy() {
            if state.session.as_ref().map(|s| s.id()) != Some(incoming.id()) {
                debug!(call_id = %incoming.id(), phase = ?state.phase, "busy, incoming call not shown");
            }
            return state.phase;
        }
        if !incoming.is_incoming_for(&self.local_user, self.local_role) {
            return state.phase;
        }

        state.session = None;
        state.phase = CallPhase::Idle;
        self.reconcile(&mut state, incoming).await;
        state.phase
    }

    /// 接听当前来电
    pub async fn answer(&self) -> Result<CallPhase> {
        let mut state = self.state.lock().await;
        let id = Self::current_id(&state, &[CallPhase::Ringing], "answer")?;
        let session = self.channel.accept(id).await?;
        self.reconcile(&mut state, session).await;
        Ok(state.phase)
    }

    /// 拒接当前来电
    pub async fn decline(&self) -> Result<CallPhase> {
        let mut state = self.state.lock().await;
        let id = Self::current_id(&state, &[CallPhase::Ringing], "decline")?;
        let session = self.channel.reject(id).await?;
        self.reconcile(&mut state, session).await;
        Ok(state.phase)
    }

    /// 挂断（接通后）或取消（等待应答时）
    pub async fn hang_up(&self) -> Result<CallPhase> {
        let mut state = self.state.lock().await;
        let id = Self::current_id(
            &state,
            &[CallPhase::Outgoing, CallPhase::Connected],
            "hang up",
        )?;
        let session = self.channel.end(id).await?;
        self.reconcile(&mut state, session).await;
        Ok(state.phase)
    }

    /// 重新读取会话，与共享状态对齐（对端接听、挂断、超时等）
    pub async fn observe(&self) -> Result<CallPhase> {
        let mut state = self.state.lock().await;
        let Some(id) = state.session.as_ref().map(|s| s.id()) else {
            return Ok(state.phase);
        };

        match self.channel.get(id).await? {
            Some(session) => self.reconcile(&mut state, session).await,
            None => {
                warn!(call_id = %id, "call session disappeared from store, treating as ended");
                self.enter(&mut state, CallPhase::Ended, None).await;
            }
        }
        Ok(state.phase)
    }

    /// 关闭已结束的通话视图，回到 idle
    pub async fn dismiss(&self) -> CallPhase {
        let mut state = self.state.lock().await;
        if state.phase.is_finished() {
            state.phase = CallPhase::Idle;
            state.session = None;
            state.toggles = MediaToggles::default();
        }
        state.phase
    }

    pub async fn toggle_mic(&self) -> bool {
        let mut state = self.state.lock().await;
        state.toggles.mic = !state.toggles.mic;
        state.toggles.mic
    }

    pub async fn toggle_camera(&self) -> bool {
        let mut state = self.state.lock().await;
        state.toggles.camera = !state.toggles.camera;
        state.toggles.camera
    }

    /// 屏幕共享只在接通期间可以打开
    pub async fn toggle_screen_share(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.phase != CallPhase::Connected {
            state.toggles.screen_share = false;
            return false;
        }
        state.toggles.screen_share = !state.toggles.screen_share;
        state.toggles.screen_share
    }

    fn current_id(
        state: &ControllerState,
        allowed: &[CallPhase],
        action: &str,
    ) -> Result<CallId> {
        match (&state.session, allowed.contains(&state.phase)) {
            (Some(session), true) => Ok(session.id()),
            _ => Err(PortalError::precondition(format!(
                "cannot {action} while {:?}",
                state.phase
            ))),
        }
    }

    /// 共享状态到本地阶段的映射
    fn phase_for(&self, session: &CallSession) -> CallPhase {
        match session.status() {
            CallStatus::Ended => CallPhase::Ended,
            CallStatus::Rejected => CallPhase::Rejected,
            CallStatus::Active if session.accepted() => CallPhase::Connected,
            CallStatus::Active if session.initiated_by() == self.local_role => CallPhase::Outgoing,
            CallStatus::Active => CallPhase::Ringing,
        }
    }

    async fn reconcile(&self, state: &mut ControllerState, session: CallSession) {
        let target = self.phase_for(&session);
        // 本地已结束的通话不会因迟到的写入而复活
        if state.phase.is_finished() && !target.is_finished() {
            debug!(call_id = %session.id(), phase = ?state.phase, observed = ?target, "ignoring stale update for finished call");
            return;
        }
        self.enter(state, target, Some(session)).await;
    }

    async fn enter(&self, state: &mut ControllerState, next: CallPhase, session: Option<CallSession>) {
        let previous = state.phase;
        if let Some(session) = session {
            state.session = Some(session);
        }
        if previous == next {
            return;
        }
        state.phase = next;

        info!(
            user = %self.local_user,
            call_id = ?state.session.as_ref().map(|s| s.id()),
            from = ?previous,
            to = ?next,
            "call phase changed"
        );

        if next == CallPhase::Connected {
            self.start_media(state).await;
        } else if state.media_live || next == CallPhase::Rejected {
            self.stop_media(state).await;
        }
    }

    async fn start_media(&self, state: &mut ControllerState) {
        let remote = state
            .session
            .as_ref()
            .and_then(|s| s.counterpart_of(&self.local_user))
            .map(|u| u.to_string())
            .unwrap_or_else(|| "remote".to_string());

        if let Err(e) = self.media.start_local_stream().await {
            warn!(error = %e, "failed to start local stream");
        }
        if let Err(e) = self.media.start_remote_stream(&remote).await {
            warn!(remote = %remote, error = %e, "failed to start remote stream");
        }
        state.media_live = true;
    }

    async fn stop_media(&self, state: &mut ControllerState) {
        if let Err(e) = self.media.stop_all().await {
            warn!(error = %e, "failed to stop media streams");
        }
        state.media_live = false;
        state.toggles.screen_share = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::domain::model::{AppointmentDraft, AppointmentStatus};
    use crate::domain::repository::SharedStore;
    use crate::domain::service::{AppointmentRegistry, NotificationDispatcher};
    use crate::infrastructure::adapters::AllowListEntitlement;
    use crate::infrastructure::store::InMemorySharedStore;

    #[derive(Default)]
    struct RecordingMedia {
        calls: StdMutex<Vec<String>>,
    }

    impl RecordingMedia {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaProvider for RecordingMedia {
        async fn start_local_stream(&self) -> Result<()> {
            self.calls.lock().unwrap().push("local".to_string());
            Ok(())
        }

        async fn start_remote_stream(&self, remote_label: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("remote:{remote_label}"));
            Ok(())
        }

        async fn stop_all(&self) -> Result<()> {
            self.calls.lock().unwrap().push("stop".to_string());
            Ok(())
        }
    }

    struct Fixture {
        channel: Arc<CallSignalingChannel>,
        appointment: AppointmentId,
        scad: CallSessionController,
        scad_media: Arc<RecordingMedia>,
        student: CallSessionController,
        student_media: Arc<RecordingMedia>,
    }

    fn student_id() -> UserId {
        UserId::new("s-1").unwrap()
    }

    fn scad_id() -> UserId {
        UserId::new("scad-1").unwrap()
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn SharedStore> = Arc::new(InMemorySharedStore::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), 50, 8));
        let registry = AppointmentRegistry::new(
            store.clone(),
            8,
            Arc::new(AllowListEntitlement::default()),
            dispatcher.clone(),
        );
        let appt = registry
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
        registry
            .set_status(appt.id, AppointmentStatus::Approved)
            .await
            .unwrap();

        let channel = Arc::new(CallSignalingChannel::new(
            store,
            8,
            Some(Duration::from_secs(45)),
            dispatcher,
        ));
        let scad_media = Arc::new(RecordingMedia::default());
        let student_media = Arc::new(RecordingMedia::default());
        Fixture {
            scad: CallSessionController::new(
                scad_id(),
                Role::Scad,
                channel.clone(),
                scad_media.clone(),
            ),
            student: CallSessionController::new(
                student_id(),
                Role::Student,
                channel.clone(),
                student_media.clone(),
            ),
            channel,
            appointment: appt.id,
            scad_media,
            student_media,
        }
    }

    #[tokio::test]
    async fn test_connect_and_hang_up() {
        let f = fixture().await;
        f.scad.place_call(f.appointment, student_id()).await.unwrap();
        assert_eq!(f.scad.phase().await, CallPhase::Outgoing);

        let incoming = f
            .channel
            .poll_incoming(&student_id(), Role::Student)
            .await
            .unwrap();
        assert_eq!(f.student.ring(incoming).await, CallPhase::Ringing);
        assert_eq!(f.student.answer().await.unwrap(), CallPhase::Connected);
        assert_eq!(f.student_media.calls(), vec!["local", "remote:scad-1"]);

        assert_eq!(f.scad.observe().await.unwrap(), CallPhase::Connected);
        assert_eq!(f.scad_media.calls(), vec!["local", "remote:s-1"]);

        assert_eq!(f.scad.hang_up().await.unwrap(), CallPhase::Ended);
        assert_eq!(f.student.observe().await.unwrap(), CallPhase::Ended);
        assert_eq!(f.student_media.calls().last().map(String::as_str), Some("stop"));
        assert_eq!(f.student.dismiss().await, CallPhase::Idle);
    }

    #[tokio::test]
    async fn test_decline_stops_media_and_caller_sees_rejection() {
        let f = fixture().await;
        f.scad.place_call(f.appointment, student_id()).await.unwrap();
        let incoming = f
            .channel
            .poll_incoming(&student_id(), Role::Student)
            .await
            .unwrap();
        f.student.ring(incoming).await;

        assert_eq!(f.student.decline().await.unwrap(), CallPhase::Rejected);
        assert_eq!(f.student_media.calls(), vec!["stop"]);
        assert_eq!(f.scad.observe().await.unwrap(), CallPhase::Rejected);
        assert_eq!(f.scad.dismiss().await, CallPhase::Idle);
    }

    #[tokio::test]
    async fn test_stray_accept_after_end_is_noop() {
        let f = fixture().await;
        let session = f.scad.place_call(f.appointment, student_id()).await.unwrap();
        f.student.ring(session.clone()).await;

        // 主叫先取消，被叫随后才尝试接听
        f.scad.hang_up().await.unwrap();
        assert_eq!(f.student.answer().await.unwrap(), CallPhase::Ended);
        assert!(f.student_media.calls().is_empty());
        assert!(!f.channel.get(session.id()).await.unwrap().unwrap().accepted());
    }

    #[tokio::test]
    async fn test_actions_require_matching_phase() {
        let f = fixture().await;
        assert!(matches!(
            f.student.answer().await,
            Err(PortalError::Precondition(_))
        ));
        f.scad.place_call(f.appointment, student_id()).await.unwrap();
        assert!(matches!(
            f.scad.place_call(f.appointment, student_id()).await,
            Err(PortalError::Precondition(_))
        ));
        // 主叫不能接听自己的通话
        assert!(matches!(
            f.scad.answer().await,
            Err(PortalError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_screen_share_only_while_connected() {
        let f = fixture().await;
        assert!(!f.student.toggle_screen_share().await);
        assert!(!f.student.toggle_mic().await);
        assert!(f.student.toggle_mic().await);

        let session = f.scad.place_call(f.appointment, student_id()).await.unwrap();
        f.student.ring(session).await;
        f.student.answer().await.unwrap();
        assert!(f.student.toggle_screen_share().await);

        f.student.hang_up().await.unwrap();
        assert!(!f.student.toggles().await.screen_share);
    }
}
