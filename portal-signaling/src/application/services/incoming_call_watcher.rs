//! 来电监听
//!
//! 每个上下文一个后台任务：存储变更通知触发立即检查，固定间隔轮询兜底
//! （变更通知尽力而为，可能丢失）。当前来电通过 `watch` 通道发布。
//! 每次检查前顺带处理振铃超时。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::model::CallSession;
use crate::domain::repository::StoreChange;
use crate::domain::service::CallSignalingChannel;
use crate::domain::value_object::{Role, UserId};

pub struct IncomingCallWatcher {
    receiver: watch::Receiver<Option<CallSession>>,
    task: JoinHandle<()>,
}

impl IncomingCallWatcher {
    /// 启动监听任务；句柄被 drop 时任务随之停止
    pub async fn spawn(
        channel: Arc<CallSignalingChannel>,
        user: UserId,
        role: Role,
        poll_interval: Duration,
    ) -> Self {
        let feed = match channel.subscribe().await {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!(user = %user, error = %e, "change feed unavailable, relying on polling");
                None
            }
        };

        let (sender, receiver) = watch::channel(None);
        info!(
            user = %user,
            role = %role,
            poll_ms = poll_interval.as_millis() as u64,
            "incoming call watcher started"
        );
        let task = tokio::spawn(run(channel, user, role, poll_interval, feed, sender));

        Self { receiver, task }
    }

    /// 当前来电
    pub fn current(&self) -> Option<CallSession> {
        self.receiver.borrow().clone()
    }

    /// 订阅来电变化
    pub fn subscribe(&self) -> watch::Receiver<Option<CallSession>> {
        self.receiver.clone()
    }
}

impl Drop for IncomingCallWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    channel: Arc<CallSignalingChannel>,
    user: UserId,
    role: Role,
    poll_interval: Duration,
    mut feed: Option<mpsc::Receiver<StoreChange>>,
    sender: watch::Sender<Option<CallSession>>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let feed_closed = tokio::select! {
            _ = ticker.tick() => false,
            change = next_change(&mut feed) => match change {
                Some(change) => {
                    debug!(key = %change.key, revision = %change.revision, "call collection changed");
                    false
                }
                None => true,
            },
        };
        if feed_closed {
            warn!(user = %user, "change feed closed, falling back to polling only");
            feed = None;
        }

        if let Err(e) = channel.expire_ringing(Utc::now()).await {
            warn!(error = %e, "failed to expire ringing calls");
        }

        let incoming = channel.poll_incoming(&user, role).await;
        sender.send_if_modified(|current| {
            if *current == incoming {
                return false;
            }
            match &incoming {
                Some(call) => info!(user = %user, call_id = %call.id(), "incoming call"),
                None => debug!(user = %user, "incoming call cleared"),
            }
            *current = incoming;
            true
        });
    }
}

async fn next_change(feed: &mut Option<mpsc::Receiver<StoreChange>>) -> Option<StoreChange> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
