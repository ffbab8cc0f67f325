//! 在线状态跟踪
//!
//! 在线状态只是定时刷新的快照，不来自心跳，仅供参考。
//! 任何正确性判断（例如消息投递）都不能以在线状态为前提。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use portal_core::Result;

use crate::domain::model::PresenceRecord;
use crate::domain::repository::{PresenceProbe, UserDirectory};
use crate::domain::value_object::UserId;

pub struct PresenceTracker {
    directory: Arc<dyn UserDirectory>,
    probe: Arc<dyn PresenceProbe>,
    view: RwLock<HashMap<UserId, bool>>,
}

impl PresenceTracker {
    pub fn new(directory: Arc<dyn UserDirectory>, probe: Arc<dyn PresenceProbe>) -> Self {
        Self {
            directory,
            probe,
            view: RwLock::new(HashMap::new()),
        }
    }

    /// 为每个已知用户重算在线标记，并整体替换视图
    pub async fn refresh(&self) -> Result<usize> {
        let users = self.directory.known_users().await?;

        let mut next = HashMap::with_capacity(users.len());
        for user in users {
            let online = self.probe.is_online(&user).await;
            next.insert(user, online);
        }

        let online = next.values().filter(|v| **v).count();
        let total = next.len();
        *self.view.write().await = next;

        debug!(total, online, "presence refreshed");
        Ok(total)
    }

    /// 当前快照，按用户 id 排序
    pub async fn snapshot(&self) -> Vec<PresenceRecord> {
        let view = self.view.read().await;
        let mut records: Vec<PresenceRecord> = view
            .iter()
            .map(|(user_id, is_online)| PresenceRecord {
                user_id: user_id.clone(),
                is_online: *is_online,
            })
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        records
    }

    /// 未出现在快照中的用户视为离线
    pub async fn is_online(&self, user: &UserId) -> bool {
        self.view.read().await.get(user).copied().unwrap_or(false)
    }

    /// 启动定时刷新任务
    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        info!(interval_secs = every.as_secs(), "presence tracker started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "presence refresh failed, keeping previous snapshot");
                }
            }
        })
    }
}
