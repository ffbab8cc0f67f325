//! 在线状态协作方的进程内实现

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use portal_core::Result;

use crate::domain::repository::{PresenceProbe, UserDirectory};
use crate::domain::value_object::UserId;

/// 固定用户目录（可动态追加）
#[derive(Default)]
pub struct StaticUserDirectory {
    users: DashSet<UserId>,
}

impl StaticUserDirectory {
    pub fn new<I>(users: I) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        let set = DashSet::new();
        for user in users {
            set.insert(user);
        }
        Self { users: set }
    }

    pub fn register(&self, user: UserId) {
        self.users.insert(user);
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn known_users(&self) -> Result<Vec<UserId>> {
        let mut users: Vec<UserId> = self.users.iter().map(|u| u.key().clone()).collect();
        users.sort();
        Ok(users)
    }
}

/// 由宿主显式设置的在线标记，未设置的用户视为离线
#[derive(Default)]
pub struct ManualPresenceProbe {
    flags: DashMap<UserId, bool>,
}

impl ManualPresenceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, user: UserId, online: bool) {
        self.flags.insert(user, online);
    }
}

#[async_trait]
impl PresenceProbe for ManualPresenceProbe {
    async fn is_online(&self, user: &UserId) -> bool {
        self.flags.get(user).map(|flag| *flag).unwrap_or(false)
    }
}
