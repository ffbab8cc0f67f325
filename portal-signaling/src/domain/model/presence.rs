use serde::{Deserialize, Serialize};

use crate::domain::value_object::UserId;

/// 在线状态快照记录（不持久化，每次刷新整体重算）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub is_online: bool,
}
