//! 仓储与外部协作方接口
//!
//! 共享存储是各独立上下文之间唯一的信道：每次变更都读取整个集合、
//! 在内存中修改、再以 CAS 整体写回。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use portal_core::Result;

use crate::domain::event::DomainEvent;
use crate::domain::value_object::UserId;

pub mod collection;

pub use collection::{Collection, Mutation};

/// 预约集合
pub const APPOINTMENTS_KEY: &str = "appointments";
/// 通话会话集合
pub const CALL_HISTORY_KEY: &str = "callHistory";

/// 存储键的修订号，每次写入递增，0 表示键不存在
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// 带修订号的存储值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: Revision,
}

/// CAS 写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Committed(Revision),
    Conflict { current: Revision },
}

/// 存储键变更通知（尽力而为，不保证送达）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub revision: Revision,
}

/// 共享键值存储接口
///
/// 存储本身不理解领域语义，所有不变性约束由拥有者组件在读写时维护
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// 读取原始载荷与修订号，键不存在时返回 None
    async fn read(&self, key: &str) -> Result<Option<Versioned<String>>>;

    /// 无条件整体替换（后写者胜）
    async fn write(&self, key: &str, payload: String) -> Result<Revision>;

    /// 仅当当前修订号等于 `expected` 时写入
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Revision,
        payload: String,
    ) -> Result<CasOutcome>;

    /// 订阅键的变更通知
    async fn subscribe(&self, key: &str) -> Result<mpsc::Receiver<StoreChange>>;
}

/// 领域事件发布接口
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

/// 学生权益检查（外部协作方）
#[async_trait]
pub trait EntitlementChecker: Send + Sync {
    /// 学生是否享有 pro 权益
    async fn is_pro(&self, student: &UserId) -> bool;
}

/// 已知用户目录（外部协作方）
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn known_users(&self) -> Result<Vec<UserId>>;
}

/// 在线状态探测（外部协作方）
///
/// 结果仅供参考，任何正确性判断都不能依赖它
#[async_trait]
pub trait PresenceProbe: Send + Sync {
    async fn is_online(&self, user: &UserId) -> bool;
}

/// 媒体 I/O 提供方（摄像头、麦克风、屏幕共享），核心只负责启动与停止
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn start_local_stream(&self) -> Result<()>;
    async fn start_remote_stream(&self, remote_label: &str) -> Result<()>;
    async fn stop_all(&self) -> Result<()>;
}
