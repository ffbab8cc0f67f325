//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建存储、领域服务和处理器

use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use redis::Client;
use tokio::task::JoinHandle;
use tracing::info;

use portal_core::{PortalAppConfig, StoreBackend};

use crate::application::handlers::{PortalCommandHandler, PortalQueryHandler};
use crate::application::services::{CallSessionController, IncomingCallWatcher};
use crate::config::SignalingConfig;
use crate::domain::repository::{
    EntitlementChecker, MediaProvider, PresenceProbe, SharedStore, UserDirectory,
};
use crate::domain::service::{
    AppointmentRegistry, CallSignalingChannel, NotificationDispatcher, PresenceTracker,
};
use crate::domain::value_object::{Role, UserId};
use crate::infrastructure::adapters::{
    AllowListEntitlement, LoggingMediaProvider, ManualPresenceProbe, StaticUserDirectory,
};
use crate::infrastructure::store::{InMemorySharedStore, RedisSharedStore};

/// 外部协作方，宿主可以替换任意一项
pub struct Collaborators {
    pub entitlement: Arc<dyn EntitlementChecker>,
    pub directory: Arc<dyn UserDirectory>,
    pub probe: Arc<dyn PresenceProbe>,
    pub media: Arc<dyn MediaProvider>,
}

impl Collaborators {
    /// 由配置中的 pro 学生与已知用户列表构建默认协作方
    pub fn from_config(config: &SignalingConfig) -> Result<Self> {
        let pro_students = parse_users(&config.pro_students)
            .with_context(|| "Invalid signaling.pro_students entry")?;
        let known_users = parse_users(&config.known_users)
            .with_context(|| "Invalid signaling.known_users entry")?;

        Ok(Self {
            entitlement: Arc::new(AllowListEntitlement::new(pro_students)),
            directory: Arc::new(StaticUserDirectory::new(known_users)),
            probe: Arc::new(ManualPresenceProbe::new()),
            media: Arc::new(LoggingMediaProvider),
        })
    }
}

fn parse_users(raw: &[String]) -> portal_core::Result<Vec<UserId>> {
    raw.iter().map(|id| UserId::new(id.as_str())).collect()
}

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub config: SignalingConfig,
    pub store: Arc<dyn SharedStore>,
    pub registry: Arc<AppointmentRegistry>,
    pub channel: Arc<CallSignalingChannel>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub presence: Arc<PresenceTracker>,
    pub command_handler: Arc<PortalCommandHandler>,
    pub query_handler: Arc<PortalQueryHandler>,
    media: Arc<dyn MediaProvider>,
}

impl ApplicationContext {
    /// 为本地参与者创建通话控制器
    pub fn controller_for(&self, user: UserId, role: Role) -> CallSessionController {
        CallSessionController::new(user, role, self.channel.clone(), self.media.clone())
    }

    /// 启动本地参与者的来电监听
    pub async fn watch_incoming(&self, user: UserId, role: Role) -> IncomingCallWatcher {
        IncomingCallWatcher::spawn(
            self.channel.clone(),
            user,
            role,
            self.config.incoming_poll_interval,
        )
        .await
    }

    /// 启动在线状态定时刷新
    pub fn spawn_presence_refresh(&self) -> JoinHandle<()> {
        self.presence
            .clone()
            .spawn(self.config.presence_refresh_interval)
    }
}

/// 构建应用上下文
///
/// 根据 `store.backend` 选择共享存储，协作方使用默认实现
pub async fn initialize(app_config: &PortalAppConfig) -> Result<ApplicationContext> {
    // 1. 加载信令服务配置，环境变量覆盖之后再校验引用关系
    let config = SignalingConfig::from_app_config(app_config).with_env_overrides();
    let mut resolved = app_config.clone();
    resolved.store.backend = config.backend;
    resolved.store.redis_url = config.redis_url.clone();
    resolved
        .validate_references()
        .with_context(|| "Invalid portal configuration")?;

    // 2. 创建共享存储
    let store: Arc<dyn SharedStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemorySharedStore::new()),
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .with_context(|| "store.redis_url is required for the redis backend")?;
            let client =
                Arc::new(Client::open(url).with_context(|| "Failed to create Redis client")?);
            Arc::new(RedisSharedStore::new(client, config.namespace.clone()))
        }
    };

    // 3. 默认协作方
    let collaborators = Collaborators::from_config(&config)?;

    Ok(initialize_with(config, store, collaborators))
}

/// 使用给定的存储与协作方构建应用上下文
///
/// 多个上下文共享同一个存储即可模拟多个独立的参与方
pub fn initialize_with(
    config: SignalingConfig,
    store: Arc<dyn SharedStore>,
    collaborators: Collaborators,
) -> ApplicationContext {
    // 1. 通知分发器（同时作为领域事件发布者）
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        config.notification_cap,
        config.cas_max_retries,
    ));

    // 2. 领域服务
    let registry = Arc::new(AppointmentRegistry::new(
        store.clone(),
        config.cas_max_retries,
        collaborators.entitlement,
        dispatcher.clone(),
    ));
    let channel = Arc::new(CallSignalingChannel::new(
        store.clone(),
        config.cas_max_retries,
        config.ring_timeout,
        dispatcher.clone(),
    ));
    let presence = Arc::new(PresenceTracker::new(
        collaborators.directory,
        collaborators.probe,
    ));

    // 3. 处理器
    let command_handler = Arc::new(PortalCommandHandler::new(
        registry.clone(),
        channel.clone(),
        dispatcher.clone(),
    ));
    let query_handler = Arc::new(PortalQueryHandler::new(
        registry.clone(),
        channel.clone(),
        dispatcher.clone(),
        presence.clone(),
    ));

    info!(
        backend = ?config.backend,
        notification_cap = config.notification_cap,
        ring_timeout_secs = config.ring_timeout.map(|t| t.as_secs()),
        "signaling context initialized"
    );

    ApplicationContext {
        config,
        store,
        registry,
        channel,
        dispatcher,
        presence,
        command_handler,
        query_handler,
        media: collaborators.media,
    }
}
