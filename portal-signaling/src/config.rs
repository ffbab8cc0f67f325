use std::time::Duration;

use portal_core::{ConfigManager, PortalAppConfig, StoreBackend};

use crate::domain::model::DEFAULT_NOTIFICATION_CAP;

const DEFAULT_INCOMING_POLL_MS: u64 = 2_500;
const DEFAULT_PRESENCE_REFRESH_SECS: u64 = 30;
const DEFAULT_RING_TIMEOUT_SECS: u64 = 45;
const DEFAULT_CAS_MAX_RETRIES: u32 = 8;

/// 信令服务运行参数（已填充默认值）
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
    pub namespace: Option<String>,
    pub incoming_poll_interval: Duration,
    pub presence_refresh_interval: Duration,
    /// 振铃超时，配置为 0 时关闭
    pub ring_timeout: Option<Duration>,
    pub notification_cap: usize,
    pub cas_max_retries: u32,
    pub pro_students: Vec<String>,
    pub known_users: Vec<String>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self::from_app_config(&PortalAppConfig::default())
    }
}

impl SignalingConfig {
    pub fn from_app_config(app: &PortalAppConfig) -> Self {
        let signaling = &app.signaling;
        Self {
            backend: app.store.backend,
            redis_url: app.store.redis_url.clone(),
            namespace: app.store.namespace.clone(),
            incoming_poll_interval: Duration::from_millis(
                signaling
                    .incoming_poll_ms
                    .unwrap_or(DEFAULT_INCOMING_POLL_MS)
                    .max(1),
            ),
            presence_refresh_interval: Duration::from_secs(
                signaling
                    .presence_refresh_secs
                    .unwrap_or(DEFAULT_PRESENCE_REFRESH_SECS)
                    .max(1),
            ),
            ring_timeout: ring_timeout(
                signaling
                    .ring_timeout_secs
                    .unwrap_or(DEFAULT_RING_TIMEOUT_SECS),
            ),
            notification_cap: signaling
                .notification_cap
                .unwrap_or(DEFAULT_NOTIFICATION_CAP)
                .max(1),
            cas_max_retries: signaling
                .cas_max_retries
                .unwrap_or(DEFAULT_CAS_MAX_RETRIES)
                .max(1),
            pro_students: signaling.pro_students.clone(),
            known_users: signaling.known_users.clone(),
        }
    }

    /// 应用 `PORTAL_*` 环境变量覆盖
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = ConfigManager::env_string("PORTAL_REDIS_URL") {
            self.redis_url = Some(url);
            self.backend = StoreBackend::Redis;
        }
        if let Some(ns) = ConfigManager::env_string("PORTAL_STORE_NAMESPACE") {
            self.namespace = Some(ns);
        }
        if let Some(ms) = ConfigManager::env_u64("PORTAL_INCOMING_POLL_MS") {
            self.incoming_poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = ConfigManager::env_u64("PORTAL_PRESENCE_REFRESH_SECS") {
            self.presence_refresh_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = ConfigManager::env_u64("PORTAL_RING_TIMEOUT_SECS") {
            self.ring_timeout = ring_timeout(secs);
        }
        self
    }
}

fn ring_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
