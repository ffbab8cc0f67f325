//! Portal Core 配置模块
//!
//! 该模块提供了完整的应用程序配置管理功能，包括：
//! - 配置文件加载和解析（单文件或目录合并）
//! - 环境特定配置覆盖
//! - 共享存储、信令服务、日志等配置定义

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use toml::Value;
use tracing::warn;

mod manager;
pub use manager::ConfigManager;

/// 全局应用配置实例，使用 OnceLock 确保只初始化一次
static APP_CONFIG: OnceLock<PortalAppConfig> = OnceLock::new();

/// 服务标识
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// 服务名称
    #[serde(default = "default_service_name")]
    pub name: String,
    /// 服务版本
    #[serde(default = "default_service_version")]
    pub version: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_service_version(),
        }
    }
}

fn default_service_name() -> String {
    "portal-signaling".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub with_target: bool,
    #[serde(default)]
    pub with_thread_ids: bool,
    #[serde(default)]
    pub with_file: bool,
    #[serde(default)]
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 共享存储后端类型
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储（测试与单进程部署）
    #[default]
    Memory,
    /// Redis 存储（多进程共享）
    Redis,
}

/// 共享存储配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// 存储后端
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis 服务器地址（backend = redis 时必填）
    #[serde(default)]
    pub redis_url: Option<String>,
    /// 键命名空间前缀
    #[serde(default)]
    pub namespace: Option<String>,
}

/// 信令服务配置（均为可选项，由服务层填充默认值）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SignalingServiceConfig {
    /// 来电轮询间隔（毫秒）
    #[serde(default)]
    pub incoming_poll_ms: Option<u64>,
    /// 在线状态刷新间隔（秒）
    #[serde(default)]
    pub presence_refresh_secs: Option<u64>,
    /// 振铃超时时间（秒），超时自动标记为未接
    #[serde(default)]
    pub ring_timeout_secs: Option<u64>,
    /// 每个接收者保留的通知上限
    #[serde(default)]
    pub notification_cap: Option<usize>,
    /// CAS 写入最大重试次数
    #[serde(default)]
    pub cas_max_retries: Option<u32>,
    /// 享有"pro"权益的学生 ID 列表
    #[serde(default)]
    pub pro_students: Vec<String>,
    /// 已知用户列表（用于在线状态刷新）
    #[serde(default)]
    pub known_users: Vec<String>,
}

/// 应用配置主结构体
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PortalAppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub signaling: SignalingServiceConfig,
}

impl PortalAppConfig {
    /// 校验配置引用关系
    pub fn validate_references(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Redis {
            let url = self
                .store
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow!("store.redis_url is required when store.backend = \"redis\""))?;
            if url.trim().is_empty() {
                return Err(anyhow!("store.redis_url must not be empty"));
            }
        }

        if let Some(0) = self.signaling.notification_cap {
            return Err(anyhow!("signaling.notification_cap must be greater than 0"));
        }

        Ok(())
    }

    fn ensure_defaults(&mut self) {
        if self.service.name.is_empty() {
            self.service.name = default_service_name();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
    }
}

/// 加载配置
///
/// 未指定路径时依次尝试 `config/` 目录与 `config.toml` 文件，全部失败则使用默认配置
pub fn load_config(path: Option<&str>) -> &'static PortalAppConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
    };

    APP_CONFIG.get_or_init(|| load_with_fallback(&candidates))
}

/// 获取应用配置（未加载时返回默认配置并写入全局实例）
pub fn app_config() -> &'static PortalAppConfig {
    APP_CONFIG.get_or_init(|| {
        warn!("configuration not initialised, using defaults");
        PortalAppConfig::default()
    })
}

/// 从指定路径加载配置（不写入全局实例）
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<PortalAppConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    let mut merged = if metadata.is_dir() {
        load_directory_value(path)?
    } else {
        load_toml_value(path)?
    };

    // 合并环境特定配置
    if let Some(env_value) = ConfigManager::load_environment_value(path)? {
        merge_value(&mut merged, env_value);
    }

    let mut cfg: PortalAppConfig = merged
        .try_into()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    cfg.ensure_defaults();
    Ok(cfg)
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf]) -> PortalAppConfig {
    for path in candidates {
        match load_config_from_path(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    PortalAppConfig::default()
}

/// 从目录加载配置：base.toml + shared/ + overrides/
fn load_directory_value(path: &Path) -> Result<Value> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;

    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("shared"))?;
    merge_directory(&mut merged, &path.join("overrides"))?;

    Ok(merged)
}

/// 合并目录中的配置（按文件名排序）
fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

/// 加载 TOML 值
pub(crate) fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    let value: Value = toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))?;
    Ok(value)
}

/// 合并值（overlay 覆盖 base，表递归合并）
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}
