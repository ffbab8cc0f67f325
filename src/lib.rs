//! Portal Core 公共库
//!
//! 提供统一的配置加载、错误类型和日志初始化功能

pub mod config;
pub mod error;
pub mod tracing;
pub mod utils;

pub use config::{
    ConfigManager, LoggingConfig, PortalAppConfig, ServiceConfig, SignalingServiceConfig,
    StoreBackend, StoreConfig, app_config, load_config, load_config_from_path,
};
pub use error::*;
pub use utils::*;
