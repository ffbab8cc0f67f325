//! Portal Core 错误模块
//!
//! - 统一对外暴露预约/通话信令子系统的错误类型
//! - 为基础设施层提供便捷的错误转换工具

use thiserror::Error;

/// 子系统统一结果类型
pub type Result<T, E = PortalError> = std::result::Result<T, E>;

/// 预约与通话信令错误类型
#[derive(Debug, Error)]
pub enum PortalError {
    /// 必填字段缺失或格式错误，直接返回给调用方，不重试
    #[error("Validation error: {0}")]
    Validation(String),

    /// 前置条件不满足（如对未批准的预约发起通话）
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// 存储数据损坏；读取方在本地恢复为空集合，不向上传播
    #[error("Storage parse error on key `{key}`: {reason}")]
    StorageParse { key: String, reason: String },

    /// 记录不存在
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// 乐观并发冲突，重试耗尽
    #[error("Concurrent update conflict on key `{key}` after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    /// 底层存储错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PortalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PortalError::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        PortalError::Precondition(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PortalError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        PortalError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Storage(format!("serialization failed: {err}"))
    }
}

impl From<anyhow::Error> for PortalError {
    fn from(err: anyhow::Error) -> Self {
        PortalError::Storage(err.to_string())
    }
}

/// 便捷宏：字段缺失时直接返回校验错误
#[macro_export]
macro_rules! ensure_present {
    ($value:expr, $field:literal) => {
        if $value.trim().is_empty() {
            return Err($crate::error::PortalError::Validation(format!(
                "missing required field: {}",
                $field
            )));
        }
    };
}
