//! 配置管理器 - 负责处理不同环境下的配置选择和覆盖
//!
//! 该模块提供了配置管理功能，包括：
//! - 根据环境变量确定当前环境
//! - 加载环境特定配置
//! - 读取 `PORTAL_*` 环境变量覆盖项

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use toml::Value;

use super::load_toml_value;

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称
    ///
    /// 从环境变量 PORTAL_ENV 获取当前环境名称，
    /// 如果未设置则默认为 "development"
    pub fn get_environment() -> String {
        env::var("PORTAL_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 环境配置文件路径
    ///
    /// 目录形式的配置读取 `{dir}/environments/{env}.toml`，
    /// 单文件形式读取同级目录下的 `environments/{env}.toml`
    pub fn environment_config_path(config_path: &Path, environment: &str) -> PathBuf {
        let root = if config_path.is_dir() {
            config_path.to_path_buf()
        } else {
            config_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
        root.join("environments").join(format!("{}.toml", environment))
    }

    /// 根据环境加载特定配置
    ///
    /// # 返回
    /// 环境配置文件存在时返回其 TOML 值，否则返回 None
    pub fn load_environment_value(config_path: &Path) -> Result<Option<Value>> {
        let env_config_path = Self::environment_config_path(config_path, &Self::get_environment());

        if !env_config_path.exists() {
            return Ok(None);
        }

        load_toml_value(&env_config_path).map(Some)
    }

    /// 读取 u64 类型的环境变量覆盖项，非法值视为未设置
    pub fn env_u64(name: &str) -> Option<u64> {
        env::var(name).ok().and_then(|value| value.parse::<u64>().ok())
    }

    /// 读取字符串类型的环境变量覆盖项，空串视为未设置
    pub fn env_string(name: &str) -> Option<String> {
        env::var(name).ok().filter(|value| !value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_path_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = ConfigManager::environment_config_path(dir.path(), "staging");
        assert_eq!(path, dir.path().join("environments").join("staging.toml"));
    }

    #[test]
    fn test_environment_path_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "").unwrap();
        let path = ConfigManager::environment_config_path(&file, "production");
        assert_eq!(path, dir.path().join("environments").join("production.toml"));
    }

    #[test]
    fn test_missing_environment_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigManager::load_environment_value(dir.path()).unwrap().is_none());
    }
}
