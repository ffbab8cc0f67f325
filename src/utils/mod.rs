//! 工具函数模块
//!
//! 时间与存储键相关的通用工具函数

use chrono::{DateTime, Utc};

/// 两个时间点之间经过的秒数（负数视为 0）
pub fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_seconds().max(0) as u64
}

/// 带命名空间的存储键
pub fn namespaced_key(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{}:{}", ns, key),
        _ => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_elapsed_secs_never_negative() {
        let now = Utc::now();
        assert_eq!(elapsed_secs(now + Duration::seconds(5), now), 0);
        assert_eq!(elapsed_secs(now - Duration::seconds(5), now), 5);
    }

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced_key(Some("portal"), "appointments"), "portal:appointments");
        assert_eq!(namespaced_key(Some(""), "appointments"), "appointments");
        assert_eq!(namespaced_key(None, "callHistory"), "callHistory");
    }
}
