//! 记录ID值对象
//!
//! 预约、通话、通知的单调递增数字ID。ID 在追加记录的同一次 CAS 写入中
//! 按 `max(existing) + 1` 分配，因此"最小ID"即最早创建。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn value(&self) -> u64 {
                self.0
            }

            /// 在已有ID集合上分配下一个ID
            pub fn next_after<I>(existing: I) -> Self
            where
                I: IntoIterator<Item = Self>,
            {
                let max = existing.into_iter().map(|id| id.0).max().unwrap_or(0);
                Self(max + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

record_id!(
    /// 预约ID
    AppointmentId
);
record_id!(
    /// 通话会话ID
    CallId
);
record_id!(
    /// 通知ID
    NotificationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_after_empty_starts_at_one() {
        assert_eq!(CallId::next_after(Vec::new()), CallId::new(1));
    }

    #[test]
    fn test_next_after_skips_gaps() {
        let ids = [AppointmentId::new(3), AppointmentId::new(9), AppointmentId::new(4)];
        assert_eq!(AppointmentId::next_after(ids), AppointmentId::new(10));
    }

    #[test]
    fn test_parse() {
        assert_eq!(" 12 ".parse::<NotificationId>().unwrap(), NotificationId::new(12));
        assert!("abc".parse::<NotificationId>().is_err());
    }
}
