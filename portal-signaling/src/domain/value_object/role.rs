//! Role 值对象
//!
//! 参与预约与通话的两类角色

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use portal_core::PortalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Scad,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Scad => "scad",
        }
    }

    /// 对端角色
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Student => Role::Scad,
            Role::Scad => Role::Student,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "scad" => Ok(Role::Scad),
            other => Err(PortalError::validation(format!("unknown role: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_and_counterpart() {
        assert_eq!("SCAD".parse::<Role>().unwrap(), Role::Scad);
        assert_eq!(Role::Student.counterpart(), Role::Scad);
        assert!("faculty".parse::<Role>().is_err());
    }
}
