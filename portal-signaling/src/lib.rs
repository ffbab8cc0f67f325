//! 预约与通话信令服务
//!
//! 学生与 SCAD 之间的预约审批、通话邀请 / 接听 / 拒接 / 结束，以及通知分发。
//! 各参与方之间没有直连，所有状态都经由共享存储交换。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod service;

pub use config::SignalingConfig;
pub use service::{ApplicationContext, Collaborators, initialize, initialize_with};
