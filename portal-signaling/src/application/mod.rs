//! 应用服务层（Command / Query）

pub mod commands;
pub mod handlers;
pub mod queries;
pub mod services;

pub use handlers::{PortalCommandHandler, PortalQueryHandler};
pub use services::{CallPhase, CallSessionController, IncomingCallWatcher, MediaToggles};
