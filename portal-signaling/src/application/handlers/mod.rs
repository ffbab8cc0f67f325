//! 应用层处理器（CQRS）

pub mod command_handler;
pub mod query_handler;

pub use command_handler::PortalCommandHandler;
pub use query_handler::PortalQueryHandler;
