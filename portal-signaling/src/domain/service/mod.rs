//! 领域服务（Domain Service）

pub mod appointment_registry;
pub mod call_signaling;
pub mod notification_dispatcher;
pub mod presence_tracker;

pub use appointment_registry::{AppointmentList, AppointmentRegistry};
pub use call_signaling::CallSignalingChannel;
pub use notification_dispatcher::NotificationDispatcher;
pub use presence_tracker::PresenceTracker;
