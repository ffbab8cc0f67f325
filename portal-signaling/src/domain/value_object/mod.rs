pub mod record_id;
pub mod role;
pub mod user_id;

pub use record_id::{AppointmentId, CallId, NotificationId};
pub use role::Role;
pub use user_id::UserId;
