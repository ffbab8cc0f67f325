pub mod appointment;
pub mod call_session;
pub mod notification;
pub mod presence;

pub use appointment::{
    Appointment, AppointmentDraft, AppointmentStatus, StatusTransition, ValidatedDraft,
};
pub use call_session::{CallSession, CallSessionCreateParams, CallStatus, EndReason};
pub use notification::{DEFAULT_NOTIFICATION_CAP, Notification, NotificationKind, Recipient};
pub use presence::PresenceRecord;
