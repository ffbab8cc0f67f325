pub mod call_session_controller;
pub mod incoming_call_watcher;

pub use call_session_controller::{CallPhase, CallSessionController, MediaToggles};
pub use incoming_call_watcher::IncomingCallWatcher;
