pub mod entitlement;
pub mod media;
pub mod presence;

pub use entitlement::AllowListEntitlement;
pub use media::LoggingMediaProvider;
pub use presence::{ManualPresenceProbe, StaticUserDirectory};
