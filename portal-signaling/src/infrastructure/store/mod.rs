pub mod memory;
pub mod redis;

pub use memory::InMemorySharedStore;
pub use self::redis::RedisSharedStore;
