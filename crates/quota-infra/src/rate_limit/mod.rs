//! Rate limit storage implementations.

mod memory;

pub use memory::{MemoryStorage, MemoryStorageConfig};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisStorage, RedisStorageConfig};
