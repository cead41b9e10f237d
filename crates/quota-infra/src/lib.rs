//! # Quota Infrastructure
//!
//! Concrete implementations of the storage port defined in `quota-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All backends enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis-backed storage shared between instances

pub mod rate_limit;

// Re-exports - In-Memory
pub use rate_limit::{MemoryStorage, MemoryStorageConfig};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use rate_limit::{RedisConfig, RedisStorage, RedisStorageConfig};
