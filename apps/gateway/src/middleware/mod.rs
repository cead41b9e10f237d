//! Middleware modules.

pub mod error;
pub mod key;
pub mod rate_limit;
