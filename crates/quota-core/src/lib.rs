//! # Quota Core
//!
//! The domain layer of the quota service: policies, the storage port, the
//! fixed-window limiter and traffic metrics.
//! This crate contains pure decision logic with zero infrastructure dependencies.

pub mod domain;
pub mod limiter;
pub mod metrics;
pub mod ports;

pub use domain::{Policy, WindowState};
pub use limiter::Limiter;
pub use metrics::{DimensionEntry, Metrics, MetricsSnapshot};
pub use ports::{RateLimitError, RateLimitResult, RateLimitStorage};
