//! # Quota Shared
//!
//! Wire types shared by every HTTP surface of the quota service.

pub mod dto;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
