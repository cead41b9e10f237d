//! Domain types for quota accounting.

mod policy;
mod window;

pub use policy::Policy;
pub use window::{WindowState, window_start_for};
