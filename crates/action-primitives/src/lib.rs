//! Element-level browser interaction for the booking workflows.
//!
//! - [`Navigator`]: waits, clicks, form filling and outcome races over a [`cdp_adapter::Cdp`]
//! - [`poll_until`]: the fixed-interval polling loop every wait is built on
//! - [`Pacing`]: randomized human-like pauses between steps

pub mod errors;
mod navigator;
mod pacing;
pub mod types;
mod waiting;

pub use errors::*;
pub use navigator::*;
pub use pacing::*;
pub use types::*;
pub use waiting::*;
