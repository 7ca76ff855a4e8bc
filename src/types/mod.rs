//! Shared data structures for the solar advisor
//!
//! - `Module`: catalog entry for one candidate panel
//! - `RecommendationResult`: shaped per-module economics
//! - `AdvisoryResult`: structured reading of generated advice

mod advisory;
mod module;
mod recommendation;

pub use advisory::*;
pub use module::*;
pub use recommendation::*;
