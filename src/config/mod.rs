//! Configuration Module
//!
//! Two layers, both loaded once at startup and never mutated afterwards:
//!
//! - [`AppSettings`]: operator-tunable TOML (server, catalog location,
//!   text-generation backend).
//! - [`Catalog`]: modules, ordered formulas and lookup tables read from the
//!   catalog directory. Shared with handlers behind an `Arc`.
//!
//! ## Settings search order
//!
//! 1. `--config <path>`
//! 2. `SOLAR_ADVISOR_CONFIG` environment variable
//! 3. `solar_advisor.toml` in the current working directory
//! 4. Built-in defaults

mod catalog;
pub mod defaults;
mod settings;
pub mod validation;

pub use catalog::*;
pub use settings::*;
