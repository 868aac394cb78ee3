//! Actuate Core: actions, shorthand normalization, runtime configuration.

pub mod action;
pub mod config;
pub mod error;

pub use action::Action;
pub use config::{BackgroundEntry, BindingEntry, ExecutionMode, RuntimeConfig};
pub use error::{Error, Result};
