//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wopr_config::prelude::*;` to import the configuration types
//! most crates need.

pub use crate::{Config, ConfigError, ConfigResult};

pub use crate::resolve_home;
