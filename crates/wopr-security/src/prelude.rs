//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wopr_security::prelude::*;` to import the security kernel types
//! most crates need.

pub use crate::{ContextStore, Decision, ForwardDecision, RateLimit, RateLimiter, SecurityError, SecurityKernel, SecurityResult};
