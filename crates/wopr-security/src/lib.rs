//! The WOPR security kernel.
//!
//! Composes `wopr_core`'s trust, capability, and access-pattern primitives
//! with configuration, storage, and audit into the ordered injection
//! decision pipeline, the tool-level capability gate, and the in-flight
//! request context table described in the security design.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod api_key;
pub mod context;
pub mod error;
pub mod kernel;
pub mod prelude;
pub mod ratelimit;

pub use context::ContextStore;
pub use error::{SecurityError, SecurityResult};
pub use kernel::{Decision, ForwardDecision, SecurityKernel};
pub use ratelimit::{RateLimit, RateLimiter};
