//! Process wiring for the WOPR daemon: configuration and storage bootstrap,
//! the management HTTP surface, and the cron ticker. The `woprd` binary is
//! a thin shell around [`state::bootstrap`] and [`http::router`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod http;
pub mod management;
pub mod paths;
pub mod state;

pub use management::ManagementApi;
pub use paths::DaemonPaths;
pub use state::{bootstrap, spawn_cron, AppState};
