//! WOPR's cron scheduler: schedule parsing, sandboxed script execution,
//! message templating, and the daemon-wide ticker that fires due jobs
//! through the session queue.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod executor;
pub mod prelude;
pub mod schedule;
pub mod scheduler;

pub use error::{CronError, CronResult};
pub use executor::{disabled_outcomes, run_scripts, template_message, ScriptOutcome};
pub use schedule::Schedule;
pub use scheduler::{CronScheduler, NewCronJob};
