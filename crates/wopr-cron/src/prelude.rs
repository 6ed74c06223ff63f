//! Commonly imported cron types.

pub use crate::error::{CronError, CronResult};
pub use crate::executor::{disabled_outcomes, run_scripts, template_message, ScriptOutcome};
pub use crate::schedule::Schedule;
pub use crate::scheduler::{CronScheduler, NewCronJob};
