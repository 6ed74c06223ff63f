//! Sandboxed execution of a cron job's scripts and `{{name}}` message
//! templating from their output.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use wopr_core::model::CronScript;

/// Variables safe to inherit from the daemon's own environment when
/// launching a cron script.
const ALLOWED_ENV_VARS: &[&str] = &["PATH", "HOME", "USER", "SHELL", "LANG", "LC_ALL", "TMPDIR"];

#[cfg(unix)]
const SAFE_PATH_DIRS: &[&str] = &["/usr/bin", "/bin", "/usr/local/bin"];
#[cfg(windows)]
const SAFE_PATH_DIRS: &[&str] = &[r"C:\Windows\System32", r"C:\Windows"];

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn safe_path() -> String {
    SAFE_PATH_DIRS.join(if cfg!(windows) { ";" } else { ":" })
}

/// The outcome of running one script, used both for history recording and
/// for resolving its `{{name}}` placeholder.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    /// The script's `{{name}}` placeholder.
    pub name: String,
    /// Whether the script exited successfully within its timeout.
    pub success: bool,
    /// Trimmed stdout, used to fill the placeholder on success.
    pub stdout: String,
    /// A short human-readable failure reason, set only when `success` is
    /// `false`.
    pub error: Option<String>,
}

/// Run a job's scripts serially, in the order given. A failing script does
/// not stop the remaining ones from running.
pub async fn run_scripts(scripts: &[CronScript]) -> Vec<ScriptOutcome> {
    let mut outcomes = Vec::with_capacity(scripts.len());
    for script in scripts {
        outcomes.push(run_one(script).await);
    }
    outcomes
}

async fn run_one(script: &CronScript) -> ScriptOutcome {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&script.command);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    if let Some(cwd) = &script.cwd {
        cmd.current_dir(cwd);
    }

    cmd.env_clear();
    for var in ALLOWED_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            if *var == "PATH" {
                cmd.env("PATH", safe_path());
            } else {
                cmd.env(var, value);
            }
        }
    }

    let budget = Duration::from_secs(script.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let name = script.name.clone();

    match timeout(budget, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => ScriptOutcome {
            name,
            success: true,
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            error: None,
        },
        Ok(Ok(output)) => {
            let code = output.status.code().unwrap_or(-1);
            warn!(script = %script.name, exit_code = code, "cron script failed");
            ScriptOutcome { name, success: false, stdout: String::new(), error: Some(format!("exit code {code}")) }
        }
        Ok(Err(err)) => {
            warn!(script = %script.name, error = %err, "cron script failed to spawn");
            ScriptOutcome { name, success: false, stdout: String::new(), error: Some(err.to_string()) }
        }
        Err(_) => {
            warn!(script = %script.name, timeout_secs = budget.as_secs(), "cron script timed out");
            ScriptOutcome { name, success: false, stdout: String::new(), error: Some(format!("timed out after {}s", budget.as_secs())) }
        }
    }
}

/// Every script in `scripts` reported `error: Some("scripts_disabled")`, for
/// when the config gate is off at fire time.
pub fn disabled_outcomes(scripts: &[CronScript]) -> Vec<ScriptOutcome> {
    scripts
        .iter()
        .map(|script| ScriptOutcome { name: script.name.clone(), success: false, stdout: String::new(), error: Some("scripts_disabled".to_string()) })
        .collect()
}

/// Resolve every `{{name}}` placeholder in `message` from script outcomes.
/// A failed script fills its slot with `[script error: <reason>]` instead
/// of aborting the whole message.
#[must_use]
pub fn template_message(message: &str, outcomes: &[ScriptOutcome]) -> String {
    let fills: HashMap<&str, String> = outcomes
        .iter()
        .map(|outcome| {
            let value = if outcome.success {
                outcome.stdout.clone()
            } else {
                format!("[script error: {}]", outcome.error.as_deref().unwrap_or("unknown"))
            };
            (outcome.name.as_str(), value)
        })
        .collect();

    let mut result = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match fills.get(key) {
                    Some(value) => result.push_str(value),
                    None => result.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(name: &str, command: &str) -> CronScript {
        CronScript { name: name.to_string(), command: command.to_string(), cwd: None, timeout: None }
    }

    #[tokio::test]
    async fn successful_script_fills_placeholder() {
        let outcomes = run_scripts(&[script("a", "echo hello")]).await;
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].stdout, "hello");
        assert_eq!(template_message("got {{a}}", &outcomes), "got hello");
    }

    #[tokio::test]
    async fn failed_script_does_not_abort_siblings() {
        let outcomes = run_scripts(&[script("a", "echo hello"), script("b", "false")]).await;
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        let message = template_message("a={{a}} b={{b}}", &outcomes);
        assert_eq!(message, "a=hello b=[script error: exit code 1]");
    }

    #[tokio::test]
    async fn script_exceeding_timeout_is_marked_failed() {
        let mut slow = script("a", "sleep 5");
        slow.timeout = Some(0);
        let outcomes = run_scripts(std::slice::from_ref(&slow)).await;
        assert!(!outcomes[0].success);
    }

    #[test]
    fn unmatched_placeholder_is_left_untouched() {
        let message = template_message("hi {{missing}}", &[]);
        assert_eq!(message, "hi {{missing}}");
    }

    #[test]
    fn disabled_outcomes_report_scripts_disabled() {
        let outcomes = disabled_outcomes(&[script("a", "echo hi")]);
        assert_eq!(outcomes[0].error.as_deref(), Some("scripts_disabled"));
        assert_eq!(template_message("{{a}}", &outcomes), "[script error: scripts_disabled]");
    }
}
