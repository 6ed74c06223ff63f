//! Daemon client — connects the CLI to a running `woprd` over HTTP.
//!
//! The CLI is a thin client: every command round-trips through the
//! daemon's management surface and renders the response. If no daemon is
//! running it is auto-started as a background process.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known daemon state files, mirroring `wopr-daemon`'s own layout.
struct DaemonPaths {
    home: PathBuf,
}

impl DaemonPaths {
    fn resolve() -> anyhow::Result<Self> {
        Ok(Self { home: wopr_config::resolve_home()? })
    }

    fn port_file(&self) -> PathBuf {
        self.home.join("daemon.port")
    }

    fn pid_file(&self) -> PathBuf {
        self.home.join("daemon.pid")
    }

    fn log_file(&self) -> PathBuf {
        self.home.join("logs").join("daemon.log")
    }
}

/// A session as returned by `GET /sessions` / `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub name: String,
    pub created: chrono::DateTime<chrono::Utc>,
    pub context: Option<String>,
}

/// The result of a synchronous inject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectResponse {
    pub inject_id: String,
    pub text: String,
    pub finish_reason: String,
}

/// A client bound to one running daemon instance.
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    /// Connect to the daemon, auto-starting it if it isn't already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be started or never becomes
    /// reachable.
    pub async fn connect() -> anyhow::Result<Self> {
        let paths = DaemonPaths::resolve()?;

        if read_port(&paths).is_none() {
            Self::start_daemon(&paths).await?;
        }

        let port = read_port(&paths).ok_or_else(|| anyhow::anyhow!("daemon port file not found after startup"))?;
        let base_url = format!("http://127.0.0.1:{port}");
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self { http, base_url })
    }

    /// Spawn `woprd` as a detached background process next to the current
    /// executable and wait for it to publish its port file.
    async fn start_daemon(paths: &DaemonPaths) -> anyhow::Result<()> {
        let exe = std::env::current_exe()?;
        let woprd = exe.with_file_name(if cfg!(windows) { "woprd.exe" } else { "woprd" });

        if let Some(parent) = paths.log_file().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log_file = std::fs::File::create(paths.log_file())?;

        std::process::Command::new(&woprd)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::from(log_file))
            .stdin(std::process::Stdio::null())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to start {}: {e}", woprd.display()))?;

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if read_port(paths).is_some() {
                return Ok(());
            }
        }

        let hint = std::fs::read_to_string(paths.log_file()).ok().and_then(|log| last_error_line(&log)).unwrap_or_default();
        Err(anyhow::anyhow!("daemon did not start within 5 seconds{}", if hint.is_empty() { String::new() } else { format!("\n  {hint}") }))
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> anyhow::Result<T> {
        let response = self.http.get(format!("{}{path}", self.base_url)).send().await?;
        Self::into_result(response).await
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> anyhow::Result<T> {
        let response = self.http.post(format!("{}{path}", self.base_url)).json(body).send().await?;
        Self::into_result(response).await
    }

    async fn into_result<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> anyhow::Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let body: Value = response.json().await.unwrap_or_default();
            let message = body.get("message").and_then(Value::as_str).unwrap_or("request failed");
            Err(anyhow::anyhow!("{status}: {message}"))
        }
    }

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub async fn health(&self) -> anyhow::Result<Value> {
        self.get("/health").await
    }

    /// `POST /sessions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon rejects the request.
    pub async fn create_session(&self, name: &str, context: Option<String>) -> anyhow::Result<SessionSummary> {
        self.post("/sessions", &serde_json::json!({"name": name, "context": context})).await
    }

    /// `GET /sessions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    pub async fn list_sessions(&self) -> anyhow::Result<Vec<SessionSummary>> {
        self.get("/sessions").await
    }

    /// `DELETE /sessions/{name}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session does not exist.
    pub async fn delete_session(&self, name: &str) -> anyhow::Result<()> {
        let response = self.http.delete(format!("{}/sessions/{name}", self.base_url)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("{}: failed to delete session {name}", response.status()))
        }
    }

    /// `POST /sessions/{name}/inject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session does not exist or dispatch fails.
    pub async fn inject(&self, name: &str, message: &str) -> anyhow::Result<InjectResponse> {
        self.post(&format!("/sessions/{name}/inject"), &serde_json::json!({"message": message})).await
    }
}

fn read_port(paths: &DaemonPaths) -> Option<u16> {
    std::fs::read_to_string(paths.port_file()).ok()?.trim().parse().ok()
}

/// Read the pid file, if the daemon looks like it's running.
#[must_use]
pub fn is_running() -> bool {
    DaemonPaths::resolve().ok().is_some_and(|paths| paths.pid_file().exists())
}

fn last_error_line(log: &str) -> Option<String> {
    let patterns = ["Error:", "ERROR", "panicked", "FATAL"];
    for line in log.lines().rev() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if patterns.iter().any(|p| trimmed.contains(p)) {
            return Some(trimmed.to_string());
        }
    }
    log.lines().rev().find(|l| !l.trim().is_empty()).map(str::trim).map(str::to_string)
}
