//! Subcommand implementations. Each function owns one round trip to the
//! daemon and the rendering of its response.

use colored::Colorize;

use crate::daemon_client::DaemonClient;
use crate::theme::Theme;

pub(crate) async fn health(client: &DaemonClient) -> anyhow::Result<()> {
    let body = client.health().await?;
    println!("{}", Theme::success(&format!("daemon is {}", body.get("status").and_then(|v| v.as_str()).unwrap_or("healthy"))));
    Ok(())
}

pub(crate) async fn create_session(client: &DaemonClient, name: &str, context: Option<String>) -> anyhow::Result<()> {
    let session = client.create_session(name, context).await?;
    println!("{}", Theme::success(&format!("session {} ready", session.name.bold())));
    Ok(())
}

pub(crate) async fn list_sessions(client: &DaemonClient) -> anyhow::Result<()> {
    let sessions = client.list_sessions().await?;
    if sessions.is_empty() {
        println!("{}", Theme::info("no sessions"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Sessions"));
    println!("{:<24} {:<24} CONTEXT", "NAME".dimmed(), "CREATED".dimmed());
    println!("{}", Theme::separator());
    for session in sessions {
        let context = session.context.as_deref().unwrap_or("-");
        println!("{:<24} {:<24} {}", session.name, session.created.to_rfc3339(), context.dimmed());
    }
    println!();
    Ok(())
}

pub(crate) async fn delete_session(client: &DaemonClient, name: &str) -> anyhow::Result<()> {
    client.delete_session(name).await?;
    println!("{}", Theme::success(&format!("deleted session {name}")));
    Ok(())
}

pub(crate) async fn inject(client: &DaemonClient, name: &str, message: &str) -> anyhow::Result<()> {
    let response = client.inject(name, message).await?;
    println!("{}", response.text);
    println!("{}", Theme::dimmed(&format!("finish_reason={}", response.finish_reason)));
    Ok(())
}
