//! CLI command implementations

use std::sync::Arc;

use anyhow::{Context, Result};
use lodestone::{Collaborators, Orchestrator, server};
use lodestone_core::Config;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the daemon: orchestrator + HTTP API, until interrupted.
pub async fn cmd_serve(config: Config) -> Result<()> {
  let cancel = CancellationToken::new();
  let collaborators = Collaborators::defaults(&config).context("failed to construct collaborators")?;
  let orchestrator = Arc::new(Orchestrator::new(config.clone(), collaborators, cancel.clone()));

  orchestrator.start().await.context("failed to start orchestrator")?;

  // Ctrl-C triggers graceful shutdown
  let signal_cancel = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("Received interrupt, shutting down");
      signal_cancel.cancel();
    }
  });

  server::run(&config.server.bind_addr, orchestrator.clone(), cancel.clone())
    .await
    .context("HTTP server failed")?;

  orchestrator.shutdown().await;
  Ok(())
}

/// Trigger one scheduled sweep on a running daemon.
pub async fn cmd_sweep(server_addr: &str) -> Result<()> {
  let url = format!("http://{}/scheduler/sweep", server_addr);
  let response = reqwest::Client::new()
    .post(&url)
    .send()
    .await
    .with_context(|| format!("failed to reach daemon at {}", server_addr))?;

  let body: serde_json::Value = response.json().await.context("malformed sweep response")?;
  println!("{}", serde_json::to_string_pretty(&body)?);
  Ok(())
}

/// Print queue statistics from a running daemon.
pub async fn cmd_status(server_addr: &str) -> Result<()> {
  let url = format!("http://{}/queue/stats", server_addr);
  let response = reqwest::Client::new()
    .get(&url)
    .send()
    .await
    .with_context(|| format!("failed to reach daemon at {}", server_addr))?;

  let body: serde_json::Value = response.json().await.context("malformed stats response")?;
  println!("{}", serde_json::to_string_pretty(&body)?);
  Ok(())
}
