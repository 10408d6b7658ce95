//! lodestone CLI - source and documentation indexing daemon

use anyhow::Result;
use clap::{Parser, Subcommand};
use lodestone_core::Config;
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{cmd_serve, cmd_status, cmd_sweep};
use logging::{init_cli_logging, init_daemon_logging};

#[derive(Parser)]
#[command(name = "lodestone")]
#[command(about = "Indexes source repositories and documentation into a searchable vector index")]
#[command(after_help = "\
QUICK START:
  lodestone serve                 # Start the daemon
  lodestone sweep                 # Trigger a scheduled sweep (cron entry point)
  lodestone status                # Show queue statistics")]
struct Cli {
  /// Path to a config file (default: ~/.config/lodestone/config.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the daemon (orchestrator + HTTP API)
  Serve {
    /// Log to the console instead of the log file
    #[arg(long)]
    foreground: bool,
  },
  /// Trigger one scheduled sweep on a running daemon
  Sweep {
    /// Daemon address (default: from config)
    #[arg(long)]
    server: Option<String>,
  },
  /// Show queue statistics from a running daemon
  Status {
    /// Daemon address (default: from config)
    #[arg(long)]
    server: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let config = match &cli.config {
    Some(path) => Config::from_path(path),
    None => Config::load(),
  };

  match cli.command {
    Commands::Serve { foreground } => {
      let _guard = init_daemon_logging(&config.daemon, foreground);
      cmd_serve(config).await
    }
    Commands::Sweep { server } => {
      init_cli_logging();
      let addr = server.unwrap_or_else(|| config.server.bind_addr.clone());
      cmd_sweep(&addr).await
    }
    Commands::Status { server } => {
      init_cli_logging();
      let addr = server.unwrap_or_else(|| config.server.bind_addr.clone());
      cmd_status(&addr).await
    }
  }
}
