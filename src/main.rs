mod app;
mod cache;
mod clients;
mod config;
mod db;
mod http;
mod manifest;
mod network;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline cache manager: versioned precaching with a cache-first fetch policy")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep caches and registration state in memory for this run only;
  /// `fetch` installs and activates the configured version first
  #[arg(long)]
  ephemeral: bool,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Register the configured version and precache its asset manifest
  Install,
  /// Delete caches of older versions and take control of open clients
  Activate {
    /// Activate even if another version still controls clients
    #[arg(long)]
    force: bool,
  },
  /// Install, then activate
  Deploy,
  /// Request a URL the way a controlled page would
  Fetch {
    /// Path or absolute URL, resolved against the configured origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Look a URL up in the caches without touching the network
  Lookup {
    url: String,
    /// Only search this cache
    #[arg(long)]
    cache: Option<String>,
  },
  /// List cache stores; the current version's is marked with *
  Caches,
  /// Show registered worker versions
  Status,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  // Use RUST_LOG env var to control log level (e.g., RUST_LOG=swcache=debug)
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      (
        Some(fmt::layer().with_writer(writer).with_ansi(false)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(file_layer)
    .with(filter)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let app = app::App::new(config, args.ephemeral)?;

  match args.command {
    Command::Install => app.install().await,
    Command::Activate { force } => app.activate(force).await,
    Command::Deploy => app.deploy().await,
    Command::Fetch {
      url,
      method,
      headers,
      output,
    } => app.fetch(&url, &method, &headers, output.as_deref()).await,
    Command::Lookup { url, cache } => app.lookup(&url, cache.as_deref()),
    Command::Caches => app.caches(),
    Command::Status => app.status(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn test_cli_definition_is_valid() {
    Args::command().debug_assert();
  }

  #[test]
  fn test_parse_fetch_command() {
    let args = Args::try_parse_from([
      "swcache",
      "--ephemeral",
      "fetch",
      "/api/data",
      "-X",
      "post",
      "-H",
      "Accept: application/json",
    ])
    .unwrap();

    assert!(args.ephemeral);
    match args.command {
      Command::Fetch {
        url,
        method,
        headers,
        output,
      } => {
        assert_eq!(url, "/api/data");
        assert_eq!(method, "post");
        assert_eq!(headers, vec!["Accept: application/json"]);
        assert!(output.is_none());
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_parse_activate_force() {
    let args = Args::try_parse_from(["swcache", "activate", "--force"]).unwrap();
    assert!(matches!(args.command, Command::Activate { force: true }));
  }
}
