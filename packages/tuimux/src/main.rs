mod app;
mod clipboard;
mod keymap;
mod logging;
mod render;
mod terminal;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tuimux_core::{runtime, CoreConfig, Runtime};

use crate::clipboard::SystemClipboard;

#[derive(Parser)]
#[command(
    name = "tuimux",
    version,
    about = "Browse, preview and manage tmux sessions from one screen",
    after_help = keymap::HELP
)]
struct Cli {
    #[command(flatten)]
    core: CoreArgs,

    /// Log file (default: <state dir>/tuimux/tuimux.log, filter with TUIMUX_LOG)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll tmux once and print the session tree as JSON
    Snapshot,
}

#[derive(Args)]
struct CoreArgs {
    /// tmux executable
    #[arg(long, default_value = "tmux", global = true)]
    tmux: String,

    /// tmux server socket name (tmux -L)
    #[arg(short = 'L', long, global = true)]
    socket_name: Option<String>,

    /// tmux server socket path (tmux -S)
    #[arg(short = 'S', long, global = true)]
    socket_path: Option<PathBuf>,

    /// Interval between session polls, in milliseconds
    #[arg(long, default_value_t = 1500, global = true)]
    poll_ms: u64,

    /// Interval between preview captures, in milliseconds
    #[arg(long, default_value_t = 750, global = true)]
    preview_ms: u64,

    /// Timeout for a single tmux command, in milliseconds
    #[arg(long, default_value_t = 3000, global = true)]
    timeout_ms: u64,
}

impl CoreArgs {
    fn into_config(self) -> CoreConfig {
        CoreConfig {
            tmux_binary: self.tmux,
            socket_name: self.socket_name,
            socket_path: self.socket_path,
            poll_interval: Duration::from_millis(self.poll_ms.max(100)),
            preview_interval: Duration::from_millis(self.preview_ms.max(100)),
            command_timeout: Duration::from_millis(self.timeout_ms.max(100)),
            ..CoreConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match logging::init(cli.log_file.as_deref()) {
        Ok(path) => info!("tuimux {} logging to {}", env!("CARGO_PKG_VERSION"), path.display()),
        Err(e) => eprintln!("Warning: {}", e),
    }

    let config = cli.core.into_config();
    let result = match cli.command {
        Some(Commands::Snapshot) => print_snapshot(&config).await,
        None => run_tui(config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn print_snapshot(config: &CoreConfig) -> Result<(), String> {
    let snapshot = runtime::poll_once(config)
        .await
        .map_err(|e| e.user_message())?;
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

async fn run_tui(config: CoreConfig) -> Result<(), String> {
    let runtime = Runtime::start(config, Arc::new(SystemClipboard::spawn()))
        .await
        .map_err(|e| e.to_string())?;
    tokio::task::block_in_place(|| app::run(&runtime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["tuimux"]).unwrap();
        assert!(cli.command.is_none());
        let config = cli.core.into_config();
        assert_eq!(config.tmux_binary, "tmux");
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.preview_interval, Duration::from_millis(750));
        assert_eq!(config.command_timeout, Duration::from_secs(3));
        assert!(config.server_args().is_empty());
    }

    #[test]
    fn test_cli_socket_and_snapshot() {
        let cli = Cli::try_parse_from(["tuimux", "snapshot", "-L", "work", "--poll-ms", "500"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Snapshot)));
        let config = cli.core.into_config();
        assert_eq!(config.server_args(), vec!["-L".to_string(), "work".to_string()]);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
    }
}
