use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the tuimux core
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Program used to talk to the multiplexer
    pub tmux_binary: String,

    /// Named server socket (`tmux -L`)
    pub socket_name: Option<String>,

    /// Explicit server socket path (`tmux -S`)
    pub socket_path: Option<PathBuf>,

    /// Interval between periodic state polls
    pub poll_interval: Duration,

    /// Interval between preview captures of the selected pane
    pub preview_interval: Duration,

    /// Upper bound for any single tmux invocation
    pub command_timeout: Duration,

    /// Maximum concurrent list-windows/list-panes calls during one poll
    pub max_concurrency: usize,

    /// History lines requested for a preview capture
    pub preview_lines: u32,

    /// Preview text is cut to at most this many bytes (keeping the tail)
    pub preview_max_bytes: usize,

    /// Consecutive poll failures before the error becomes persistent
    pub escalate_after: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tmux_binary: "tmux".to_string(),
            socket_name: None,
            socket_path: None,
            poll_interval: Duration::from_millis(1500),
            preview_interval: Duration::from_millis(750),
            command_timeout: Duration::from_secs(3),
            max_concurrency: 8,
            preview_lines: 200,
            preview_max_bytes: 16 * 1024,
            escalate_after: 5,
        }
    }
}

impl CoreConfig {
    /// Arguments placed before every tmux subcommand to select the server
    pub fn server_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(name) = &self.socket_name {
            args.push("-L".to_string());
            args.push(name.clone());
        }
        if let Some(path) = &self.socket_path {
            args.push("-S".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        args
    }
}
