//! tmux command execution.
//!
//! Every command is an argv vector handed straight to the tmux binary; nothing goes
//! through a shell, and arguments holding control characters are refused before spawn.

use futures_util::future::BoxFuture;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::{ExecutionError, ExitInfo};
use crate::naming::check_arguments;
use crate::{PaneId, SessionId, WindowId};

/// Field separator for `-F` formats. Free-text fields (names, commands) come last so
/// a name containing the separator still parses.
pub const FIELD_DELIM: &str = "__TUIMUX__";

pub const SESSION_FORMAT: &str = "#{session_id}__TUIMUX__#{session_windows}__TUIMUX__#{session_attached}__TUIMUX__#{session_created}__TUIMUX__#{session_name}";
pub const WINDOW_FORMAT: &str =
    "#{window_id}__TUIMUX__#{window_index}__TUIMUX__#{window_active}__TUIMUX__#{window_name}";
pub const PANE_FORMAT: &str = "#{pane_id}__TUIMUX__#{pane_index}__TUIMUX__#{pane_width}__TUIMUX__#{pane_height}__TUIMUX__#{pane_active}__TUIMUX__#{pane_current_command}";

/// One line of `list-sessions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub name: String,
    pub windows: u32,
    pub attached: bool,
    pub created: u64,
}

/// One line of `list-windows`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRecord {
    pub id: WindowId,
    pub index: u32,
    pub name: String,
    pub active: bool,
}

/// One line of `list-panes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneRecord {
    pub id: PaneId,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub active: bool,
    pub command: String,
}

/// The structured commands the core knows how to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmuxCommand {
    ListSessions,
    ListWindows(SessionId),
    ListPanes(WindowId),
    NewSession { name: Option<String> },
    KillSession(SessionId),
    RenameSession { id: SessionId, name: String },
    NewWindow { session: SessionId, name: Option<String> },
    KillWindow(WindowId),
    RenameWindow { id: WindowId, name: String },
    SelectWindow(WindowId),
    SwitchClient(SessionId),
    CapturePane { pane: PaneId, lines: u32 },
    EnterCopyMode(PaneId),
    ShowBuffer,
}

impl TmuxCommand {
    /// tmux subcommand name
    pub fn name(&self) -> &'static str {
        match self {
            TmuxCommand::ListSessions => "list-sessions",
            TmuxCommand::ListWindows(_) => "list-windows",
            TmuxCommand::ListPanes(_) => "list-panes",
            TmuxCommand::NewSession { .. } => "new-session",
            TmuxCommand::KillSession(_) => "kill-session",
            TmuxCommand::RenameSession { .. } => "rename-session",
            TmuxCommand::NewWindow { .. } => "new-window",
            TmuxCommand::KillWindow(_) => "kill-window",
            TmuxCommand::RenameWindow { .. } => "rename-window",
            TmuxCommand::SelectWindow(_) => "select-window",
            TmuxCommand::SwitchClient(_) => "switch-client",
            TmuxCommand::CapturePane { .. } => "capture-pane",
            TmuxCommand::EnterCopyMode(_) => "copy-mode",
            TmuxCommand::ShowBuffer => "show-buffer",
        }
    }

    /// Full argv after the binary and server flags
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            TmuxCommand::ListSessions => {
                args.extend(["-F".to_string(), SESSION_FORMAT.to_string()]);
            }
            TmuxCommand::ListWindows(session) => {
                args.extend(target(session.as_str()));
                args.extend(["-F".to_string(), WINDOW_FORMAT.to_string()]);
            }
            TmuxCommand::ListPanes(window) => {
                args.extend(target(window.as_str()));
                args.extend(["-F".to_string(), PANE_FORMAT.to_string()]);
            }
            TmuxCommand::NewSession { name } => {
                args.push("-d".to_string());
                if let Some(name) = name {
                    args.extend(["-s".to_string(), name.clone()]);
                }
            }
            TmuxCommand::NewWindow { session, name } => {
                // Trailing colon: next free index in that session
                args.extend(target(&format!("{}:", session)));
                if let Some(name) = name {
                    args.extend(["-n".to_string(), name.clone()]);
                }
            }
            TmuxCommand::RenameSession { id, name } => {
                args.extend(target(id.as_str()));
                args.extend(["--".to_string(), name.clone()]);
            }
            TmuxCommand::RenameWindow { id, name } => {
                args.extend(target(id.as_str()));
                args.extend(["--".to_string(), name.clone()]);
            }
            TmuxCommand::KillSession(id) | TmuxCommand::SwitchClient(id) => {
                args.extend(target(id.as_str()));
            }
            TmuxCommand::KillWindow(id) | TmuxCommand::SelectWindow(id) => {
                args.extend(target(id.as_str()));
            }
            TmuxCommand::CapturePane { pane, lines } => {
                args.extend(["-p".to_string(), "-J".to_string(), "-e".to_string()]);
                args.extend(target(pane.as_str()));
                args.extend(["-S".to_string(), format!("-{}", lines)]);
            }
            TmuxCommand::EnterCopyMode(pane) => {
                args.extend(target(pane.as_str()));
            }
            TmuxCommand::ShowBuffer => {}
        }
        args
    }
}

fn target(id: &str) -> [String; 2] {
    ["-t".to_string(), id.to_string()]
}

/// Parsed result of [`Executor::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Sessions(Vec<SessionRecord>),
    Windows(Vec<WindowRecord>),
    Panes(Vec<PaneRecord>),
    Text(String),
    Done,
}

/// Runs one tmux invocation. The seam between the core and the real process.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, args: &'a [String]) -> BoxFuture<'a, Result<String, ExecutionError>>;
}

/// Runs the real tmux binary with a timeout
#[derive(Debug, Clone)]
pub struct TmuxRunner {
    binary: String,
    server_args: Vec<String>,
    timeout: Duration,
}

impl TmuxRunner {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            binary: config.tmux_binary.clone(),
            server_args: config.server_args(),
            timeout: config.command_timeout,
        }
    }

    async fn invoke(&self, args: &[String]) -> Result<String, ExecutionError> {
        let command = render_command(&self.binary, args);

        let child = Command::new(&self.binary)
            .args(&self.server_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&command, e))?;

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| spawn_error(&command, e))?,
            Err(_) => return Err(ExecutionError::new(command, ExitInfo::TimedOut(self.timeout), "")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let exit = match output.status.code() {
            Some(code) => ExitInfo::Code(code),
            None => ExitInfo::Signal,
        };
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let text = if stderr.is_empty() { stdout.trim().to_string() } else { stderr };
        Err(ExecutionError::new(command, exit, text))
    }
}

impl CommandRunner for TmuxRunner {
    fn run<'a>(&'a self, args: &'a [String]) -> BoxFuture<'a, Result<String, ExecutionError>> {
        Box::pin(self.invoke(args))
    }
}

fn spawn_error(command: &str, e: io::Error) -> ExecutionError {
    let exit = if e.kind() == io::ErrorKind::NotFound {
        ExitInfo::NotFound
    } else {
        ExitInfo::Spawn(e.to_string())
    };
    ExecutionError::new(command, exit, "")
}

pub(crate) fn render_command(binary: &str, args: &[String]) -> String {
    let mut rendered = binary.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

/// Typed front-end over a [`CommandRunner`]. Stateless and cheap to clone.
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
}

impl Executor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run any structured command and parse its output
    pub async fn execute(&self, command: &TmuxCommand) -> Result<CommandOutput, ExecutionError> {
        Ok(match command {
            TmuxCommand::ListSessions => CommandOutput::Sessions(self.list_sessions().await?),
            TmuxCommand::ListWindows(session) => CommandOutput::Windows(self.list_windows(session).await?),
            TmuxCommand::ListPanes(window) => CommandOutput::Panes(self.list_panes(window).await?),
            TmuxCommand::CapturePane { .. } | TmuxCommand::ShowBuffer => {
                CommandOutput::Text(self.run(command).await?)
            }
            _ => {
                self.run(command).await?;
                CommandOutput::Done
            }
        })
    }

    async fn run(&self, command: &TmuxCommand) -> Result<String, ExecutionError> {
        let args = command.args();
        if let Err(reason) = check_arguments(&args) {
            return Err(ExecutionError::new(
                render_command("tmux", &[command.name().to_string()]),
                ExitInfo::Rejected(reason),
                "",
            ));
        }
        debug!("tmux {}", command.name());
        self.runner.run(&args).await
    }

    /// All sessions, sorted by name. A missing server means no sessions.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ExecutionError> {
        let output = match self.run(&TmuxCommand::ListSessions).await {
            Ok(output) => output,
            Err(e) if e.is_no_server() => {
                debug!("No tmux server running: {}", e.stderr);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let mut sessions = parse_sessions(&output);
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sessions)
    }

    pub async fn list_windows(&self, session: &SessionId) -> Result<Vec<WindowRecord>, ExecutionError> {
        let output = self.run(&TmuxCommand::ListWindows(session.clone())).await?;
        Ok(parse_windows(&output))
    }

    pub async fn list_panes(&self, window: &WindowId) -> Result<Vec<PaneRecord>, ExecutionError> {
        let output = self.run(&TmuxCommand::ListPanes(window.clone())).await?;
        Ok(parse_panes(&output))
    }

    pub async fn new_session(&self, name: Option<&str>) -> Result<(), ExecutionError> {
        let name = name.map(str::to_string);
        self.run(&TmuxCommand::NewSession { name }).await.map(drop)
    }

    pub async fn kill_session(&self, id: &SessionId) -> Result<(), ExecutionError> {
        self.run(&TmuxCommand::KillSession(id.clone())).await.map(drop)
    }

    pub async fn rename_session(&self, id: &SessionId, name: &str) -> Result<(), ExecutionError> {
        let command = TmuxCommand::RenameSession {
            id: id.clone(),
            name: name.to_string(),
        };
        self.run(&command).await.map(drop)
    }

    pub async fn new_window(&self, session: &SessionId, name: Option<&str>) -> Result<(), ExecutionError> {
        let command = TmuxCommand::NewWindow {
            session: session.clone(),
            name: name.map(str::to_string),
        };
        self.run(&command).await.map(drop)
    }

    pub async fn kill_window(&self, id: &WindowId) -> Result<(), ExecutionError> {
        self.run(&TmuxCommand::KillWindow(id.clone())).await.map(drop)
    }

    pub async fn rename_window(&self, id: &WindowId, name: &str) -> Result<(), ExecutionError> {
        let command = TmuxCommand::RenameWindow {
            id: id.clone(),
            name: name.to_string(),
        };
        self.run(&command).await.map(drop)
    }

    pub async fn select_window(&self, id: &WindowId) -> Result<(), ExecutionError> {
        self.run(&TmuxCommand::SelectWindow(id.clone())).await.map(drop)
    }

    pub async fn switch_client(&self, id: &SessionId) -> Result<(), ExecutionError> {
        self.run(&TmuxCommand::SwitchClient(id.clone())).await.map(drop)
    }

    /// Visible content plus up to `lines` of history, escape sequences included
    pub async fn capture_pane(&self, pane: &PaneId, lines: u32) -> Result<String, ExecutionError> {
        let command = TmuxCommand::CapturePane {
            pane: pane.clone(),
            lines,
        };
        self.run(&command).await
    }

    pub async fn enter_copy_mode(&self, pane: &PaneId) -> Result<(), ExecutionError> {
        self.run(&TmuxCommand::EnterCopyMode(pane.clone())).await.map(drop)
    }

    /// Contents of the most recent paste buffer
    pub async fn show_buffer(&self) -> Result<String, ExecutionError> {
        self.run(&TmuxCommand::ShowBuffer).await
    }
}

fn fields(line: &str, expected: usize) -> Option<Vec<&str>> {
    let parts: Vec<&str> = line.splitn(expected, FIELD_DELIM).collect();
    (parts.len() == expected).then_some(parts)
}

fn records<'a, T>(
    output: &'a str,
    kind: &'static str,
    parse: impl Fn(&'a str) -> Option<T>,
) -> Vec<T> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let record = parse(line);
            if record.is_none() {
                warn!("Skipping malformed {} line: {:?}", kind, line);
            }
            record
        })
        .collect()
}

pub fn parse_sessions(output: &str) -> Vec<SessionRecord> {
    records(output, "session", |line| {
        let parts = fields(line, 5)?;
        Some(SessionRecord {
            id: SessionId::new(parts[0]),
            windows: parts[1].parse().ok()?,
            attached: parts[2].parse::<u32>().ok()? > 0,
            created: parts[3].parse().ok()?,
            name: parts[4].to_string(),
        })
    })
}

pub fn parse_windows(output: &str) -> Vec<WindowRecord> {
    records(output, "window", |line| {
        let parts = fields(line, 4)?;
        Some(WindowRecord {
            id: WindowId::new(parts[0]),
            index: parts[1].parse().ok()?,
            active: parts[2] == "1",
            name: parts[3].to_string(),
        })
    })
}

pub fn parse_panes(output: &str) -> Vec<PaneRecord> {
    records(output, "pane", |line| {
        let parts = fields(line, 6)?;
        Some(PaneRecord {
            id: PaneId::new(parts[0]),
            index: parts[1].parse().ok()?,
            width: parts[2].parse().ok()?,
            height: parts[3].parse().ok()?,
            active: parts[4] == "1",
            command: parts[5].to_string(),
        })
    })
}
