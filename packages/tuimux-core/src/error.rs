//! Error types for the tuimux core.
//!
//! - `ExecutionError`: a tmux command failed (exit status, signal, timeout, or never ran)
//! - `SelectionError`: a UI reference points at something no longer in the snapshot
//! - `ValidationError`: user-supplied text failed sanitization
//! - `StartupError`: tmux could not be reached on the very first poll
//! - `HandoffError`: handing the terminal to a tmux client failed

use crate::{SessionId, WindowId};
use regex::Regex;
use std::fmt;
use std::io;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// How a tmux invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    /// Non-zero exit status
    Code(i32),
    /// Killed by a signal
    Signal,
    /// Did not finish within the command timeout and was killed
    TimedOut(Duration),
    /// The tmux binary could not be found
    NotFound,
    /// The process could not be spawned
    Spawn(String),
    /// Arguments were refused before anything was spawned
    Rejected(ValidationError),
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitInfo::Code(code) => write!(f, "exit status {}", code),
            ExitInfo::Signal => write!(f, "killed by signal"),
            ExitInfo::TimedOut(after) => write!(f, "timed out after {}ms", after.as_millis()),
            ExitInfo::NotFound => write!(f, "tmux not found"),
            ExitInfo::Spawn(reason) => write!(f, "spawn failed: {}", reason),
            ExitInfo::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` failed ({exit}): {stderr}")]
pub struct ExecutionError {
    /// Rendered command line, for logs and messages
    pub command: String,
    pub exit: ExitInfo,
    /// Trimmed error output of the command
    pub stderr: String,
}

fn no_server_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)no server running|error connecting to|failed to connect").ok())
        .as_ref()
}

impl ExecutionError {
    pub fn new(command: impl Into<String>, exit: ExitInfo, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit,
            stderr: stderr.into(),
        }
    }

    /// True when tmux reports that no server is running (which just means "no sessions")
    pub fn is_no_server(&self) -> bool {
        matches!(self.exit, ExitInfo::Code(_))
            && no_server_pattern().is_some_and(|re| re.is_match(&self.stderr))
    }

    /// One-line message suitable for the status line
    pub fn user_message(&self) -> String {
        if let Some(line) = self.stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
            return line.to_string();
        }
        match &self.exit {
            ExitInfo::Code(code) => format!("tmux exited with {}", code),
            ExitInfo::Signal => "tmux was killed by a signal".to_string(),
            ExitInfo::TimedOut(after) => format!("tmux timed out after {}ms", after.as_millis()),
            ExitInfo::NotFound => "tmux is not installed or not on PATH".to_string(),
            ExitInfo::Spawn(reason) => format!("failed to run tmux: {}", reason),
            ExitInfo::Rejected(reason) => reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("session {0} is not in the current snapshot")]
    UnknownSession(SessionId),
    #[error("window {window} is not in session {session}")]
    UnknownWindow { session: SessionId, window: WindowId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    Empty,
    #[error("name contains a control character at position {position}")]
    ControlCharacter { position: usize },
    #[error("argument {index} contains a control character")]
    ControlArgument { index: usize },
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not reach tmux: {}", .0.user_message())]
    ControlChannel(#[source] ExecutionError),
}

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("another client handoff is already in progress")]
    Busy,
    #[error("failed to release the terminal: {0}")]
    Suspend(#[source] io::Error),
    #[error("failed to run the tmux client: {0}")]
    Client(#[source] io::Error),
    #[error("failed to restore the terminal: {0}")]
    Resume(#[source] io::Error),
}
