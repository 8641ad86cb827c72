//! Action dispatcher: named user intents -> validated tmux commands.
//!
//! Preconditions are checked against the published view state before anything is
//! sent to tmux. A successful mutation requests an immediate poll; a failed one is
//! reported once and never retried.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::{ExecutionError, ValidationError};
use crate::executor::Executor;
use crate::handoff::{AttachFlow, HandoffRequest, TerminalHandoff};
use crate::naming::{sanitize_name, sanitize_optional_name};
use crate::poller::PollTrigger;
use crate::view_model::{StatusMessage, ViewModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionName {
    Refresh,
    Attach,
    NewSession,
    RenameSession,
    NewWindow,
    RenameWindow,
    KillSession,
    KillWindow,
    SelectWindow,
    CopyMode,
    CopyBuffer,
    SelectNext,
    SelectPrevious,
    ToggleFocus,
}

impl ActionName {
    pub const ALL: [ActionName; 14] = [
        ActionName::Refresh,
        ActionName::Attach,
        ActionName::NewSession,
        ActionName::RenameSession,
        ActionName::NewWindow,
        ActionName::RenameWindow,
        ActionName::KillSession,
        ActionName::KillWindow,
        ActionName::SelectWindow,
        ActionName::CopyMode,
        ActionName::CopyBuffer,
        ActionName::SelectNext,
        ActionName::SelectPrevious,
        ActionName::ToggleFocus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::Refresh => "refresh",
            ActionName::Attach => "attach",
            ActionName::NewSession => "new-session",
            ActionName::RenameSession => "rename-session",
            ActionName::NewWindow => "new-window",
            ActionName::RenameWindow => "rename-window",
            ActionName::KillSession => "kill-session",
            ActionName::KillWindow => "kill-window",
            ActionName::SelectWindow => "select-window",
            ActionName::CopyMode => "copy-mode",
            ActionName::CopyBuffer => "copy-buffer",
            ActionName::SelectNext => "select-next",
            ActionName::SelectPrevious => "select-previous",
            ActionName::ToggleFocus => "toggle-focus",
        }
    }

    /// Actions that take a line of user input (a name)
    pub fn takes_input(&self) -> bool {
        matches!(
            self,
            ActionName::NewSession
                | ActionName::RenameSession
                | ActionName::NewWindow
                | ActionName::RenameWindow
        )
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ActionName {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionName::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Extra data an action may need
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionContext {
    /// Text entered in a prompt, for naming actions
    pub input: Option<String>,
}

impl ActionContext {
    pub fn with_input(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
        }
    }
}

/// Result of a dispatched action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The command succeeded
    Done(String),
    /// Only the selection moved; nothing was sent to tmux
    Selected,
    /// A precondition or validation failed; nothing was sent to tmux
    Rejected(String),
    /// tmux (or the clipboard) reported an error
    Failed(String),
    /// The caller must hand the terminal to a tmux client
    Handoff(HandoffRequest),
}

impl Outcome {
    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Done(m) | Outcome::Rejected(m) | Outcome::Failed(m) => Some(m),
            Outcome::Selected | Outcome::Handoff(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Rejected(_) | Outcome::Failed(_))
    }
}

/// Destination for copied tmux buffer text
pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> Result<(), String>;
}

/// How `attach` reaches a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// Already inside tmux: move the current client
    SwitchClient,
    /// Outside tmux: give the terminal to `tmux attach-session`
    Handoff,
}

impl AttachMode {
    /// `SwitchClient` when the `TMUX` environment variable is set
    pub fn detect() -> Self {
        match std::env::var_os("TMUX") {
            Some(value) if !value.is_empty() => AttachMode::SwitchClient,
            _ => AttachMode::Handoff,
        }
    }
}

pub struct Dispatcher {
    executor: Executor,
    view: Arc<ViewModel>,
    trigger: PollTrigger,
    flow: Arc<AttachFlow>,
    clipboard: Arc<dyn Clipboard>,
    attach_mode: AttachMode,
    config: CoreConfig,
}

fn invalid(e: ValidationError) -> Outcome {
    Outcome::Rejected(format!("Invalid name: {}", e))
}

fn failed(e: ExecutionError) -> Outcome {
    warn!("{}", e);
    Outcome::Failed(e.user_message())
}

impl Dispatcher {
    pub fn new(
        executor: Executor,
        view: Arc<ViewModel>,
        trigger: PollTrigger,
        flow: Arc<AttachFlow>,
        clipboard: Arc<dyn Clipboard>,
        attach_mode: AttachMode,
        config: CoreConfig,
    ) -> Self {
        Self {
            executor,
            view,
            trigger,
            flow,
            clipboard,
            attach_mode,
            config,
        }
    }

    /// Run one action and publish its message on the status line
    pub async fn dispatch(&self, action: ActionName, context: &ActionContext) -> Outcome {
        debug!("Dispatching {}", action);
        let outcome = self.perform(action, context).await;
        self.report(&outcome);
        outcome
    }

    fn report(&self, outcome: &Outcome) {
        if let Some(message) = outcome.message() {
            let status = if outcome.is_error() {
                StatusMessage::error(message)
            } else {
                StatusMessage::info(message)
            };
            self.view.set_status(status);
        }
    }

    /// Mutation went through: refresh right away
    fn done(&self, message: String) -> Outcome {
        self.trigger.request();
        Outcome::Done(message)
    }

    async fn perform(&self, action: ActionName, context: &ActionContext) -> Outcome {
        let state = self.view.current();
        let input = context.input.as_deref();

        match action {
            ActionName::Refresh => self.done("Refreshing tmux sessions.".to_string()),

            ActionName::SelectNext | ActionName::SelectPrevious => {
                let delta = if action == ActionName::SelectNext { 1 } else { -1 };
                self.view.move_selection(delta);
                Outcome::Selected
            }

            ActionName::ToggleFocus => {
                self.view.toggle_focus();
                Outcome::Selected
            }

            ActionName::Attach => {
                let Some(session) = state.selected_session() else {
                    return Outcome::Rejected("Select a session to attach.".to_string());
                };
                match self.attach_mode {
                    AttachMode::SwitchClient => match self.executor.switch_client(&session.id).await {
                        Ok(()) => self.done(format!("Switched to {}.", session.name)),
                        Err(e) => failed(e),
                    },
                    AttachMode::Handoff => {
                        Outcome::Handoff(HandoffRequest::attach(&session.id, &self.config))
                    }
                }
            }

            ActionName::NewSession => {
                let name = match sanitize_optional_name(input) {
                    Ok(name) => name,
                    Err(e) => return invalid(e),
                };
                match self.executor.new_session(name.as_deref()).await {
                    Ok(()) => self.done(match name {
                        Some(name) => format!("Created session {}.", name),
                        None => "Created session.".to_string(),
                    }),
                    Err(e) => failed(e),
                }
            }

            ActionName::RenameSession => {
                let Some(session) = state.selected_session() else {
                    return Outcome::Rejected("Select a session to rename.".to_string());
                };
                let name = match sanitize_name(input.unwrap_or_default()) {
                    Ok(name) => name,
                    Err(e) => return invalid(e),
                };
                if name == session.name {
                    return Outcome::Done("Session name unchanged.".to_string());
                }
                match self.executor.rename_session(&session.id, &name).await {
                    Ok(()) => self.done(format!("Renamed session to {}.", name)),
                    Err(e) => failed(e),
                }
            }

            ActionName::NewWindow => {
                let Some(session) = state.selected_session() else {
                    return Outcome::Rejected("Select a session first.".to_string());
                };
                let name = match sanitize_optional_name(input) {
                    Ok(name) => name,
                    Err(e) => return invalid(e),
                };
                match self.executor.new_window(&session.id, name.as_deref()).await {
                    Ok(()) => self.done(format!("Created window in {}.", session.name)),
                    Err(e) => failed(e),
                }
            }

            ActionName::RenameWindow => {
                let Some(window) = state.selected_window() else {
                    return Outcome::Rejected("Select a window to rename.".to_string());
                };
                let name = match sanitize_name(input.unwrap_or_default()) {
                    Ok(name) => name,
                    Err(e) => return invalid(e),
                };
                if name == window.name {
                    return Outcome::Done("Window name unchanged.".to_string());
                }
                match self.executor.rename_window(&window.id, &name).await {
                    Ok(()) => self.done(format!("Renamed window to {}.", name)),
                    Err(e) => failed(e),
                }
            }

            ActionName::KillSession => {
                let Some(session) = state.selected_session() else {
                    return Outcome::Rejected("Select a session to kill.".to_string());
                };
                match self.executor.kill_session(&session.id).await {
                    Ok(()) => self.done(format!("Killed session {}.", session.name)),
                    Err(e) => failed(e),
                }
            }

            ActionName::KillWindow => {
                let Some(window) = state.selected_window() else {
                    return Outcome::Rejected("Select a window to kill.".to_string());
                };
                match self.executor.kill_window(&window.id).await {
                    Ok(()) => self.done(format!("Killed window {}.", window.name)),
                    Err(e) => failed(e),
                }
            }

            ActionName::SelectWindow => {
                let Some(window) = state.selected_window() else {
                    return Outcome::Rejected("Select a window first.".to_string());
                };
                match self.executor.select_window(&window.id).await {
                    Ok(()) => self.done(format!("Selected window {}.", window.name)),
                    Err(e) => failed(e),
                }
            }

            ActionName::CopyMode => {
                let Some(pane) = state.preview_pane() else {
                    return Outcome::Rejected("Select a window first.".to_string());
                };
                match self.executor.enter_copy_mode(&pane.id).await {
                    Ok(()) => self.done(format!("Entered copy mode in {}.", pane.id)),
                    Err(e) => failed(e),
                }
            }

            ActionName::CopyBuffer => {
                let text = match self.executor.show_buffer().await {
                    Ok(text) => text,
                    Err(e) => return failed(e),
                };
                match self.clipboard.set_text(&text) {
                    Ok(()) => Outcome::Done("Copied tmux buffer to clipboard.".to_string()),
                    Err(e) => {
                        warn!("Clipboard write failed: {}", e);
                        Outcome::Failed(format!("Clipboard unavailable: {}", e))
                    }
                }
            }
        }
    }

    /// Second half of `attach` outside tmux: blocks until the client exits.
    pub fn complete_handoff(&self, terminal: &mut dyn TerminalHandoff, request: &HandoffRequest) -> Outcome {
        let outcome = match self.flow.run(terminal, request) {
            Ok(exit) if exit.success() => {
                info!("Returned from session {}", request.session);
                Outcome::Done(format!("Detached from {}.", request.session))
            }
            Ok(exit) => match exit.code {
                Some(code) => Outcome::Failed(format!("tmux exited with {}", code)),
                None => Outcome::Failed("tmux client was killed by a signal".to_string()),
            },
            Err(e) => {
                warn!("Handoff failed: {}", e);
                Outcome::Failed(e.to_string())
            }
        };
        self.report(&outcome);
        outcome
    }
}
