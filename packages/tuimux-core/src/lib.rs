pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod gate;
pub mod handoff;
pub mod naming;
pub mod poller;
pub mod preview;
pub mod runtime;
pub mod view_model;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use config::CoreConfig;
pub use dispatcher::{ActionContext, ActionName, AttachMode, Clipboard, Dispatcher, Outcome};
pub use error::{ExecutionError, ExitInfo, HandoffError, SelectionError, StartupError, ValidationError};
pub use executor::{CommandRunner, Executor, TmuxCommand, TmuxRunner};
pub use gate::ControlGate;
pub use handoff::{AttachFlow, ClientExit, HandoffRequest, HandoffState, TerminalHandoff};
pub use poller::{PollLoop, PollStats, PollTrigger, StatePoller};
pub use preview::PreviewStreamer;
pub use runtime::Runtime;
pub use view_model::{Focus, PollHealth, Selection, StatusMessage, ViewModel, ViewObserver, ViewState};

// ============================================
// Identifiers
// ============================================

macro_rules! tmux_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

tmux_id!(
    /// Session ID (e.g., "$0"), stable for the lifetime of the session
    SessionId
);
tmux_id!(
    /// Window ID (e.g., "@0")
    WindowId
);
tmux_id!(
    /// Pane ID (e.g., "%0")
    PaneId
);

// ============================================
// Snapshot Types
// ============================================

/// A single tmux pane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pane {
    pub id: PaneId,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub active: bool,
    /// Current running command (e.g., "bash", "vim")
    pub command: String,
    /// Latest preview capture, bounded in length. Set on panes that have been previewed
    /// and carried across polls for as long as the pane exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
}

impl Pane {
    fn same_layout(&self, other: &Pane) -> bool {
        self.id == other.id
            && self.index == other.index
            && self.width == other.width
            && self.height == other.height
            && self.active == other.active
            && self.command == other.command
    }
}

/// A single tmux window (tab)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    /// Position in the session; shifts when other windows are killed
    pub index: u32,
    pub name: String,
    /// True if this is the current window of its session
    pub active: bool,
    /// Always one of `panes`, or None when the window has no panes
    pub active_pane: Option<PaneId>,
    pub panes: Vec<Pane>,
}

impl Window {
    pub fn pane(&self, id: &PaneId) -> Option<&Pane> {
        self.panes.iter().find(|p| &p.id == id)
    }

    pub fn active_pane(&self) -> Option<&Pane> {
        self.active_pane.as_ref().and_then(|id| self.pane(id))
    }

    fn differs_from(&self, other: &Window) -> bool {
        self.index != other.index
            || self.name != other.name
            || self.active != other.active
            || self.active_pane != other.active_pane
            || self.panes.len() != other.panes.len()
            || self
                .panes
                .iter()
                .zip(&other.panes)
                .any(|(a, b)| !a.same_layout(b))
    }
}

/// A tmux session with its windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub attached: bool,
    /// Creation token from tmux; only meaningful for ordering
    pub created: u64,
    pub windows: Vec<Window>,
}

impl Session {
    pub fn window(&self, id: &WindowId) -> Option<&Window> {
        self.windows.iter().find(|w| &w.id == id)
    }

    fn differs_from(&self, other: &Session) -> bool {
        self.name != other.name
            || self.attached != other.attached
            || self.created != other.created
            || self.windows.len() != other.windows.len()
            || self
                .windows
                .iter()
                .zip(&other.windows)
                .any(|(a, b)| a.id != b.id)
    }
}

/// Full session tree at one point in time.
///
/// Once handed to the view model a snapshot is never mutated; updates build a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequence number of the poll that produced this snapshot (0 = never polled)
    pub seq: u64,
    pub sessions: Vec<Session>,
}

impl Snapshot {
    pub fn new(seq: u64, sessions: Vec<Session>) -> Self {
        Self { seq, sessions }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn window(&self, session: &SessionId, window: &WindowId) -> Option<&Window> {
        self.session(session).and_then(|s| s.window(window))
    }

    pub fn find_pane(&self, id: &PaneId) -> Option<&Pane> {
        self.panes().find(|p| &p.id == id)
    }

    fn panes(&self) -> impl Iterator<Item = &Pane> {
        self.sessions
            .iter()
            .flat_map(|s| s.windows.iter())
            .flat_map(|w| w.panes.iter())
    }

    /// Every window's active pane must be one of its own panes.
    pub fn is_consistent(&self) -> bool {
        self.sessions
            .iter()
            .flat_map(|s| s.windows.iter())
            .all(|w| match &w.active_pane {
                Some(id) => w.pane(id).is_some(),
                None => w.panes.is_empty(),
            })
    }

    /// Copy of this snapshot with `capture` stored on every occurrence of the pane.
    /// Returns None if the pane is not part of the snapshot.
    pub fn with_pane_capture(&self, id: &PaneId, capture: &str) -> Option<Snapshot> {
        self.find_pane(id)?;
        let mut next = self.clone();
        for pane in next
            .sessions
            .iter_mut()
            .flat_map(|s| s.windows.iter_mut())
            .flat_map(|w| w.panes.iter_mut())
            .filter(|p| &p.id == id)
        {
            pane.capture = Some(capture.to_string());
        }
        Some(next)
    }

    /// Keep the latest capture of panes that survived into this (unpublished) snapshot.
    pub fn carry_captures_from(&mut self, previous: &Snapshot) {
        let captures: HashMap<&PaneId, &String> = previous
            .panes()
            .filter_map(|p| p.capture.as_ref().map(|c| (&p.id, c)))
            .collect();
        if captures.is_empty() {
            return;
        }
        for pane in self
            .sessions
            .iter_mut()
            .flat_map(|s| s.windows.iter_mut())
            .flat_map(|w| w.panes.iter_mut())
        {
            if pane.capture.is_none() {
                pane.capture = captures.get(&pane.id).map(|c| (*c).clone());
            }
        }
    }

    /// What changed between `previous` and this snapshot. Captures are ignored.
    pub fn diff(&self, previous: &Snapshot) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for session in &self.sessions {
            match previous.session(&session.id) {
                None => changes.sessions_added.push(session.id.clone()),
                Some(old) if session.differs_from(old) => {
                    changes.sessions_changed.push(session.id.clone())
                }
                Some(_) => {}
            }
            for window in &session.windows {
                let key = (session.id.clone(), window.id.clone());
                match previous.window(&session.id, &window.id) {
                    None => changes.windows_added.push(key),
                    Some(old) if window.differs_from(old) => changes.windows_changed.push(key),
                    Some(_) => {}
                }
            }
        }

        for old in &previous.sessions {
            if self.session(&old.id).is_none() {
                changes.sessions_removed.push(old.id.clone());
            }
            for window in &old.windows {
                if self.window(&old.id, &window.id).is_none() {
                    changes
                        .windows_removed
                        .push((old.id.clone(), window.id.clone()));
                }
            }
        }

        changes
    }
}

/// Difference between two consecutive snapshots.
///
/// Windows are keyed by their session because tmux can link one window into several sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub sessions_added: Vec<SessionId>,
    pub sessions_removed: Vec<SessionId>,
    pub sessions_changed: Vec<SessionId>,
    pub windows_added: Vec<(SessionId, WindowId)>,
    pub windows_removed: Vec<(SessionId, WindowId)>,
    pub windows_changed: Vec<(SessionId, WindowId)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.sessions_added.is_empty()
            && self.sessions_removed.is_empty()
            && self.sessions_changed.is_empty()
            && self.windows_added.is_empty()
            && self.windows_removed.is_empty()
            && self.windows_changed.is_empty()
    }
}
