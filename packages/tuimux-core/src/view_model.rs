//! View model: the one published snapshot plus UI selection.
//!
//! Readers `load` an `Arc<ViewState>` and never block. Writers serialize on a mutex,
//! build a fresh state and swap it in, then notify observers after releasing the lock.

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::SelectionError;
use crate::{ChangeSet, Pane, PaneId, Session, SessionId, Snapshot, Window, WindowId};

/// Which list keyboard navigation moves through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Focus {
    #[default]
    Sessions,
    Windows,
}

/// Highlighted session and window. Always refers to entities of the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub session: Option<SessionId>,
    pub window: Option<WindowId>,
    pub focus: Focus,
}

impl Selection {
    /// Keep whatever still exists in `snapshot`, falling back to the first session
    /// and its first window.
    fn revalidate(&self, snapshot: &Snapshot) -> Selection {
        let session = self
            .session
            .as_ref()
            .and_then(|id| snapshot.session(id))
            .or_else(|| snapshot.sessions.first());
        let window = session.and_then(|s| {
            self.window
                .as_ref()
                .and_then(|id| s.window(id))
                .or_else(|| s.windows.first())
        });
        Selection {
            session: session.map(|s| s.id.clone()),
            window: window.map(|w| w.id.clone()),
            focus: self.focus,
        }
    }
}

/// Health of the background poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollHealth {
    #[default]
    Healthy,
    /// Recent polls failed; the last good snapshot is still shown
    Degraded { failures: u32, message: String },
    /// Failures reached the escalation threshold
    Failing { failures: u32, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Everything the renderer reads, published as one immutable value
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub snapshot: Arc<Snapshot>,
    pub selection: Selection,
    pub health: PollHealth,
    pub status: Option<StatusMessage>,
}

impl ViewState {
    pub fn selected_session(&self) -> Option<&Session> {
        self.selection
            .session
            .as_ref()
            .and_then(|id| self.snapshot.session(id))
    }

    pub fn selected_window(&self) -> Option<&Window> {
        let window = self.selection.window.as_ref()?;
        self.selected_session()?.window(window)
    }

    /// The pane shown in the preview: active pane of the selected window
    pub fn preview_pane(&self) -> Option<&Pane> {
        self.selected_window()?.active_pane()
    }
}

/// Receives change notifications (the renderer implements this to schedule repaints)
pub trait ViewObserver: Send + Sync {
    fn on_snapshot_changed(&self, snapshot: &Arc<Snapshot>, changes: &ChangeSet);

    fn on_selection_changed(&self, selection: &Selection);

    fn on_preview_changed(&self, _pane: &PaneId) {}

    fn on_status_changed(&self) {}
}

enum Notice {
    Snapshot(Arc<Snapshot>, ChangeSet),
    Selection(Selection),
    Preview(PaneId),
    Status,
}

pub struct ViewModel {
    state: ArcSwap<ViewState>,
    write_lock: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn ViewObserver>>>,
    selection_tx: watch::Sender<Selection>,
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewModel {
    pub fn new() -> Self {
        let (selection_tx, _rx) = watch::channel(Selection::default());
        Self {
            state: ArcSwap::from_pointee(ViewState::default()),
            write_lock: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
            selection_tx,
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn ViewObserver>) {
        self.observers.write().push(observer);
    }

    /// Selection updates as a watch channel (used by the preview streamer to re-target)
    pub fn watch_selection(&self) -> watch::Receiver<Selection> {
        self.selection_tx.subscribe()
    }

    /// Current published state. Never blocks.
    pub fn current(&self) -> Arc<ViewState> {
        self.state.load_full()
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.state.load().snapshot.clone()
    }

    pub fn current_selection(&self) -> Selection {
        self.state.load().selection.clone()
    }

    /// Build the next state from the current one and publish it.
    fn update<F>(&self, f: F) -> Vec<Notice>
    where
        F: FnOnce(&ViewState) -> Option<(ViewState, Vec<Notice>)>,
    {
        let _guard = self.write_lock.lock();
        let current = self.state.load_full();
        let Some((next, mut notices)) = f(current.as_ref()) else {
            return Vec::new();
        };
        if next.selection != current.selection {
            self.selection_tx.send_replace(next.selection.clone());
            notices.push(Notice::Selection(next.selection.clone()));
        }
        self.state.store(Arc::new(next));
        notices
    }

    fn notify(&self, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        let observers = self.observers.read().clone();
        for notice in &notices {
            for observer in &observers {
                match notice {
                    Notice::Snapshot(snapshot, changes) => observer.on_snapshot_changed(snapshot, changes),
                    Notice::Selection(selection) => observer.on_selection_changed(selection),
                    Notice::Preview(pane) => observer.on_preview_changed(pane),
                    Notice::Status => observer.on_status_changed(),
                }
            }
        }
    }

    /// Replace the snapshot and re-validate the selection against it.
    ///
    /// Later calls always win, whatever order the polls were started in.
    pub fn apply_snapshot(&self, snapshot: Snapshot) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let notices = self.update(|current| {
            let mut snapshot = snapshot;
            snapshot.carry_captures_from(&current.snapshot);
            changes = snapshot.diff(&current.snapshot);

            let snapshot = Arc::new(snapshot);
            let next = ViewState {
                selection: current.selection.revalidate(&snapshot),
                snapshot: snapshot.clone(),
                ..current.clone()
            };
            let mut notices = Vec::new();
            if !changes.is_empty() {
                debug!("Snapshot {} changed: {:?}", snapshot.seq, changes);
                notices.push(Notice::Snapshot(snapshot, changes.clone()));
            }
            Some((next, notices))
        });
        self.notify(notices);
        changes
    }

    /// Select a session and optionally one of its windows.
    ///
    /// Without a window, the current window is kept when it belongs to the session,
    /// otherwise the session's first window is chosen.
    pub fn select(&self, session: &SessionId, window: Option<&WindowId>) -> Result<Selection, SelectionError> {
        let mut result = Err(SelectionError::UnknownSession(session.clone()));
        let notices = self.update(|current| {
            let Some(target) = current.snapshot.session(session) else {
                return None;
            };
            let window = match window {
                Some(id) => match target.window(id) {
                    Some(w) => Some(w.id.clone()),
                    None => {
                        result = Err(SelectionError::UnknownWindow {
                            session: session.clone(),
                            window: id.clone(),
                        });
                        return None;
                    }
                },
                None => current
                    .selection
                    .window
                    .as_ref()
                    .and_then(|id| target.window(id))
                    .or_else(|| target.windows.first())
                    .map(|w| w.id.clone()),
            };
            let selection = Selection {
                session: Some(session.clone()),
                window,
                focus: current.selection.focus,
            };
            result = Ok(selection.clone());
            Some((
                ViewState {
                    selection,
                    ..current.clone()
                },
                Vec::new(),
            ))
        });
        self.notify(notices);
        if let Err(e) = &result {
            debug!("Selection rejected: {}", e);
        }
        result
    }

    /// Move within the focused list by `delta`, clamped at both ends.
    /// Returns true if the selection changed.
    pub fn move_selection(&self, delta: isize) -> bool {
        let notices = self.update(|current| {
            let snapshot = &current.snapshot;
            let selection = match current.selection.focus {
                Focus::Sessions => {
                    let ids: Vec<&SessionId> = snapshot.sessions.iter().map(|s| &s.id).collect();
                    let id = step(&ids, current.selection.session.as_ref(), delta)?;
                    Selection {
                        session: Some(id.clone()),
                        window: None,
                        focus: Focus::Sessions,
                    }
                    .revalidate(snapshot)
                }
                Focus::Windows => {
                    let session = current.selected_session()?;
                    let ids: Vec<&WindowId> = session.windows.iter().map(|w| &w.id).collect();
                    let id = step(&ids, current.selection.window.as_ref(), delta)?;
                    Selection {
                        window: Some(id.clone()),
                        ..current.selection.clone()
                    }
                }
            };
            Some((
                ViewState {
                    selection,
                    ..current.clone()
                },
                Vec::new(),
            ))
        });
        let changed = !notices.is_empty();
        self.notify(notices);
        changed
    }

    pub fn toggle_focus(&self) -> Focus {
        let mut focus = Focus::Sessions;
        let notices = self.update(|current| {
            focus = match current.selection.focus {
                Focus::Sessions => Focus::Windows,
                Focus::Windows => Focus::Sessions,
            };
            let selection = Selection {
                focus,
                ..current.selection.clone()
            };
            Some((
                ViewState {
                    selection,
                    ..current.clone()
                },
                Vec::new(),
            ))
        });
        self.notify(notices);
        focus
    }

    /// Store a preview capture on `pane`, but only while it is the previewed pane.
    /// Returns true if the stored capture changed.
    pub fn update_pane_capture(&self, pane: &PaneId, capture: &str) -> bool {
        let notices = self.update(|current| {
            let previewed = current.preview_pane().filter(|p| &p.id == pane)?;
            if previewed.capture.as_deref() == Some(capture) {
                return None;
            }
            let snapshot = current.snapshot.with_pane_capture(pane, capture)?;
            Some((
                ViewState {
                    snapshot: Arc::new(snapshot),
                    ..current.clone()
                },
                vec![Notice::Preview(pane.clone())],
            ))
        });
        let stored = !notices.is_empty();
        self.notify(notices);
        stored
    }

    pub fn set_health(&self, health: PollHealth) {
        let notices = self.update(|current| {
            if current.health == health {
                return None;
            }
            Some((
                ViewState {
                    health: health.clone(),
                    ..current.clone()
                },
                vec![Notice::Status],
            ))
        });
        self.notify(notices);
    }

    pub fn set_status(&self, status: StatusMessage) {
        let notices = self.update(|current| {
            Some((
                ViewState {
                    status: Some(status),
                    ..current.clone()
                },
                vec![Notice::Status],
            ))
        });
        self.notify(notices);
    }
}

fn step<'a, T: PartialEq>(ids: &[&'a T], current: Option<&T>, delta: isize) -> Option<&'a T> {
    if ids.is_empty() {
        return None;
    }
    let position = current
        .and_then(|c| ids.iter().position(|id| *id == c))
        .unwrap_or(0) as isize;
    let target = (position + delta).clamp(0, ids.len() as isize - 1) as usize;
    if Some(ids[target]) == current {
        return None;
    }
    Some(ids[target])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pane(id: &str) -> Pane {
        Pane {
            id: PaneId::new(id),
            index: 0,
            width: 80,
            height: 24,
            active: true,
            command: "bash".to_string(),
            capture: None,
        }
    }

    fn window(id: &str, pane_id: &str) -> Window {
        Window {
            id: WindowId::new(id),
            index: 0,
            name: id.to_string(),
            active: true,
            active_pane: Some(PaneId::new(pane_id)),
            panes: vec![pane(pane_id)],
        }
    }

    fn session(id: &str, windows: Vec<Window>) -> Session {
        Session {
            id: SessionId::new(id),
            name: id.to_string(),
            attached: false,
            created: 0,
            windows,
        }
    }

    fn two_sessions() -> Snapshot {
        Snapshot::new(
            1,
            vec![
                session("$A", vec![window("@1", "%1"), window("@2", "%2")]),
                session("$B", vec![window("@3", "%3")]),
            ],
        )
    }

    #[derive(Default)]
    struct Counter {
        snapshots: AtomicUsize,
        selections: AtomicUsize,
        previews: AtomicUsize,
    }

    impl ViewObserver for Counter {
        fn on_snapshot_changed(&self, _snapshot: &Arc<Snapshot>, _changes: &ChangeSet) {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
        }

        fn on_selection_changed(&self, _selection: &Selection) {
            self.selections.fetch_add(1, Ordering::SeqCst);
        }

        fn on_preview_changed(&self, _pane: &PaneId) {
            self.previews.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_selection_falls_back_to_first_available() {
        let vm = ViewModel::new();
        vm.apply_snapshot(two_sessions());
        assert_eq!(vm.current_selection().session, Some(SessionId::new("$A")));

        let only_b = Snapshot::new(2, vec![session("$B", vec![window("@3", "%3")])]);
        vm.apply_snapshot(only_b);
        let selection = vm.current_selection();
        assert_eq!(selection.session, Some(SessionId::new("$B")));
        assert_eq!(selection.window, Some(WindowId::new("@3")));

        vm.apply_snapshot(Snapshot::new(3, Vec::new()));
        let selection = vm.current_selection();
        assert_eq!(selection.session, None);
        assert_eq!(selection.window, None);
    }

    #[test]
    fn test_select_rejects_stale_targets() {
        let vm = ViewModel::new();
        vm.apply_snapshot(two_sessions());

        let err = vm.select(&SessionId::new("$Z"), None).unwrap_err();
        assert_eq!(err, SelectionError::UnknownSession(SessionId::new("$Z")));

        let err = vm
            .select(&SessionId::new("$B"), Some(&WindowId::new("@1")))
            .unwrap_err();
        assert!(matches!(err, SelectionError::UnknownWindow { .. }));
        assert_eq!(vm.current_selection().session, Some(SessionId::new("$A")));

        let selection = vm.select(&SessionId::new("$B"), None).unwrap();
        assert_eq!(selection.window, Some(WindowId::new("@3")));
    }

    #[test]
    fn test_move_selection_clamps_within_focused_list() {
        let vm = ViewModel::new();
        vm.apply_snapshot(two_sessions());

        assert!(!vm.move_selection(-1));
        assert!(vm.move_selection(1));
        assert_eq!(vm.current_selection().session, Some(SessionId::new("$B")));
        assert!(!vm.move_selection(1));

        vm.select(&SessionId::new("$A"), None).unwrap();
        assert_eq!(vm.toggle_focus(), Focus::Windows);
        assert!(vm.move_selection(1));
        let selection = vm.current_selection();
        assert_eq!(selection.session, Some(SessionId::new("$A")));
        assert_eq!(selection.window, Some(WindowId::new("@2")));
    }

    #[test]
    fn test_capture_only_lands_on_previewed_pane() {
        let vm = ViewModel::new();
        vm.apply_snapshot(two_sessions());

        assert!(vm.update_pane_capture(&PaneId::new("%1"), "hello"));
        assert!(!vm.update_pane_capture(&PaneId::new("%3"), "not visible"));

        let snapshot = vm.current_snapshot();
        assert_eq!(
            snapshot.find_pane(&PaneId::new("%1")).unwrap().capture.as_deref(),
            Some("hello")
        );
        assert!(snapshot.find_pane(&PaneId::new("%3")).unwrap().capture.is_none());

        // Survives the next poll
        vm.apply_snapshot(two_sessions());
        assert_eq!(
            vm.current_snapshot()
                .find_pane(&PaneId::new("%1"))
                .unwrap()
                .capture
                .as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_observers_and_readers() {
        let vm = ViewModel::new();
        let counter = Arc::new(Counter::default());
        vm.subscribe(counter.clone());
        let mut rx = vm.watch_selection();

        vm.apply_snapshot(two_sessions());
        assert_eq!(counter.snapshots.load(Ordering::SeqCst), 1);
        assert_eq!(counter.selections.load(Ordering::SeqCst), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().session, Some(SessionId::new("$A")));

        // Readers keep the value they loaded
        let held = vm.current_snapshot();
        vm.apply_snapshot(two_sessions());
        assert_eq!(counter.snapshots.load(Ordering::SeqCst), 1);
        assert!(!Arc::ptr_eq(&held, &vm.current_snapshot()));
        assert_eq!(held.seq, 1);

        vm.update_pane_capture(&PaneId::new("%1"), "x");
        assert_eq!(counter.previews.load(Ordering::SeqCst), 1);
        assert_eq!(held.find_pane(&PaneId::new("%1")).unwrap().capture, None);
    }

    #[test]
    fn test_health_and_status() {
        let vm = ViewModel::new();
        vm.set_health(PollHealth::Degraded {
            failures: 1,
            message: "boom".to_string(),
        });
        assert!(matches!(vm.current().health, PollHealth::Degraded { failures: 1, .. }));

        vm.set_status(StatusMessage::error("Select a session first."));
        let status = vm.current().status.clone().unwrap();
        assert!(status.is_error);
        assert_eq!(status.text, "Select a session first.");
    }
}
