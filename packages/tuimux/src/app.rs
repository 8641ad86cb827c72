use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tuimux_core::{
    ActionContext, ActionName, ChangeSet, HandoffRequest, Outcome, PaneId, Runtime, Selection,
    Snapshot, ViewObserver,
};

use crate::keymap::{self, KeyAction};
use crate::render;
use crate::terminal::TerminalSession;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Line editor for actions that need a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub action: ActionName,
    pub title: &'static str,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Help,
    Prompt(Prompt),
    ConfirmAttach(HandoffRequest),
}

/// Marks the screen dirty on any view change
#[derive(Default)]
struct Repaint(AtomicBool);

impl Repaint {
    fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl ViewObserver for Repaint {
    fn on_snapshot_changed(&self, _snapshot: &Arc<Snapshot>, _changes: &ChangeSet) {
        self.request();
    }

    fn on_selection_changed(&self, _selection: &Selection) {
        self.request();
    }

    fn on_preview_changed(&self, _pane: &PaneId) {
        self.request();
    }

    fn on_status_changed(&self) {
        self.request();
    }
}

enum Step {
    Continue,
    Quit,
}

struct App<'a> {
    runtime: &'a Runtime,
    handle: Handle,
    mode: Mode,
}

impl App<'_> {
    fn dispatch(&self, action: ActionName, context: &ActionContext) -> Outcome {
        self.handle
            .block_on(self.runtime.dispatcher().dispatch(action, context))
    }

    fn open_prompt(&mut self, action: ActionName) {
        let state = self.runtime.view().current();
        let (title, input) = match action {
            ActionName::NewSession => ("New session name", String::new()),
            ActionName::NewWindow => ("New window name", String::new()),
            ActionName::RenameSession => match state.selected_session() {
                Some(s) => ("Rename session", s.name.clone()),
                // Let the dispatcher report the missing selection
                None => return self.run_action(action, &ActionContext::default()),
            },
            ActionName::RenameWindow => match state.selected_window() {
                Some(w) => ("Rename window", w.name.clone()),
                None => return self.run_action(action, &ActionContext::default()),
            },
            _ => return,
        };
        self.mode = Mode::Prompt(Prompt {
            action,
            title,
            input,
        });
    }

    fn run_action(&mut self, action: ActionName, context: &ActionContext) {
        self.mode = match self.dispatch(action, context) {
            Outcome::Handoff(request) => Mode::ConfirmAttach(request),
            _ => Mode::Normal,
        };
    }

    fn on_key(&mut self, key: KeyEvent, terminal: &mut TerminalSession) -> Step {
        match &mut self.mode {
            Mode::Help => {
                self.mode = Mode::Normal;
                Step::Continue
            }
            Mode::Prompt(prompt) => {
                match key.code {
                    KeyCode::Esc => self.mode = Mode::Normal,
                    KeyCode::Enter => {
                        let action = prompt.action;
                        let context = ActionContext::with_input(prompt.input.clone());
                        self.run_action(action, &context);
                    }
                    KeyCode::Backspace => {
                        prompt.input.pop();
                    }
                    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                        prompt.input.push(c);
                    }
                    _ => {}
                }
                Step::Continue
            }
            Mode::ConfirmAttach(request) => {
                match key.code {
                    KeyCode::Enter | KeyCode::Char('y') => {
                        let request = request.clone();
                        self.mode = Mode::Normal;
                        self.runtime
                            .dispatcher()
                            .complete_handoff(terminal, &request);
                    }
                    KeyCode::Esc | KeyCode::Char('n') => self.mode = Mode::Normal,
                    _ => {}
                }
                Step::Continue
            }
            Mode::Normal => match keymap::resolve(&key) {
                Some(KeyAction::Quit) => Step::Quit,
                Some(KeyAction::Help) => {
                    self.mode = Mode::Help;
                    Step::Continue
                }
                Some(KeyAction::Dispatch(action)) if action.takes_input() => {
                    self.open_prompt(action);
                    Step::Continue
                }
                Some(KeyAction::Dispatch(action)) => {
                    self.run_action(action, &ActionContext::default());
                    Step::Continue
                }
                None => Step::Continue,
            },
        }
    }
}

/// Blocking UI loop. Call from a thread that may block (`block_in_place`).
pub fn run(runtime: &Runtime) -> Result<(), String> {
    let mut terminal =
        TerminalSession::enter().map_err(|err| format!("failed to set up terminal: {err}"))?;
    let repaint = Arc::new(Repaint::default());
    runtime.view().subscribe(repaint.clone());

    let mut app = App {
        runtime,
        handle: Handle::current(),
        mode: Mode::Normal,
    };
    repaint.request();

    loop {
        if repaint.take() {
            let state = runtime.view().current();
            terminal
                .draw(|frame| render::draw(frame, &state, &app.mode))
                .map_err(|err| format!("failed to draw: {err}"))?;
        }

        if !event::poll(INPUT_POLL).map_err(|err| format!("failed to poll input: {err}"))? {
            continue;
        }
        match event::read().map_err(|err| format!("failed to read input: {err}"))? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if let Step::Quit = app.on_key(key, &mut terminal) {
                    return Ok(());
                }
                repaint.request();
            }
            Event::Resize(..) => repaint.request(),
            _ => {}
        }
    }
}
