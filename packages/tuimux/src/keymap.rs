use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tuimux_core::ActionName;

/// What a key press means in the main view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Help,
    Dispatch(ActionName),
}

/// (keys, description) pairs, shown in `--help` and the help overlay
pub const BINDINGS: &[(&str, &str)] = &[
    ("enter", "attach / switch to session"),
    ("up/k down/j", "move selection"),
    ("tab", "switch between sessions and windows"),
    ("r", "refresh"),
    ("n", "new session"),
    ("e", "rename session"),
    ("x", "kill session"),
    ("c", "new window"),
    ("E", "rename window"),
    ("d", "kill window"),
    ("w", "select window in tmux"),
    ("v", "enter copy mode in previewed pane"),
    ("y", "copy tmux buffer to clipboard"),
    ("h ?", "toggle help"),
    ("q ctrl-c", "quit"),
];

pub const HELP: &str = "Keys:
  enter        attach / switch to session
  up/k down/j  move selection
  tab          switch between sessions and windows
  r            refresh
  n  e  x      new / rename / kill session
  c  E  d      new / rename / kill window
  w            select window in tmux
  v            enter copy mode in previewed pane
  y            copy tmux buffer to clipboard
  h  ?         toggle help
  q  ctrl-c    quit";

pub fn resolve(key: &KeyEvent) -> Option<KeyAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(KeyAction::Quit),
            _ => None,
        };
    }

    let action = match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return Some(KeyAction::Quit),
        KeyCode::Char('h') | KeyCode::Char('?') => return Some(KeyAction::Help),
        KeyCode::Enter => ActionName::Attach,
        KeyCode::Up | KeyCode::Char('k') => ActionName::SelectPrevious,
        KeyCode::Down | KeyCode::Char('j') => ActionName::SelectNext,
        KeyCode::Tab | KeyCode::BackTab => ActionName::ToggleFocus,
        KeyCode::Char('r') => ActionName::Refresh,
        KeyCode::Char('n') => ActionName::NewSession,
        KeyCode::Char('e') => ActionName::RenameSession,
        KeyCode::Char('x') => ActionName::KillSession,
        KeyCode::Char('c') => ActionName::NewWindow,
        KeyCode::Char('E') => ActionName::RenameWindow,
        KeyCode::Char('d') => ActionName::KillWindow,
        KeyCode::Char('w') => ActionName::SelectWindow,
        KeyCode::Char('v') => ActionName::CopyMode,
        KeyCode::Char('y') => ActionName::CopyBuffer,
        _ => return None,
    };
    Some(KeyAction::Dispatch(action))
}
