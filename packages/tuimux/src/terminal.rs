use crossterm::cursor::{Hide, Show};
use crossterm::event;
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::{Frame, Terminal};
use std::io::{self, stdout, Stdout};
use std::process::Command;
use std::time::Duration;
use tuimux_core::{ClientExit, HandoffRequest, TerminalHandoff};

/// Raw-mode alternate-screen terminal, restored on drop
pub struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    active: bool,
}

impl TerminalSession {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(stdout(), EnterAlternateScreen, Hide)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
        Ok(Self {
            terminal,
            active: true,
        })
    }

    pub fn draw(&mut self, render: impl FnOnce(&mut Frame)) -> io::Result<()> {
        self.terminal.draw(render).map(drop)
    }

    fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        execute!(stdout(), LeaveAlternateScreen, Show)
    }
}

impl TerminalHandoff for TerminalSession {
    fn suspend(&mut self) -> io::Result<()> {
        self.leave()
    }

    fn run_client(&mut self, request: &HandoffRequest) -> io::Result<ClientExit> {
        let status = Command::new(&request.program).args(&request.args).status()?;
        Ok(ClientExit {
            code: status.code(),
        })
    }

    fn resume(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        execute!(stdout(), EnterAlternateScreen, Hide)?;
        self.active = true;
        // Discard input typed while the client owned the terminal
        while event::poll(Duration::ZERO)? {
            event::read()?;
        }
        self.terminal.clear()
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}
