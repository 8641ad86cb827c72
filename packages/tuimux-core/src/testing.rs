//! In-memory stand-in for a tmux server, driven through the same argv vectors the
//! executor sends to the real binary.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{ExecutionError, ExitInfo};
use crate::executor::{render_command, CommandRunner, FIELD_DELIM};

#[derive(Debug, Clone)]
struct FakePane {
    id: u32,
    active: bool,
    command: String,
    content: String,
}

#[derive(Debug, Clone)]
struct FakeWindow {
    id: u32,
    index: u32,
    name: String,
    active: bool,
    panes: Vec<FakePane>,
}

#[derive(Debug, Clone)]
struct FakeSession {
    id: u32,
    name: String,
    created: u64,
    windows: Vec<FakeWindow>,
}

#[derive(Debug, Default)]
struct FakeServer {
    sessions: Vec<FakeSession>,
    next_session: u32,
    next_window: u32,
    next_pane: u32,
    clock: u64,
    buffer: Option<String>,
    copy_mode: Vec<u32>,
    switched_to: Vec<String>,
}

#[derive(Debug)]
struct Failure {
    subcommand: String,
    remaining: Option<usize>,
    stderr: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct Concurrency {
    current: usize,
    max: usize,
}

/// Fake tmux server implementing [`CommandRunner`]
#[derive(Default)]
pub(crate) struct FakeTmux {
    server: Mutex<FakeServer>,
    calls: Mutex<Vec<Vec<String>>>,
    failures: Mutex<Vec<Failure>>,
    holds: Mutex<HashMap<String, Arc<Semaphore>>>,
    delay: Mutex<Option<Duration>>,
    concurrency: Mutex<HashMap<String, Concurrency>>,
}

struct InFlight<'a> {
    fake: &'a FakeTmux,
    subcommand: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut concurrency = self.fake.concurrency.lock();
        for key in [self.subcommand.as_str(), "*"] {
            if let Some(entry) = concurrency.get_mut(key) {
                entry.current -= 1;
            }
        }
    }
}

impl FakeTmux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session whose windows each hold a single pane
    pub fn with_session(self, name: &str, windows: &[&str]) -> Self {
        {
            let mut server = self.server.lock();
            let id = server.create_session(name);
            if let Some((first, rest)) = windows.split_first() {
                for name in rest {
                    server.create_window(id, Some(name));
                }
                if let Some(session) = server.sessions.iter_mut().find(|s| s.id == id) {
                    for (i, window) in session.windows.iter_mut().enumerate() {
                        window.active = i == 0;
                    }
                    session.windows[0].name = first.to_string();
                }
            }
        }
        self
    }

    /// Split a window: adds a pane that becomes the active one
    pub fn split(&self, window_id: &str) {
        let mut server = self.server.lock();
        let pane_id = server.next_pane;
        server.next_pane += 1;
        if let Some(window) = server.window_mut(window_id) {
            for pane in &mut window.panes {
                pane.active = false;
            }
            window.panes.push(FakePane {
                id: pane_id,
                active: true,
                command: "bash".to_string(),
                content: String::new(),
            });
        }
    }

    pub fn set_pane_content(&self, pane_id: &str, content: &str) {
        let mut server = self.server.lock();
        if let Some(pane) = server.pane_mut(pane_id) {
            pane.content = content.to_string();
        }
    }

    pub fn set_buffer(&self, text: &str) {
        self.server.lock().buffer = Some(text.to_string());
    }

    /// Remove a session behind the core's back
    pub fn remove_session(&self, name: &str) {
        self.server.lock().sessions.retain(|s| s.name != name);
    }

    pub fn session_names(&self) -> Vec<String> {
        self.server.lock().sessions.iter().map(|s| s.name.clone()).collect()
    }

    pub fn in_copy_mode(&self, pane_id: &str) -> bool {
        let server = self.server.lock();
        parse_id(pane_id, '%').is_some_and(|id| server.copy_mode.contains(&id))
    }

    pub fn switched_to(&self) -> Vec<String> {
        self.server.lock().switched_to.clone()
    }

    /// Fail every call of `subcommand` until [`FakeTmux::clear_failures`]
    pub fn fail(&self, subcommand: &str, stderr: &str) {
        self.failures.lock().push(Failure {
            subcommand: subcommand.to_string(),
            remaining: None,
            stderr: stderr.to_string(),
        });
    }

    /// Fail the next `times` calls of `subcommand`
    pub fn fail_times(&self, subcommand: &str, times: usize, stderr: &str) {
        self.failures.lock().push(Failure {
            subcommand: subcommand.to_string(),
            remaining: Some(times),
            stderr: stderr.to_string(),
        });
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Calls of `subcommand` block until permits are added to the returned semaphore
    pub fn hold(&self, subcommand: &str) -> Arc<Semaphore> {
        let semaphore = Arc::new(Semaphore::new(0));
        self.holds
            .lock()
            .insert(subcommand.to_string(), semaphore.clone());
        semaphore
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, subcommand: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some(subcommand))
            .count()
    }

    /// Highest number of simultaneous calls of `subcommand` ("*" for any)
    pub fn max_concurrent(&self, subcommand: &str) -> usize {
        self.concurrency
            .lock()
            .get(subcommand)
            .map(|c| c.max)
            .unwrap_or(0)
    }

    fn enter(&self, subcommand: &str) -> InFlight<'_> {
        let mut concurrency = self.concurrency.lock();
        for key in [subcommand, "*"] {
            let entry = concurrency.entry(key.to_string()).or_default();
            entry.current += 1;
            entry.max = entry.max.max(entry.current);
        }
        InFlight {
            fake: self,
            subcommand: subcommand.to_string(),
        }
    }

    fn injected_failure(&self, subcommand: &str) -> Option<String> {
        let mut failures = self.failures.lock();
        let failure = failures.iter_mut().find(|f| {
            f.subcommand == subcommand && f.remaining.map_or(true, |n| n > 0)
        })?;
        if let Some(n) = failure.remaining.as_mut() {
            *n -= 1;
        }
        Some(failure.stderr.clone())
    }

    async fn invoke(&self, args: &[String]) -> Result<String, ExecutionError> {
        self.calls.lock().push(args.to_vec());
        let subcommand = args.first().cloned().unwrap_or_default();
        let _in_flight = self.enter(&subcommand);

        let hold = self.holds.lock().get(&subcommand).cloned();
        if let Some(semaphore) = hold {
            if let Ok(permit) = semaphore.acquire().await {
                permit.forget();
            }
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let command = render_command("tmux", args);
        if let Some(stderr) = self.injected_failure(&subcommand) {
            return Err(ExecutionError::new(command, ExitInfo::Code(1), stderr));
        }
        self.server
            .lock()
            .apply(args)
            .map_err(|stderr| ExecutionError::new(command, ExitInfo::Code(1), stderr))
    }
}

impl CommandRunner for FakeTmux {
    fn run<'a>(&'a self, args: &'a [String]) -> BoxFuture<'a, Result<String, ExecutionError>> {
        Box::pin(self.invoke(args))
    }
}

fn parse_id(id: &str, sigil: char) -> Option<u32> {
    id.strip_prefix(sigil)?.parse().ok()
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn positional(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

impl FakeServer {
    fn create_session(&mut self, name: &str) -> u32 {
        let id = self.next_session;
        self.next_session += 1;
        self.clock += 1;
        self.sessions.push(FakeSession {
            id,
            name: name.to_string(),
            created: 1_700_000_000 + self.clock,
            windows: Vec::new(),
        });
        self.create_window(id, None);
        id
    }

    fn create_window(&mut self, session: u32, name: Option<&str>) {
        let window_id = self.next_window;
        let pane_id = self.next_pane;
        self.next_window += 1;
        self.next_pane += 1;
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == session) {
            let index = session.windows.iter().map(|w| w.index + 1).max().unwrap_or(0);
            for window in &mut session.windows {
                window.active = false;
            }
            session.windows.push(FakeWindow {
                id: window_id,
                index,
                name: name.unwrap_or("bash").to_string(),
                active: true,
                panes: vec![FakePane {
                    id: pane_id,
                    active: true,
                    command: "bash".to_string(),
                    content: String::new(),
                }],
            });
        }
    }

    fn session_mut(&mut self, target: &str) -> Option<&mut FakeSession> {
        let id = parse_id(target.trim_end_matches(':'), '$')?;
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn window_mut(&mut self, target: &str) -> Option<&mut FakeWindow> {
        let id = parse_id(target, '@')?;
        self.sessions
            .iter_mut()
            .flat_map(|s| s.windows.iter_mut())
            .find(|w| w.id == id)
    }

    fn pane_mut(&mut self, target: &str) -> Option<&mut FakePane> {
        let id = parse_id(target, '%')?;
        self.sessions
            .iter_mut()
            .flat_map(|s| s.windows.iter_mut())
            .flat_map(|w| w.panes.iter_mut())
            .find(|p| p.id == id)
    }

    fn apply(&mut self, args: &[String]) -> Result<String, String> {
        let subcommand = args.first().map(String::as_str).unwrap_or_default();
        let target = flag(args, "-t").unwrap_or_default().to_string();

        match subcommand {
            "list-sessions" => {
                if self.sessions.is_empty() {
                    return Err("no server running on /tmp/tmux-1000/default".to_string());
                }
                let mut out = String::new();
                for s in &self.sessions {
                    let fields = [
                        format!("${}", s.id),
                        s.windows.len().to_string(),
                        "0".to_string(),
                        s.created.to_string(),
                        s.name.clone(),
                    ];
                    out.push_str(&fields.join(FIELD_DELIM));
                    out.push('\n');
                }
                Ok(out)
            }
            "list-windows" => {
                let session = self
                    .session_mut(&target)
                    .ok_or_else(|| format!("can't find session: {}", target))?;
                let mut out = String::new();
                for w in &session.windows {
                    let fields = [
                        format!("@{}", w.id),
                        w.index.to_string(),
                        if w.active { "1" } else { "0" }.to_string(),
                        w.name.clone(),
                    ];
                    out.push_str(&fields.join(FIELD_DELIM));
                    out.push('\n');
                }
                Ok(out)
            }
            "list-panes" => {
                let window = self
                    .window_mut(&target)
                    .ok_or_else(|| format!("can't find window: {}", target))?;
                let mut out = String::new();
                for (i, p) in window.panes.iter().enumerate() {
                    let fields = [
                        format!("%{}", p.id),
                        i.to_string(),
                        "80".to_string(),
                        "24".to_string(),
                        if p.active { "1" } else { "0" }.to_string(),
                        p.command.clone(),
                    ];
                    out.push_str(&fields.join(FIELD_DELIM));
                    out.push('\n');
                }
                Ok(out)
            }
            "new-session" => {
                let name = match flag(args, "-s") {
                    Some(name) => name.to_string(),
                    None => self.next_session.to_string(),
                };
                if self.sessions.iter().any(|s| s.name == name) {
                    return Err(format!("duplicate session: {}", name));
                }
                self.create_session(&name);
                Ok(String::new())
            }
            "kill-session" => {
                let id = parse_id(&target, '$');
                let before = self.sessions.len();
                self.sessions.retain(|s| Some(s.id) != id);
                if self.sessions.len() == before {
                    return Err(format!("can't find session: {}", target));
                }
                Ok(String::new())
            }
            "rename-session" => {
                let name = positional(args).unwrap_or_default().to_string();
                let session = self
                    .session_mut(&target)
                    .ok_or_else(|| format!("can't find session: {}", target))?;
                session.name = name;
                Ok(String::new())
            }
            "new-window" => {
                let id = self
                    .session_mut(&target)
                    .map(|s| s.id)
                    .ok_or_else(|| format!("can't find session: {}", target))?;
                let name = flag(args, "-n").map(str::to_string);
                self.create_window(id, name.as_deref());
                Ok(String::new())
            }
            "kill-window" => {
                let id = parse_id(&target, '@');
                let session = self
                    .sessions
                    .iter_mut()
                    .find(|s| s.windows.iter().any(|w| Some(w.id) == id))
                    .ok_or_else(|| format!("can't find window: {}", target))?;
                let was_active = session.windows.iter().any(|w| Some(w.id) == id && w.active);
                session.windows.retain(|w| Some(w.id) != id);
                if was_active {
                    if let Some(first) = session.windows.first_mut() {
                        first.active = true;
                    }
                }
                self.sessions.retain(|s| !s.windows.is_empty());
                Ok(String::new())
            }
            "rename-window" => {
                let name = positional(args).unwrap_or_default().to_string();
                let window = self
                    .window_mut(&target)
                    .ok_or_else(|| format!("can't find window: {}", target))?;
                window.name = name;
                Ok(String::new())
            }
            "select-window" => {
                let id = parse_id(&target, '@');
                let session = self
                    .sessions
                    .iter_mut()
                    .find(|s| s.windows.iter().any(|w| Some(w.id) == id))
                    .ok_or_else(|| format!("can't find window: {}", target))?;
                for window in &mut session.windows {
                    window.active = Some(window.id) == id;
                }
                Ok(String::new())
            }
            "switch-client" => {
                self.session_mut(&target)
                    .ok_or_else(|| format!("can't find session: {}", target))?;
                self.switched_to.push(target);
                Ok(String::new())
            }
            "capture-pane" => self
                .pane_mut(&target)
                .map(|p| p.content.clone())
                .ok_or_else(|| format!("can't find pane: {}", target)),
            "copy-mode" => {
                let id = self
                    .pane_mut(&target)
                    .map(|p| p.id)
                    .ok_or_else(|| format!("can't find pane: {}", target))?;
                self.copy_mode.push(id);
                Ok(String::new())
            }
            "show-buffer" => self.buffer.clone().ok_or_else(|| "no buffers".to_string()),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

/// Poll `cond` until it holds, panicking after two seconds
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
