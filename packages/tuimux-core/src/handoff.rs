//! Handing the terminal to a tmux client and taking it back.
//!
//! `Idle -> Suspending -> ExternalClientActive -> Resuming -> Idle`
//!
//! The flow is synchronous: the caller's input loop is blocked for the whole
//! `ExternalClientActive` phase, and only the client exiting moves it on.

use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::HandoffError;
use crate::gate::ControlGate;
use crate::poller::PollTrigger;
use crate::SessionId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum HandoffState {
    #[default]
    Idle,
    Suspending,
    ExternalClientActive,
    Resuming,
}

/// The client process to run while the terminal is handed off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub session: SessionId,
    pub program: String,
    pub args: Vec<String>,
}

impl HandoffRequest {
    /// `tmux [-L name] [-S path] attach-session -t $N`
    pub fn attach(session: &SessionId, config: &CoreConfig) -> Self {
        let mut args = config.server_args();
        args.extend([
            "attach-session".to_string(),
            "-t".to_string(),
            session.to_string(),
        ]);
        Self {
            session: session.clone(),
            program: config.tmux_binary.clone(),
            args,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientExit {
    /// None when the client was killed by a signal
    pub code: Option<i32>,
}

impl ClientExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Terminal operations needed for a handoff, implemented by the TUI shell
pub trait TerminalHandoff {
    /// Leave raw mode and the alternate screen
    fn suspend(&mut self) -> io::Result<()>;

    /// Spawn the client on the real terminal and wait for it to exit
    fn run_client(&mut self, request: &HandoffRequest) -> io::Result<ClientExit>;

    /// Re-enter raw mode and the alternate screen
    fn resume(&mut self) -> io::Result<()>;
}

/// Drives one handoff at a time, pausing background tmux traffic around it
pub struct AttachFlow {
    state: Mutex<HandoffState>,
    gate: ControlGate,
    trigger: PollTrigger,
}

impl AttachFlow {
    pub fn new(gate: ControlGate, trigger: PollTrigger) -> Self {
        Self {
            state: Mutex::new(HandoffState::Idle),
            gate,
            trigger,
        }
    }

    pub fn state(&self) -> HandoffState {
        *self.state.lock()
    }

    fn transition(&self, next: HandoffState) {
        let mut state = self.state.lock();
        debug!("Handoff {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Resuming side of the flow: reopen the gate, force a poll, back to Idle
    fn finish(&self) {
        self.gate.open();
        self.trigger.request();
        self.transition(HandoffState::Idle);
    }

    pub fn run(
        &self,
        terminal: &mut dyn TerminalHandoff,
        request: &HandoffRequest,
    ) -> Result<ClientExit, HandoffError> {
        {
            let mut state = self.state.lock();
            if *state != HandoffState::Idle {
                return Err(HandoffError::Busy);
            }
            *state = HandoffState::Suspending;
        }
        self.gate.close();

        if let Err(e) = terminal.suspend() {
            self.transition(HandoffState::Resuming);
            if let Err(resume) = terminal.resume() {
                warn!("Failed to restore terminal after aborted handoff: {}", resume);
            }
            self.finish();
            return Err(HandoffError::Suspend(e));
        }

        self.transition(HandoffState::ExternalClientActive);
        info!("Running {} {}", request.program, request.args.join(" "));
        let outcome = terminal.run_client(request);

        self.transition(HandoffState::Resuming);
        let resumed = terminal.resume();
        self.finish();

        let exit = outcome.map_err(HandoffError::Client)?;
        resumed.map_err(HandoffError::Resume)?;
        info!("tmux client exited with {:?}", exit.code);
        Ok(exit)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    /// Records every terminal call together with the flow state and gate at that moment
    pub(crate) struct RecordingTerminal {
        pub flow: Arc<AttachFlow>,
        pub gate: ControlGate,
        pub events: Vec<(&'static str, HandoffState, bool)>,
        pub fail_suspend: bool,
        pub fail_client: bool,
    }

    impl RecordingTerminal {
        pub fn new(flow: Arc<AttachFlow>, gate: ControlGate) -> Self {
            Self {
                flow,
                gate,
                events: Vec::new(),
                fail_suspend: false,
                fail_client: false,
            }
        }

        fn record(&mut self, event: &'static str) {
            self.events.push((event, self.flow.state(), self.gate.is_open()));
        }
    }

    impl TerminalHandoff for RecordingTerminal {
        fn suspend(&mut self) -> io::Result<()> {
            self.record("suspend");
            if self.fail_suspend {
                return Err(io::Error::other("no tty"));
            }
            Ok(())
        }

        fn run_client(&mut self, _request: &HandoffRequest) -> io::Result<ClientExit> {
            self.record("client");
            if self.fail_client {
                return Err(io::Error::new(io::ErrorKind::NotFound, "tmux not found"));
            }
            Ok(ClientExit { code: Some(0) })
        }

        fn resume(&mut self) -> io::Result<()> {
            self.record("resume");
            Ok(())
        }
    }

    fn flow() -> (Arc<AttachFlow>, ControlGate, PollTrigger) {
        let gate = ControlGate::new();
        let trigger = PollTrigger::new();
        let flow = Arc::new(AttachFlow::new(gate.clone(), trigger.clone()));
        (flow, gate, trigger)
    }

    fn request() -> HandoffRequest {
        HandoffRequest::attach(&SessionId::new("$1"), &CoreConfig::default())
    }

    #[test]
    fn test_attach_request_args() {
        let config = CoreConfig {
            socket_name: Some("work".to_string()),
            ..Default::default()
        };
        let request = HandoffRequest::attach(&SessionId::new("$3"), &config);
        assert_eq!(request.program, "tmux");
        assert_eq!(request.args, vec!["-L", "work", "attach-session", "-t", "$3"]);
    }

    #[test]
    fn test_handoff_sequence() {
        let (flow, gate, _trigger) = flow();
        let mut terminal = RecordingTerminal::new(flow.clone(), gate.clone());

        let exit = flow.run(&mut terminal, &request()).unwrap();
        assert!(exit.success());
        assert_eq!(
            terminal.events,
            vec![
                ("suspend", HandoffState::Suspending, false),
                ("client", HandoffState::ExternalClientActive, false),
                ("resume", HandoffState::Resuming, false),
            ]
        );
        assert_eq!(flow.state(), HandoffState::Idle);
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn test_resume_forces_poll() {
        let (flow, gate, trigger) = flow();
        let mut terminal = RecordingTerminal::new(flow.clone(), gate);
        flow.run(&mut terminal, &request()).unwrap();

        // The stored permit makes this resolve at once
        tokio::time::timeout(std::time::Duration::from_secs(1), trigger.requested())
            .await
            .unwrap();
    }

    #[test]
    fn test_failed_client_still_resumes() {
        let (flow, gate, _trigger) = flow();
        let mut terminal = RecordingTerminal::new(flow.clone(), gate.clone());
        terminal.fail_client = true;

        let err = flow.run(&mut terminal, &request()).unwrap_err();
        assert!(matches!(err, HandoffError::Client(_)));
        let names: Vec<&str> = terminal.events.iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["suspend", "client", "resume"]);
        assert_eq!(flow.state(), HandoffState::Idle);
        assert!(gate.is_open());
    }

    #[test]
    fn test_failed_suspend_never_runs_client() {
        let (flow, gate, _trigger) = flow();
        let mut terminal = RecordingTerminal::new(flow.clone(), gate.clone());
        terminal.fail_suspend = true;

        let err = flow.run(&mut terminal, &request()).unwrap_err();
        assert!(matches!(err, HandoffError::Suspend(_)));
        let names: Vec<&str> = terminal.events.iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["suspend", "resume"]);
        assert!(gate.is_open());
    }

    #[test]
    fn test_second_handoff_is_busy() {
        let (flow, gate, _trigger) = flow();
        flow.transition(HandoffState::ExternalClientActive);
        let mut terminal = RecordingTerminal::new(flow.clone(), gate);

        assert!(matches!(
            flow.run(&mut terminal, &request()),
            Err(HandoffError::Busy)
        ));
        assert!(terminal.events.is_empty());
    }
}
