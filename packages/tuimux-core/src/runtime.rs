use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::CoreConfig;
use crate::dispatcher::{AttachMode, Clipboard, Dispatcher};
use crate::error::{ExecutionError, StartupError};
use crate::executor::{CommandRunner, Executor, TmuxRunner};
use crate::gate::ControlGate;
use crate::handoff::AttachFlow;
use crate::poller::{PollLoop, PollStats, PollTrigger, StatePoller};
use crate::preview::PreviewStreamer;
use crate::view_model::{StatusMessage, ViewModel};
use crate::Snapshot;

/// The running core: view model, dispatcher and the two background tasks.
///
/// Background tasks are aborted when the runtime is dropped.
pub struct Runtime {
    view: Arc<ViewModel>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<PollStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Start against the real tmux binary
    pub async fn start(config: CoreConfig, clipboard: Arc<dyn Clipboard>) -> Result<Self, StartupError> {
        let runner = Arc::new(TmuxRunner::new(&config));
        Self::start_with_runner(config, runner, clipboard, AttachMode::detect()).await
    }

    /// Polls once up front; failing to reach tmux at all is a startup error.
    pub async fn start_with_runner(
        config: CoreConfig,
        runner: Arc<dyn CommandRunner>,
        clipboard: Arc<dyn Clipboard>,
        attach_mode: AttachMode,
    ) -> Result<Self, StartupError> {
        let executor = Executor::new(runner);
        let view = Arc::new(ViewModel::new());
        let gate = ControlGate::new();
        let trigger = PollTrigger::new();
        let poller = StatePoller::new(executor.clone(), config.max_concurrency);

        let snapshot = poller.poll().await.map_err(StartupError::ControlChannel)?;
        info!("Connected to tmux, {} sessions", snapshot.sessions.len());
        let status = if snapshot.is_empty() {
            "No tmux sessions found."
        } else {
            "Loaded tmux sessions."
        };
        view.apply_snapshot(snapshot);
        view.set_status(StatusMessage::info(status));

        let poll_loop = PollLoop::new(poller, view.clone(), gate.clone(), trigger.clone(), &config);
        let stats = poll_loop.stats();
        let streamer = PreviewStreamer::new(executor.clone(), view.clone(), gate.clone(), &config);
        let flow = Arc::new(AttachFlow::new(gate, trigger.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            executor,
            view.clone(),
            trigger,
            flow,
            clipboard,
            attach_mode,
            config,
        ));

        let tasks = vec![tokio::spawn(poll_loop.run()), tokio::spawn(streamer.run())];

        Ok(Self {
            view,
            dispatcher,
            stats,
            tasks,
        })
    }

    pub fn view(&self) -> &Arc<ViewModel> {
        &self.view
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn poll_stats(&self) -> Arc<PollStats> {
        self.stats.clone()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A single poll against the real tmux binary, no background tasks
pub async fn poll_once(config: &CoreConfig) -> Result<Snapshot, ExecutionError> {
    let executor = Executor::new(Arc::new(TmuxRunner::new(config)));
    StatePoller::new(executor, config.max_concurrency).poll().await
}
