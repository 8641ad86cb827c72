//! State poller: builds complete snapshots from tmux and feeds the view model.
//!
//! A single task owns the poll loop, so at most one poll is ever in flight. Triggers
//! that arrive while a poll runs collapse into one follow-up poll.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CoreConfig;
use crate::error::ExecutionError;
use crate::executor::{Executor, PaneRecord, WindowRecord};
use crate::gate::ControlGate;
use crate::view_model::{PollHealth, ViewModel};
use crate::{Pane, Session, SessionId, Snapshot, Window, WindowId};

/// Lists sessions, then windows, then panes, with bounded fan-out
pub struct StatePoller {
    executor: Executor,
    max_concurrency: usize,
    seq: AtomicU64,
}

impl StatePoller {
    pub fn new(executor: Executor, max_concurrency: usize) -> Self {
        Self {
            executor,
            max_concurrency: max_concurrency.max(1),
            seq: AtomicU64::new(0),
        }
    }

    /// One full poll. Any failing sub-call fails the whole poll; nothing partial escapes.
    pub async fn poll(&self) -> Result<Snapshot, ExecutionError> {
        let sessions = self.executor.list_sessions().await?;

        // Owned ids keep the fan-out futures 'static so the loop can be spawned
        let session_ids: Vec<SessionId> = sessions.iter().map(|s| s.id.clone()).collect();
        let windows: Vec<Vec<WindowRecord>> = stream::iter(session_ids)
            .map(|id| {
                let executor = self.executor.clone();
                async move { executor.list_windows(&id).await }
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        let window_ids: Vec<WindowId> = windows.iter().flatten().map(|w| w.id.clone()).collect();
        let panes: Vec<Vec<PaneRecord>> = stream::iter(window_ids)
            .map(|id| {
                let executor = self.executor.clone();
                async move { executor.list_panes(&id).await }
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        let mut panes = panes.into_iter();
        let mut assembled = Vec::with_capacity(sessions.len());
        for (record, windows) in sessions.into_iter().zip(windows) {
            let mut session = Session {
                id: record.id,
                name: record.name,
                attached: record.attached,
                created: record.created,
                windows: Vec::with_capacity(windows.len()),
            };
            for window in windows {
                session
                    .windows
                    .push(build_window(window, panes.next().unwrap_or_default()));
            }
            assembled.push(session);
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Poll {} assembled {} sessions", seq, assembled.len());
        Ok(Snapshot::new(seq, assembled))
    }
}

/// The active pane is the one tmux flags, else the first pane.
fn build_window(record: WindowRecord, panes: Vec<PaneRecord>) -> Window {
    let panes: Vec<Pane> = panes
        .into_iter()
        .map(|p| Pane {
            id: p.id,
            index: p.index,
            width: p.width,
            height: p.height,
            active: p.active,
            command: p.command,
            capture: None,
        })
        .collect();
    let active_pane = panes
        .iter()
        .find(|p| p.active)
        .or_else(|| panes.first())
        .map(|p| p.id.clone());
    Window {
        id: record.id,
        index: record.index,
        name: record.name,
        active: record.active,
        active_pane,
        panes,
    }
}

/// Requests an immediate poll. Requests made while a poll runs coalesce into one.
#[derive(Debug, Clone, Default)]
pub struct PollTrigger {
    notify: Arc<Notify>,
}

impl PollTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn requested(&self) {
        self.notify.notified().await
    }
}

/// Counters exposed for tests and diagnostics
#[derive(Debug, Default)]
pub struct PollStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl PollStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Periodic poll task
pub struct PollLoop {
    poller: StatePoller,
    view: Arc<ViewModel>,
    gate: ControlGate,
    trigger: PollTrigger,
    interval: Duration,
    escalate_after: u32,
    stats: Arc<PollStats>,
    failures: u32,
}

impl PollLoop {
    pub fn new(
        poller: StatePoller,
        view: Arc<ViewModel>,
        gate: ControlGate,
        trigger: PollTrigger,
        config: &CoreConfig,
    ) -> Self {
        Self {
            poller,
            view,
            gate,
            trigger,
            interval: config.poll_interval,
            escalate_after: config.escalate_after.max(1),
            stats: Arc::new(PollStats::default()),
            failures: 0,
        }
    }

    pub fn stats(&self) -> Arc<PollStats> {
        self.stats.clone()
    }

    /// Poll once and publish the outcome. Returns true if a snapshot was applied.
    pub async fn run_once(&mut self) -> bool {
        match self.poller.poll().await {
            Ok(snapshot) => {
                if self.failures > 0 {
                    info!("tmux polling recovered after {} failures", self.failures);
                }
                self.failures = 0;
                self.view.apply_snapshot(snapshot);
                self.view.set_health(PollHealth::Healthy);
                self.stats.completed.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(e) => {
                self.failures += 1;
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                let message = e.user_message();
                let health = if self.failures >= self.escalate_after {
                    if self.failures == self.escalate_after {
                        error!("tmux polling failed {} times in a row: {}", self.failures, e);
                    }
                    PollHealth::Failing {
                        failures: self.failures,
                        message,
                    }
                } else {
                    warn!("Poll failed ({} in a row): {}", self.failures, e);
                    PollHealth::Degraded {
                        failures: self.failures,
                        message,
                    }
                };
                self.view.set_health(health);
                false
            }
        }
    }

    /// Runs until the task is aborted. The first periodic poll comes one interval
    /// after start; callers poll once up front.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.requested() => {
                    ticker.reset();
                }
            }
            self.gate.wait_open().await;
            self.run_once().await;
        }
    }
}
