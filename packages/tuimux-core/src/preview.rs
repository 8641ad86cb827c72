//! Preview streamer: captures the previewed pane at a modest rate.
//!
//! Only the active pane of the selected window is ever captured. Failures are
//! logged and otherwise ignored; the last good capture stays in place.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::config::CoreConfig;
use crate::executor::Executor;
use crate::gate::ControlGate;
use crate::view_model::ViewModel;

pub struct PreviewStreamer {
    executor: Executor,
    view: Arc<ViewModel>,
    gate: ControlGate,
    interval: Duration,
    history_lines: u32,
    max_bytes: usize,
}

impl PreviewStreamer {
    pub fn new(executor: Executor, view: Arc<ViewModel>, gate: ControlGate, config: &CoreConfig) -> Self {
        Self {
            executor,
            view,
            gate,
            interval: config.preview_interval,
            history_lines: config.preview_lines,
            max_bytes: config.preview_max_bytes,
        }
    }

    /// Capture the previewed pane once. Returns true if a new capture was stored.
    pub async fn capture_selected(&self) -> bool {
        let state = self.view.current();
        let Some(pane) = state.preview_pane() else {
            return false;
        };

        match self.executor.capture_pane(&pane.id, self.history_lines).await {
            Ok(raw) => {
                let rows = pane.height.saturating_add(self.history_lines);
                let text = render_preview(&raw, pane.width, rows, self.max_bytes);
                // Rejected by the view model if the selection moved meanwhile
                self.view.update_pane_capture(&pane.id, &text)
            }
            Err(e) => {
                debug!("Preview capture of {} failed: {}", pane.id, e);
                false
            }
        }
    }

    /// Runs until the task is aborted
    pub async fn run(self) {
        let mut selection = self.view.watch_selection();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = selection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    selection.borrow_and_update();
                    ticker.reset();
                }
            }
            self.gate.wait_open().await;
            self.capture_selected().await;
        }
    }
}

/// Turn raw `capture-pane -e` output into plain rows.
///
/// The text is fed through a terminal emulator of `width` x `rows`, trailing blank
/// rows are dropped, and only the last `max_bytes` bytes (whole lines) are kept.
pub fn render_preview(raw: &str, width: u32, rows: u32, max_bytes: usize) -> String {
    let width = width.clamp(1, u16::MAX as u32) as u16;
    let rows = rows.clamp(1, u16::MAX as u32) as u16;
    let mut parser = vt100::Parser::new(rows, width, 0);

    // capture-pane emits bare \n, which only moves the cursor down
    let normalized = raw.replace('\n', "\r\n");
    parser.process(normalized.as_bytes());

    let mut lines: Vec<String> = parser
        .screen()
        .rows(0, width)
        .map(|row| row.trim_end().to_string())
        .collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    keep_tail(&lines.join("\n"), max_bytes).to_string()
}

fn keep_tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    // Drop the partial first line
    match tail.find('\n') {
        Some(newline) => &tail[newline + 1..],
        None => tail,
    }
}
