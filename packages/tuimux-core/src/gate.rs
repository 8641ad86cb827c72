use std::sync::Arc;
use tokio::sync::watch;

/// Open/closed switch shared by the background tasks.
///
/// While an external tmux client owns the terminal the gate is closed, and the poller
/// and preview streamer wait here before issuing any new tmux call.
#[derive(Debug, Clone)]
pub struct ControlGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ControlGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlGate {
    /// A new, open gate
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    pub fn close(&self) {
        self.tx.send_replace(false);
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves immediately when open, otherwise once the gate reopens
    pub async fn wait_open(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|open| *open).await;
    }
}
