use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::warn;
use tuimux_core::Clipboard;

struct Request {
    text: String,
    reply: mpsc::Sender<Result<(), String>>,
}

/// System clipboard served from its own thread.
///
/// On X11 the copied text is only available while the owning `arboard::Clipboard`
/// is alive, so one instance lives for the whole session.
pub struct SystemClipboard {
    tx: mpsc::Sender<Request>,
}

impl SystemClipboard {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<Request>();
        let spawned = thread::Builder::new()
            .name("clipboard".to_string())
            .spawn(move || {
                let mut clipboard = arboard::Clipboard::new().map_err(|e| e.to_string());
                if let Err(e) = &clipboard {
                    warn!("Clipboard not available: {}", e);
                }
                for request in rx {
                    let result = match clipboard.as_mut() {
                        Ok(clipboard) => clipboard
                            .set_text(request.text)
                            .map_err(|e| format!("Failed to set clipboard text: {}", e)),
                        Err(e) => Err(e.clone()),
                    };
                    let _ = request.reply.send(result);
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to start clipboard thread: {}", e);
        }
        Self { tx }
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<(), String> {
        let (reply, response) = mpsc::channel();
        self.tx
            .send(Request {
                text: text.to_string(),
                reply,
            })
            .map_err(|_| "Clipboard not available".to_string())?;
        response
            .recv_timeout(Duration::from_secs(2))
            .map_err(|_| "Clipboard did not respond".to_string())?
    }
}
