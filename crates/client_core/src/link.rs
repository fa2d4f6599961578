//! Explicit connection context for the command side of the duplex channel,
//! plus the reconnect backoff policy used by the supervisor.

use std::time::Duration;

use shared::protocol::CommandFrame;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Open,
}

struct LinkInner {
    state: LinkState,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

/// Shared handle to the hub socket's write side.
///
/// Dispatch contract: a command is serialized and pushed iff the link is
/// `Open`; otherwise the call is a silent no-op. No queueing, no retry.
pub struct CommandLink {
    inner: Mutex<LinkInner>,
}

impl CommandLink {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                state: LinkState::Disconnected,
                outbound: None,
            }),
        }
    }

    pub async fn state(&self) -> LinkState {
        self.inner.lock().await.state
    }

    pub(crate) async fn set_connecting(&self) {
        let mut guard = self.inner.lock().await;
        guard.state = LinkState::Connecting;
        guard.outbound = None;
    }

    pub(crate) async fn open(&self, outbound: mpsc::UnboundedSender<Message>) {
        let mut guard = self.inner.lock().await;
        guard.state = LinkState::Open;
        guard.outbound = Some(outbound);
    }

    pub(crate) async fn close(&self) {
        let mut guard = self.inner.lock().await;
        guard.state = LinkState::Disconnected;
        guard.outbound = None;
    }

    /// Returns true iff the command was handed to the socket writer.
    pub async fn send_command(&self, command: &str) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.state != LinkState::Open {
            debug!(command, state = ?guard.state, "link not open; command dropped");
            return false;
        }
        let Some(outbound) = guard.outbound.as_ref() else {
            debug!(command, "link has no writer; command dropped");
            return false;
        };

        let frame = match serde_json::to_string(&CommandFrame::new(command)) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(command, "failed to encode command frame: {err}");
                return false;
            }
        };

        if outbound.send(Message::Text(frame)).is_err() {
            // Writer task is gone; the supervisor will notice and reconnect.
            guard.state = LinkState::Disconnected;
            guard.outbound = None;
            debug!(command, "link writer gone; command dropped");
            return false;
        }

        true
    }
}

/// Capped exponential delay between reconnect attempts, reset by the
/// supervisor on every successful connect.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (1-based): doubles from
    /// `initial`, capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial.saturating_mul(1u32 << exponent).min(self.max)
    }
}
