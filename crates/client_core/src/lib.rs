use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use shared::{
    domain::{ChannelId, SwitchAction},
    protocol::{
        classify_frame, ChannelDescriptor, DescriptorResponse, InboundFrame,
    },
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

pub mod link;
pub mod panel;

pub use link::{BackoffPolicy, CommandLink, LinkState};
pub use panel::{AckOutcome, ControlBinding, ControlPanel, ControlState};

/// Source of the hub's channel descriptors. The production impl fetches
/// `GET <base>/api`; tests substitute fakes.
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn fetch_descriptors(&self) -> Result<Vec<ChannelDescriptor>>;
}

#[derive(Debug, Error)]
pub enum DescriptorFetchError {
    #[error("descriptor request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("descriptor endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("descriptor body is not a channel listing: {0}")]
    MalformedBody(#[source] reqwest::Error),
}

pub struct HttpDescriptorSource {
    http: Client,
    base_url: String,
}

impl HttpDescriptorSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DescriptorSource for HttpDescriptorSource {
    async fn fetch_descriptors(&self) -> Result<Vec<ChannelDescriptor>> {
        let response = self
            .http
            .get(format!("{}/api", self.base_url))
            .send()
            .await
            .map_err(DescriptorFetchError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DescriptorFetchError::Status(status).into());
        }

        let body: DescriptorResponse = response
            .json()
            .await
            .map_err(DescriptorFetchError::MalformedBody)?;
        Ok(body.commands)
    }
}

/// Why a full panel resync was triggered by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncReason {
    /// Inbound frame was not valid JSON.
    MalformedFrame,
    /// Inbound frame was valid JSON but not an ack envelope.
    UnknownShape,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    LinkStateChanged(LinkState),
    PanelRebuilt { channels: Vec<ChannelId> },
    ControlUpdated { id: ChannelId, reading: String },
    ResyncStarted { reason: ResyncReason },
    Error(String),
}

pub struct HubClient {
    base_url: String,
    descriptors: Arc<dyn DescriptorSource>,
    link: CommandLink,
    backoff: BackoffPolicy,
    inner: Mutex<HubClientState>,
    events: broadcast::Sender<ClientEvent>,
}

struct HubClientState {
    panel: ControlPanel,
    link_started: bool,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Arc<Self> {
        let base_url = base_url.into();
        let descriptors = Arc::new(HttpDescriptorSource::new(base_url.clone()));
        Self::new_with_descriptor_source(base_url, descriptors)
    }

    pub fn new_with_descriptor_source(
        base_url: impl Into<String>,
        descriptors: Arc<dyn DescriptorSource>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            base_url: base_url.into(),
            descriptors,
            link: CommandLink::new(),
            backoff: BackoffPolicy::default(),
            inner: Mutex::new(HubClientState {
                panel: ControlPanel::default(),
                link_started: false,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn link_state(&self) -> LinkState {
        self.link.state().await
    }

    pub async fn panel_snapshot(&self) -> Vec<ControlBinding> {
        self.inner.lock().await.panel.bindings().to_vec()
    }

    pub async fn binding(&self, id: &ChannelId) -> Option<ControlBinding> {
        self.inner.lock().await.panel.get(id).cloned()
    }

    /// Descriptor loader: fetches the current channel set and replaces the
    /// whole panel with one binding per descriptor, in response order.
    /// Failures propagate to the caller; there is no loader-level retry.
    pub async fn load_panel(&self) -> Result<()> {
        let descriptors = self.descriptors.fetch_descriptors().await?;
        let panel = ControlPanel::rebuild(&descriptors);
        let channels = panel.channel_ids();
        {
            let mut guard = self.inner.lock().await;
            guard.panel = panel;
        }
        info!(channels = channels.len(), "panel: rebuilt from descriptor endpoint");
        let _ = self.events.send(ClientEvent::PanelRebuilt { channels });
        Ok(())
    }

    /// Command dispatcher: transmits iff the link is open, else a silent
    /// no-op. Returns true when the command was handed to the writer.
    pub async fn send_raw(&self, command: &str) -> bool {
        self.link.send_command(command).await
    }

    pub async fn set_switch(&self, id: &ChannelId, action: SwitchAction) -> bool {
        self.send_raw(&format!("{id}={action}")).await
    }

    /// Slider interaction: updates the local reading immediately, then
    /// dispatches, on every intermediate change.
    pub async fn set_level(&self, id: &ChannelId, level: u8) -> bool {
        let updated = {
            let mut guard = self.inner.lock().await;
            guard.panel.set_local_level(id, level)
        };
        if updated {
            let _ = self.events.send(ClientEvent::ControlUpdated {
                id: id.clone(),
                reading: level.to_string(),
            });
        }
        self.send_raw(&format!("{id}={level}")).await
    }

    /// Ack reconciler: one call per inbound transport message. Never
    /// returns an error; unrecognized traffic recovers via a full resync
    /// and unknown-channel acks are dropped.
    pub async fn handle_frame(&self, raw: &str) {
        match classify_frame(raw) {
            InboundFrame::Ack(ack) => {
                let outcome = {
                    let mut guard = self.inner.lock().await;
                    guard.panel.apply_ack(&ack)
                };
                match outcome {
                    AckOutcome::Updated { reading } => {
                        debug!(channel = %ack.channel, %reading, "ack applied");
                        let _ = self.events.send(ClientEvent::ControlUpdated {
                            id: ack.channel,
                            reading,
                        });
                    }
                    AckOutcome::IgnoredValue => {
                        debug!(channel = %ack.channel, value = %ack.value, "ack value not applicable; dropped");
                    }
                    AckOutcome::UnknownChannel => {
                        debug!(channel = %ack.channel, "ack for unbound channel; dropped");
                    }
                }
            }
            InboundFrame::UnknownShape => {
                warn!("inbound frame is valid JSON but not an ack envelope; resyncing panel");
                self.resync(ResyncReason::UnknownShape).await;
            }
            InboundFrame::Malformed => {
                warn!("inbound frame is not valid JSON; resyncing panel");
                self.resync(ResyncReason::MalformedFrame).await;
            }
        }
    }

    async fn resync(&self, reason: ResyncReason) {
        let _ = self.events.send(ClientEvent::ResyncStarted { reason });
        if let Err(err) = self.load_panel().await {
            let _ = self
                .events
                .send(ClientEvent::Error(format!("panel resync failed: {err}")));
        }
    }

    /// Starts the connection supervisor task (idempotent). The supervisor
    /// owns the link state machine: Connecting -> Open -> Disconnected ->
    /// backoff -> Connecting, and re-runs the loader on every open.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let ws_url = self.ws_url()?;
        {
            let mut guard = self.inner.lock().await;
            if guard.link_started {
                return Ok(());
            }
            guard.link_started = true;
        }

        let client = Arc::clone(self);
        tokio::spawn(async move {
            client.run_link(ws_url).await;
        });
        Ok(())
    }

    fn ws_url(&self) -> Result<String> {
        let ws_base = if self.base_url.starts_with("https://") {
            self.base_url.replacen("https://", "wss://", 1)
        } else if self.base_url.starts_with("http://") {
            self.base_url.replacen("http://", "ws://", 1)
        } else {
            return Err(anyhow!("hub url must start with http:// or https://"));
        };
        Ok(format!("{ws_base}/ws"))
    }

    async fn run_link(self: Arc<Self>, ws_url: String) {
        let mut attempt: u32 = 0;
        loop {
            self.link.set_connecting().await;
            let _ = self
                .events
                .send(ClientEvent::LinkStateChanged(LinkState::Connecting));

            match connect_async(&ws_url).await {
                Ok((stream, _)) => {
                    attempt = 0;
                    let (mut sink, mut reader) = stream.split();
                    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
                    let writer = tokio::spawn(async move {
                        while let Some(frame) = outbound_rx.recv().await {
                            if sink.send(frame).await.is_err() {
                                break;
                            }
                        }
                    });

                    self.link.open(outbound_tx).await;
                    let _ = self.events.send(ClientEvent::LinkStateChanged(LinkState::Open));
                    info!(url = %ws_url, "link: open");

                    if let Err(err) = self.load_panel().await {
                        let _ = self
                            .events
                            .send(ClientEvent::Error(format!("initial panel load failed: {err}")));
                    }

                    while let Some(frame) = reader.next().await {
                        match frame {
                            Ok(Message::Text(text)) => self.handle_frame(&text).await,
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(err) => {
                                let _ = self
                                    .events
                                    .send(ClientEvent::Error(format!("link receive failed: {err}")));
                                break;
                            }
                        }
                    }

                    writer.abort();
                    self.link.close().await;
                    let _ = self
                        .events
                        .send(ClientEvent::LinkStateChanged(LinkState::Disconnected));
                    warn!(url = %ws_url, "link: closed");
                }
                Err(err) => {
                    self.link.close().await;
                    let _ = self
                        .events
                        .send(ClientEvent::LinkStateChanged(LinkState::Disconnected));
                    warn!(url = %ws_url, "link: connect failed: {err}");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.backoff.delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "link: backing off before reconnect");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
