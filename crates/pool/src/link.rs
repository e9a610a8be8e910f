//! Per-slot event channel to the in-container agent.
//!
//! Each slot gets one reconnecting WebSocket client that parses
//! `browser:container:event` frames into typed [`AgentEvent`]s and feeds them
//! into the supervisor's single event channel, keyed by slot name.

use std::time::Duration;

use {
    futures::{SinkExt, StreamExt},
    serde::Deserialize,
    tokio::{net::TcpStream, sync::mpsc, task::JoinHandle},
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, warn},
};

use crate::types::{AgentEvent, LinkEvent, PoolMode};

/// Channel name the agent publishes pool events on.
pub const EVENT_CHANNEL: &str = "browser:container:event";

const MAX_ATTEMPTS: u32 = 15;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The WebSocket URL for a slot's agent.
///
/// `BROWSER_CONNECTION_HOST` (carried in config) wins when set; otherwise the
/// host is `localhost` in full-lifecycle mode or the container's own name in
/// manage-only mode (containers resolve each other by name).
pub fn agent_url(
    mode: PoolMode,
    connection_host: Option<&str>,
    slot_name: &str,
    app_port: u16,
) -> String {
    let host = match connection_host {
        Some(h) if !h.is_empty() => h,
        _ => match mode {
            PoolMode::Full => "localhost",
            PoolMode::ManageOnly => slot_name,
        },
    };
    format!("ws://{host}:{app_port}")
}

/// Opens agent links. The production implementation dials WebSockets; tests
/// substitute a connector that never touches the network.
pub trait AgentConnector: Send + Sync {
    fn open(&self, slot: &str, url: &str, events: mpsc::UnboundedSender<LinkEvent>) -> AgentLink;
}

/// Default connector: one reconnecting WebSocket client per slot.
pub struct WsConnector;

impl AgentConnector for WsConnector {
    fn open(&self, slot: &str, url: &str, events: mpsc::UnboundedSender<LinkEvent>) -> AgentLink {
        AgentLink::spawn(slot.to_string(), url.to_string(), events)
    }
}

/// Handle to one slot's agent connection. Dropping the handle disconnects and
/// discards the link.
pub struct AgentLink {
    handle: JoinHandle<()>,
}

impl AgentLink {
    fn spawn(slot: String, url: String, events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        let handle = tokio::spawn(link_loop(slot, url, events));
        Self { handle }
    }

    /// Wrap an already-spawned task as a link handle.
    pub fn from_task(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }
}

impl Drop for AgentLink {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Connection loop: dial, forward events until the stream drops, back off,
/// redial. Gives up (with a final disconnect notification) after
/// `MAX_ATTEMPTS` consecutive failed dials.
async fn link_loop(slot: String, url: String, events: mpsc::UnboundedSender<LinkEvent>) {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempts = 0u32;

    loop {
        match connect(&url).await {
            Ok(ws) => {
                attempts = 0;
                backoff = INITIAL_BACKOFF;
                if events.send(LinkEvent::Connected { slot: slot.clone() }).is_err() {
                    return;
                }
                read_events(&slot, ws, &events).await;
                debug!(slot = %slot, "agent connection dropped");
                if events.send(LinkEvent::Disconnected { slot: slot.clone() }).is_err() {
                    return;
                }
            },
            Err(e) => {
                attempts += 1;
                debug!(slot = %slot, attempt = attempts, error = %e, "agent connect failed");
                if attempts >= MAX_ATTEMPTS {
                    warn!(slot = %slot, attempts, "giving up on agent connection");
                    let _ = events.send(LinkEvent::Disconnected { slot: slot.clone() });
                    return;
                }
            },
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn connect(url: &str) -> Result<WsStream, String> {
    match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url)).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {}s", CONNECT_TIMEOUT.as_secs())),
    }
}

/// Forward frames from one live connection until it closes or errors.
/// Socket errors are logged only; the caller handles reconnection.
async fn read_events(slot: &str, mut ws: WsStream, events: &mpsc::UnboundedSender<LinkEvent>) {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Some(event) = parse_frame(&text) {
                    let _ = events.send(LinkEvent::Agent {
                        slot: slot.to_string(),
                        event,
                    });
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = ws.send(Message::Pong(data)).await;
            },
            Ok(Message::Close(_)) => return,
            Ok(_) => {},
            Err(e) => {
                debug!(slot = %slot, error = %e, "agent socket error");
                return;
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    channel: String,
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse one text frame into a typed agent event. Frames on other channels,
/// unknown event names, and malformed payloads are all ignored.
fn parse_frame(text: &str) -> Option<AgentEvent> {
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable agent frame");
            return None;
        },
    };
    if frame.channel != EVENT_CHANNEL {
        debug!(channel = %frame.channel, "ignoring frame on unknown channel");
        return None;
    }
    let tagged = serde_json::json!({ "event": frame.event, "data": frame.data });
    match serde_json::from_value(tagged) {
        Ok(event) => Some(event),
        Err(_) => {
            debug!(event = %frame.event, "ignoring unknown agent event");
            None
        },
    }
}
