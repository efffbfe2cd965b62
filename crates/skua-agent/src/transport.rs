//! Coordinator transports.
//!
//! Transports are tried in preferred order: WebSocket first, then an HTTP
//! long-polling fallback for networks that will not pass a WebSocket
//! upgrade. Both speak the same JSON frames from [`skua_core::protocol`].
//!
//! A connected transport is split into independent send and receive
//! halves so the connection manager can pump both directions from one
//! `select!` loop.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use skua_core::config::AgentConfig;
use skua_core::error::{AgentError, Result};
use skua_core::protocol::AgentFrame;

/// Send half of a connected transport.
#[async_trait]
pub trait TransportTx: Send {
    async fn send(&mut self, frame: &AgentFrame) -> Result<()>;

    /// Graceful close; idempotent, errors ignored.
    async fn close(&mut self);
}

/// Receive half of a connected transport.
#[async_trait]
pub trait TransportRx: Send {
    /// Next inbound frame, or `None` once the peer has closed. Frames
    /// that fail to decode are logged and skipped, never fatal.
    async fn recv(&mut self) -> Result<Option<AgentFrame>>;
}

pub struct Connection {
    pub tx: Box<dyn TransportTx>,
    pub rx: Box<dyn TransportRx>,
}

/// One connection attempt: WebSocket first, polling fallback second, each
/// bounded by the configured connect timeout.
pub async fn connect(config: &AgentConfig) -> Result<Connection> {
    let timeout = config.reconnect.connect_timeout();

    match tokio::time::timeout(timeout, connect_ws(&config.server_url)).await {
        Ok(Ok(conn)) => return Ok(conn),
        Ok(Err(e)) => warn!("WebSocket connect failed: {e}; trying polling transport"),
        Err(_) => warn!("WebSocket connect timed out; trying polling transport"),
    }

    match tokio::time::timeout(timeout, connect_polling(&config.server_url)).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Transport(
            "polling transport connect timed out".into(),
        )),
    }
}

// --- WebSocket transport ---

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map the configured http(s) endpoint to the agent WebSocket URL.
pub fn ws_url(server_url: &str) -> String {
    let base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server_url.starts_with("ws://") || server_url.starts_with("wss://") {
        server_url.to_string()
    } else {
        format!("ws://{server_url}")
    };
    format!("{}/agent", base.trim_end_matches('/'))
}

async fn connect_ws(server_url: &str) -> Result<Connection> {
    let url = ws_url(server_url);
    debug!(%url, "Attempting WebSocket connect");
    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| AgentError::Transport(e.to_string()))?;
    let (sink, stream) = stream.split();
    Ok(Connection {
        tx: Box::new(WsTx { sink }),
        rx: Box::new(WsRx { stream }),
    })
}

struct WsTx {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportTx for WsTx {
    async fn send(&mut self, frame: &AgentFrame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        self.sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

struct WsRx {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportRx for WsRx {
    async fn recv(&mut self) -> Result<Option<AgentFrame>> {
        while let Some(msg) = self.stream.next().await {
            let msg = msg.map_err(|e| AgentError::Transport(e.to_string()))?;
            match msg {
                Message::Text(text) => match serde_json::from_str(text.as_str()) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => debug!("Skipping undecodable frame: {e}"),
                },
                Message::Close(_) => return Ok(None),
                // Pings are answered by the protocol layer; binary frames
                // have no meaning in this protocol.
                _ => {}
            }
        }
        Ok(None)
    }
}

// --- HTTP long-polling fallback ---

#[derive(Debug, serde::Deserialize)]
struct PollSession {
    session_id: String,
}

async fn connect_polling(server_url: &str) -> Result<Connection> {
    let base = server_url.trim_end_matches('/').to_string();
    debug!(%base, "Attempting polling connect");
    let client = reqwest::Client::new();

    let session: PollSession = client
        .post(format!("{base}/agent/poll"))
        .send()
        .await
        .map_err(|e| AgentError::Transport(e.to_string()))?
        .error_for_status()
        .map_err(|e| AgentError::Transport(e.to_string()))?
        .json()
        .await
        .map_err(|e| AgentError::Transport(e.to_string()))?;

    let session_url = format!("{base}/agent/poll/{}", session.session_id);
    Ok(Connection {
        tx: Box::new(PollTx {
            client: client.clone(),
            session_url: session_url.clone(),
        }),
        rx: Box::new(PollRx {
            client,
            session_url,
            pending: VecDeque::new(),
        }),
    })
}

struct PollTx {
    client: reqwest::Client,
    session_url: String,
}

#[async_trait]
impl TransportTx for PollTx {
    async fn send(&mut self, frame: &AgentFrame) -> Result<()> {
        self.client
            .post(format!("{}/send", self.session_url))
            .json(frame)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| AgentError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.client.delete(&self.session_url).send().await;
    }
}

struct PollRx {
    client: reqwest::Client,
    session_url: String,
    pending: VecDeque<AgentFrame>,
}

#[async_trait]
impl TransportRx for PollRx {
    async fn recv(&mut self) -> Result<Option<AgentFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            let resp = self
                .client
                .get(format!("{}/recv", self.session_url))
                .send()
                .await
                .map_err(|e| AgentError::Transport(e.to_string()))?;

            if resp.status() == reqwest::StatusCode::GONE {
                // Session expired server-side.
                return Ok(None);
            }
            let resp = resp
                .error_for_status()
                .map_err(|e| AgentError::Transport(e.to_string()))?;

            let raw: Vec<serde_json::Value> = resp
                .json()
                .await
                .map_err(|e| AgentError::Transport(e.to_string()))?;

            for value in raw {
                match serde_json::from_value(value) {
                    Ok(frame) => self.pending.push_back(frame),
                    Err(e) => debug!("Skipping undecodable frame: {e}"),
                }
            }
            // Empty batch: the long poll timed out idle; poll again.
        }
    }
}
