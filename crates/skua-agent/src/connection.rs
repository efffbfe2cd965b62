//! Connection manager — owns the coordinator connection and the
//! supervision loop around it.
//!
//! One connect cycle: establish a transport under the reconnect policy
//! (bounded attempts, exponential backoff), register, then pump frames in
//! both directions until the peer disconnects or shutdown is signalled.
//! When the attempt budget is exhausted the supervisor logs, sleeps the
//! fixed retry delay, and starts the next cycle; this repeats forever
//! until an interrupt.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use skua_core::config::AgentConfig;
use skua_core::error::Result;
use skua_core::protocol::AgentFrame;
use skua_runner::Runner;

use crate::dispatch::Dispatcher;
use crate::state::WorkerState;
use crate::transport::{self, Connection};

/// Why a connect cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The peer closed or the transport dropped; reconnect.
    Remote,
    /// Interrupt requested; stop for good.
    Shutdown,
}

pub struct ConnectionManager {
    config: AgentConfig,
    state: Arc<WorkerState>,
    dispatcher: Dispatcher,
}

impl ConnectionManager {
    pub fn new(config: AgentConfig, state: Arc<WorkerState>, runner: Arc<dyn Runner>) -> Self {
        let dispatcher = Dispatcher::new(state.clone(), runner);
        Self {
            config,
            state,
            dispatcher,
        }
    }

    /// Supervision loop: connect cycles forever until shutdown.
    pub async fn run_forever(
        &self,
        event_rx: &mut mpsc::UnboundedReceiver<AgentFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            info!("Connecting to server...");
            match self.connect_cycle(event_rx, &mut shutdown).await {
                Ok(Disconnect::Shutdown) => return,
                Ok(Disconnect::Remote) => {
                    info!("Disconnected from server");
                }
                Err(e) => {
                    error!("Error connecting to server: {e}");
                    info!(
                        "Retrying connection in {} seconds...",
                        self.config.retry_delay_secs
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_delay()) => {}
                        res = shutdown.changed() => {
                            // A dropped sender means no shutdown signal can
                            // ever arrive; stop instead of spinning.
                            if res.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            if *shutdown.borrow() {
                return;
            }
        }
    }

    /// One full cycle: establish, register, pump until disconnect.
    async fn connect_cycle(
        &self,
        event_rx: &mut mpsc::UnboundedReceiver<AgentFrame>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Disconnect> {
        let Some(Connection { mut tx, mut rx }) = self.establish(shutdown).await? else {
            return Ok(Disconnect::Shutdown);
        };
        info!("Connected to server: {}", self.config.server_url);

        // Fire-and-forget registration, once per connection, ahead of any
        // queued events.
        tx.send(&self.state.register_frame()).await?;

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("Shutting down agent...");
                        tx.close().await;
                        return Ok(Disconnect::Shutdown);
                    }
                }
                frame = event_rx.recv() => match frame {
                    Some(frame) => tx.send(&frame).await?,
                    // All senders dropped; nothing left to do.
                    None => return Ok(Disconnect::Shutdown),
                },
                inbound = rx.recv() => match inbound? {
                    Some(frame) => self.dispatcher.handle_frame(frame),
                    None => return Ok(Disconnect::Remote),
                },
            }
        }
    }

    /// Establish a transport under the reconnect policy. Returns
    /// `Ok(None)` when shutdown arrives mid-backoff, and the final error
    /// once the attempt budget is exhausted.
    async fn establish(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<Connection>> {
        let policy = &self.config.reconnect;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match transport::connect(&self.config).await {
                Ok(conn) => return Ok(Some(conn)),
                Err(e) if attempt >= policy.max_attempts => return Err(e),
                Err(e) => {
                    let delay = policy.backoff_delay(attempt);
                    warn!(
                        attempt,
                        "Connect attempt failed: {e}; retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        res = shutdown.changed() => {
                            if res.is_err() || *shutdown.borrow() {
                                return Ok(None);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use skua_core::types::RunOutcome;

    struct NoopRunner;

    #[async_trait]
    impl Runner for NoopRunner {
        fn defines_entry_point(&self, _code: &str) -> bool {
            true
        }

        async fn run(&self, _: &str, _: &str, _: bool) -> anyhow::Result<RunOutcome> {
            Ok(RunOutcome::default())
        }
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_supervisor() {
        // A port that refuses connections: bind, then drop the listener.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = AgentConfig::default();
        config.server_url = format!("http://127.0.0.1:{port}");
        config.reconnect.max_attempts = 1;
        config.reconnect.connect_timeout_ms = 1_000;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(WorkerState::new(&config, event_tx));
        let manager = ConnectionManager::new(config, state, Arc::new(NoopRunner));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        // With no sender left the supervisor must stop rather than spin
        // through its retry loop forever.
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            manager.run_forever(&mut event_rx, shutdown_rx),
        )
        .await
        .expect("supervisor exits when the shutdown sender is gone");
    }
}
