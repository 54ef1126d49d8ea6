//! WebSocket observer transport.
//!
//! Every connection is registered as an observer and receives each
//! [`StateMessage`] as a JSON text frame. A client starts the conversation
//! by sending `{"action": "start"}`; only one session runs at a time.
//! Failures on one connection never affect the others.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ElysiaError, Result};
use crate::observers::ObserverHub;
use crate::pipeline::TurnLoop;

/// A command sent by a client.
#[derive(Debug, Deserialize)]
struct ClientCommand {
    action: String,
}

/// Accepts observer connections and starts sessions on request.
pub struct Transport {
    observers: Arc<ObserverHub>,
    turns: Arc<TurnLoop>,
    session_active: AtomicBool,
    cancel: CancellationToken,
}

impl Transport {
    pub fn new(
        observers: Arc<ObserverHub>,
        turns: Arc<TurnLoop>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            observers,
            turns,
            session_active: AtomicBool::new(false),
            cancel,
        })
    }

    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ElysiaError::Transport`] if the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| ElysiaError::Transport(format!("failed to bind {addr}: {e}")))
    }

    /// Whether a conversation session is running.
    pub fn session_active(&self) -> bool {
        self.session_active.load(Ordering::Acquire)
    }

    /// Accept connections until the cancellation token fires.
    ///
    /// Dropping the listener on return closes the socket.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("observer transport listening on ws://{addr}");
        }
        loop {
            let accepted = tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_connection(stream, peer).await {
                            warn!(%peer, "connection ended with error: {e}");
                        }
                    });
                }
                Err(e) => warn!("failed to accept connection: {e}"),
            }
        }
        info!("observer transport closed");
        Ok(())
    }

    /// Start a session unless one is already running.
    ///
    /// Returns `true` if a new session was started.
    pub fn start_session(self: &Arc<Self>) -> bool {
        if self
            .session_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("session already running, ignoring start");
            return false;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.turns.run(this.cancel.child_token()).await {
                Ok(turns) => info!(turns, "session finished"),
                Err(e) => error!("session failed: {e}"),
            }
            this.session_active.store(false, Ordering::Release);
        });
        true
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| ElysiaError::Transport(format!("handshake with {peer} failed: {e}")))?;
        let (mut write, mut read) = ws.split();
        let (id, mut outbound) = self.observers.subscribe();
        info!(%peer, observer = id, "observer connected");

        let outcome = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break Ok(());
                }
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.handle_command(&text),
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Err(e)) => {
                        break Err(ElysiaError::Transport(format!("read from {peer} failed: {e}")));
                    }
                    _ => {} // Binary, Ping/Pong frames handled by tungstenite.
                },
                Some(message) = outbound.recv() => {
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to encode state message: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(json)).await {
                        break Err(ElysiaError::Transport(format!("send to {peer} failed: {e}")));
                    }
                }
            }
        };

        self.observers.unsubscribe(id);
        info!(%peer, observer = id, "observer disconnected");
        outcome
    }

    fn handle_command(self: &Arc<Self>, text: &str) {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) if command.action == "start" => {
                if self.start_session() {
                    info!("session started by client");
                }
            }
            Ok(command) => debug!(action = %command.action, "ignoring unknown action"),
            Err(e) => debug!("ignoring unparseable client message: {e}"),
        }
    }
}
