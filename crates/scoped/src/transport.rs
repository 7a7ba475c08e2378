//! WebSocket transport for the replication server.
//!
//! Every accepted socket gets a connection id and an unbounded outbound queue. The
//! server side of the [`Transport`] seam only pushes frames onto those queues; one
//! writer task per socket drains its queue in order, which keeps delivery per
//! connection ordered without the server ever waiting on the network.
//!
//! Text frames carry JSON: replication notices downstream, `ClientMessage`s and
//! navigation requests upstream.

use crate::error::ServerError;
use crate::requests::{RequestRouter, SampleReply, Upstream};
use crate::shutdown::ShutdownState;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use scope_protocol::{ConnectionId, ScopeMessage};
use scope_server::{ScopeError, Transport};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

/// Registry of live sockets and their outbound queues.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    next_id: AtomicU64,
    max_connections: usize,
    shutdown: ShutdownState,
}

impl ConnectionManager {
    /// # Arguments
    ///
    /// * `max_connections` - Sockets beyond this count are refused at accept time
    /// * `shutdown` - Flipped when the replication server asks the transport to stop
    pub fn new(max_connections: usize, shutdown: ShutdownState) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_connections,
            shutdown,
        }
    }

    /// Allocates a connection id and its outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let connection = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.insert(connection, sender);
        (connection, receiver)
    }

    pub fn unregister(&self, connection: ConnectionId) -> bool {
        self.connections.remove(&connection).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }

    /// Queues a raw text frame.
    pub fn send_text(&self, connection: ConnectionId, text: String) -> Result<(), ScopeError> {
        self.send_frame(connection, Message::Text(text.into()))
    }

    fn send_frame(&self, connection: ConnectionId, frame: Message) -> Result<(), ScopeError> {
        let sender = self
            .connections
            .get(&connection)
            .ok_or(ScopeError::UnknownConnection(connection))?;
        sender
            .send(frame)
            .map_err(|_| ScopeError::Network(format!("connection {connection} is closing")))
    }

    /// Asks every socket to close.
    pub fn close_all(&self, reason: &'static str) -> usize {
        let mut closed = 0;
        for entry in self.connections.iter() {
            if entry.value().send(close_frame(CloseCode::Away, reason)).is_ok() {
                closed += 1;
            }
        }
        closed
    }
}

fn close_frame(code: CloseCode, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

impl Transport for ConnectionManager {
    fn send(&self, connection: ConnectionId, message: ScopeMessage) -> Result<(), ScopeError> {
        let bytes = message.encode()?;
        let text = String::from_utf8(bytes).map_err(|e| ScopeError::Network(e.to_string()))?;
        trace!("📤 {} -> connection {}", message.name(), connection);
        self.send_text(connection, text)
    }

    fn close(&self, connection: ConnectionId) {
        match self.send_frame(connection, close_frame(CloseCode::Policy, "desynchronized")) {
            Ok(()) => info!("🔌 Closing connection {}", connection),
            Err(e) => debug!("🔌 Connection {} already gone: {}", connection, e),
        }
    }

    fn stop(&self) {
        warn!("🛑 Replication server asked the transport to stop");
        self.shutdown.initiate_shutdown();
    }
}

/// Accepts sockets until shutdown is initiated.
///
/// # Arguments
///
/// * `listener` - Bound TCP listener
/// * `manager` - Connection registry shared with the replication server
/// * `router` - Navigation request handler, which also carries the server queue
/// * `shutdown` - Stops the loop once initiated
pub async fn accept_loop(
    listener: TcpListener,
    manager: Arc<ConnectionManager>,
    router: RequestRouter,
    shutdown: ShutdownState,
) {
    loop {
        tokio::select! {
            _ = shutdown.initiated() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if manager.is_full() {
                        warn!("🚫 Refusing {}: connection limit reached", addr);
                        continue;
                    }
                    let manager = manager.clone();
                    let router = router.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, manager, router).await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    }
    info!("🛑 Accept loop stopped");
}

/// Serves one WebSocket client from handshake to close.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    manager: Arc<ConnectionManager>,
    router: RequestRouter,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (connection, mut outbound) = manager.register();
    info!("🔗 Connection {} from {}", connection, addr);

    if let Err(e) = router.server().connected(connection).await {
        manager.unregister(connection);
        return Err(e.into());
    }

    let incoming = async {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<Upstream>(text.as_str()) {
                    Ok(Upstream::Protocol(message)) => {
                        if let Err(e) = router.server().client_message(connection, message) {
                            warn!("Connection {}: could not forward {:?}: {}", connection, message, e);
                        }
                    }
                    Ok(Upstream::Request(request)) => {
                        let reply = router.serve(connection, request).await;
                        if let Err(e) = manager.send_text(connection, reply.to_json()) {
                            debug!("Connection {}: reply dropped: {}", connection, e);
                        }
                    }
                    Err(e) => {
                        warn!("Connection {}: unreadable message: {}", connection, e);
                        let reply = SampleReply::Error {
                            reason: "unrecognized message".to_string(),
                        };
                        if let Err(e) = manager.send_text(connection, reply.to_json()) {
                            debug!("Connection {}: reply dropped: {}", connection, e);
                        }
                    }
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = manager.send_frame(connection, Message::Pong(data)) {
                        debug!("Connection {}: pong dropped: {}", connection, e);
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} closed by peer", connection);
                    break;
                }
                Ok(Message::Binary(_)) => warn!("Connection {}: binary frames are not supported", connection),
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection {}: WebSocket error: {}", connection, e);
                    break;
                }
            }
        }
    };

    let outgoing = async {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if let Err(e) = ws_sender.send(frame).await {
                warn!("Connection {}: send failed: {}", connection, e);
                break;
            }
            if closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = incoming => {},
        _ = outgoing => {},
    }

    manager.unregister(connection);
    if let Err(e) = router.server().disconnected(connection) {
        debug!("Connection {}: goodbye not delivered: {}", connection, e);
    }
    info!("👋 Connection {} from {} finished", connection, addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_follow_registration() {
        let manager = ConnectionManager::new(2, ShutdownState::new());
        let (first, mut first_rx) = manager.register();
        let (second, _second_rx) = manager.register();
        assert_ne!(first, second);
        assert!(manager.is_full());

        manager.send(first, ScopeMessage::Welcome).unwrap();
        match first_rx.try_recv().unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"kind":"welcome"}"#),
            other => panic!("unexpected frame {other:?}"),
        }

        assert!(manager.unregister(first));
        assert!(matches!(
            manager.send(first, ScopeMessage::Welcome),
            Err(ScopeError::UnknownConnection(_))
        ));
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn close_and_stop() {
        let shutdown = ShutdownState::new();
        let manager = ConnectionManager::new(8, shutdown.clone());
        let (connection, mut rx) = manager.register();

        manager.close(connection);
        assert!(matches!(rx.try_recv().unwrap(), Message::Close(Some(_))));
        assert_eq!(manager.close_all("bye"), 1);

        manager.stop();
        assert!(shutdown.is_shutdown_initiated());
    }
}
