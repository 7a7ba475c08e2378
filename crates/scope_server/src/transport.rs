//! Seam to the connection/session layer.
//!
//! The transport owns connection ids and delivers messages reliably and in order. Calls
//! made through this trait only enqueue work: the server never waits for a network
//! write to finish.

use crate::error::ScopeError;
use scope_protocol::{ConnectionId, ScopeMessage};
use tracing::warn;

/// Outbound side of the message transport.
pub trait Transport: Send + Sync {
    /// Queues `message` for delivery to `connection`.
    fn send(&self, connection: ConnectionId, message: ScopeMessage) -> Result<(), ScopeError>;

    /// Terminates `connection`. The transport reports the disconnection back later.
    fn close(&self, connection: ConnectionId);

    /// Tells the hosting server to stop accepting connections.
    fn stop(&self);

    /// Queues the same message for several connections.
    ///
    /// Delivery is best-effort per connection: a failure is logged and the remaining
    /// connections are still served.
    ///
    /// # Returns
    ///
    /// The number of connections the message was queued for.
    fn broadcast(&self, connections: &[ConnectionId], message: &ScopeMessage) -> usize {
        let mut delivered = 0;
        for &connection in connections {
            match self.send(connection, message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "📡 Failed to queue {} for connection {}: {}",
                    message.name(),
                    connection,
                    e
                ),
            }
        }
        delivered
    }
}
