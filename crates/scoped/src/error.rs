//! Error types for the hosting layer.

use scope_server::ScopeError;

/// Failures of the WebSocket host around the replication server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding, handshake or socket failures
    #[error("Network error: {0}")]
    Network(String),

    /// Failures reported by the replication server
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Anything else that prevents the host from running
    #[error("Internal error: {0}")]
    Internal(String),
}
