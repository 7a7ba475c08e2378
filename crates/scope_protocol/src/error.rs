//! Error types shared by the protocol layer.

/// Failures raised while allocating identifiers or moving messages on and off the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Every identifier below the pool limit is currently in use
    #[error("Id pool exhausted (limit {limit})")]
    PoolExhausted { limit: u32 },

    /// The identifier was never handed out or has already been released
    #[error("Id {0} is not allocated")]
    NotAllocated(u32),

    /// A message or payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A message or payload could not be deserialized
    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),
}
