//! Error types and handling for the replication server.
//!
//! [`ScopeError`] is returned synchronously by mutating operations and leaves state
//! untouched. [`HookError`] is what extension code (listeners, server hooks, object
//! state producers) reports back; outside of scope loading it is logged and swallowed.

use scope_protocol::{ConnectionId, LoadStatus, ObjectId, PrefabId, ProtocolError, ScopeId};

/// Enumeration of possible replication server errors.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// The scope id is neither a virtual scope nor currently loaded
    #[error("Unknown scope: {0}")]
    UnknownScope(ScopeId),

    /// The connection has no membership entry
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection was announced twice
    #[error("Connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    /// The connection is not a member of the scope it was addressed through
    #[error("Connection {connection} is not in scope {scope}")]
    NotInScope {
        connection: ConnectionId,
        scope: ScopeId,
    },

    /// No extra scope prefab is registered under this key
    #[error("Unknown extra scope prefab key: {0:?}")]
    UnknownScopeKey(String),

    /// Object prefab index past the end of the object prefab table
    #[error("Object prefab index {index} out of range ({count} prefabs)")]
    ObjectPrefabOutOfRange { index: PrefabId, count: usize },

    /// No object prefab is registered under this key
    #[error("Unknown object prefab key: {0:?}")]
    UnknownObjectKey(String),

    /// A prefab key was empty after trimming
    #[error("Prefab keys must not be empty")]
    EmptyKey,

    /// Default scopes live as long as the world and are never unloaded one by one
    #[error("Cannot unload a default scope ({0})")]
    CannotUnloadDefaultScope(ScopeId),

    /// The operation needs a ready world
    #[error("World is {0}, expected ready")]
    WorldNotReady(LoadStatus),

    /// The object is already spawned in another scope
    #[error("Object is already spawned in scope {0}")]
    AlreadySpawned(ScopeId),

    /// The object is spawned, but not in the scope the removal was addressed to
    #[error("Object belongs to scope {actual}, not {expected}")]
    BelongsElsewhere { expected: ScopeId, actual: ScopeId },

    /// The object was instantiated by a different server instance
    #[error("Object was created by another server authority")]
    ForeignAuthority,

    /// A serialized payload does not fit in a single message
    #[error("Payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// The object could not produce its replicated state
    #[error("Object {object} could not produce its state: {source}")]
    ObjectState {
        object: ObjectId,
        #[source]
        source: Box<HookError>,
    },

    /// The prefab tables are inconsistent
    #[error("Invalid catalog: {0}")]
    Catalog(String),

    /// A load listener failed
    #[error("Scope {scope} failed to load: {source}")]
    LoadFailed {
        scope: ScopeId,
        #[source]
        source: Box<HookError>,
    },

    /// An unload listener failed
    #[error("Scope {scope} failed to unload cleanly: {source}")]
    UnloadFailed {
        scope: ScopeId,
        #[source]
        source: Box<HookError>,
    },

    /// The transport refused to queue a message
    #[error("Network error: {0}")]
    Network(String),

    /// The single-writer worker is gone
    #[error("Server queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failure reported by extension code.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl HookError {
    /// Creates a free-form hook failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        HookError::Failed(reason.into())
    }
}

/// Result type returned by every extension hook.
pub type HookResult = Result<(), HookError>;
