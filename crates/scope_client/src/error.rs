//! Error types for the client mirror.
//!
//! Every [`MirrorError`] raised while applying a server notice is wrapped in a
//! [`LocalError`] naming the step that failed. A local error is fatal to the connection:
//! it is reported upstream and the session stops.

use scope_protocol::{ObjectId, PrefabId, ProtocolError, ScopeId};
use std::fmt;

/// Step of the mirror update that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorContext {
    ScopeLoadError,
    SpawnError,
    RefreshError,
    DespawnError,
    /// An object notice arrived while the client sat in a virtual scope
    InvalidServerScope,
    /// An object notice addressed a scope other than the current one
    ScopeMismatch,
    /// The frame could not be decoded at all
    MalformedMessage,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorContext::ScopeLoadError => "ScopeLoadError",
            ErrorContext::SpawnError => "SpawnError",
            ErrorContext::RefreshError => "RefreshError",
            ErrorContext::DespawnError => "DespawnError",
            ErrorContext::InvalidServerScope => "InvalidServerScope",
            ErrorContext::ScopeMismatch => "ScopeMismatch",
            ErrorContext::MalformedMessage => "MalformedMessage",
        };
        f.write_str(name)
    }
}

/// Enumeration of mirror failures.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Scope view failed to load: {0}")]
    ScopeLoad(String),

    /// The server announced a default scope the client catalog does not have
    #[error("No default scope view for scope {0}")]
    UnknownDefaultScope(ScopeId),

    #[error("No extra scope view at prefab index {0}")]
    UnknownScopePrefab(PrefabId),

    #[error("Server addressed scope {received} while the client is in virtual scope {current}")]
    InvalidServerScope { current: ScopeId, received: ScopeId },

    #[error("Server addressed scope {received} while the client is in scope {current}")]
    ScopeMismatch { current: ScopeId, received: ScopeId },

    #[error("Object {0} is already spawned")]
    AlreadySpawned(ObjectId),

    #[error("No object mirror for prefab index {0}")]
    UnknownObjectPrefab(PrefabId),

    #[error("Object {0} is not spawned")]
    UnknownObject(ObjectId),

    /// A mirror refused its payload
    #[error("{0}")]
    Rejected(String),

    #[error("Invalid client catalog: {0}")]
    Catalog(String),

    /// The upstream channel to the server is gone
    #[error("Uplink error: {0}")]
    Uplink(String),

    #[error("Mirror session is closed")]
    SessionClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl MirrorError {
    /// Creates a free-form rejection, for use in mirror implementations.
    pub fn rejected(reason: impl Into<String>) -> Self {
        MirrorError::Rejected(reason.into())
    }
}

/// A fatal desynchronization or local fault.
#[derive(Debug, thiserror::Error)]
#[error("{context}: {source}")]
pub struct LocalError {
    pub context: ErrorContext,
    #[source]
    pub source: MirrorError,
}

impl LocalError {
    pub fn new(context: ErrorContext, source: MirrorError) -> Self {
        Self { context, source }
    }
}
