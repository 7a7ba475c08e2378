//! Access handed to scope listeners while they run on the server queue.

use crate::error::ScopeError;
use crate::object::{ObjectHandle, ReplicatedObject};
use crate::scope::Scope;
use crate::server::ScopeServer;
use futures::future::BoxFuture;
use scope_protocol::{ConnectionId, ObjectId, PrefabId, ScopeId};
use std::sync::Arc;

/// A scope listener's view of its scope and of the server.
///
/// Operations called through the context run inline, as part of the operation that
/// triggered the listener. Work that must wait until that operation completes goes
/// through [`defer`](Self::defer).
pub struct ScopeContext<'a> {
    server: &'a mut ScopeServer,
    scope: ScopeId,
}

impl<'a> ScopeContext<'a> {
    pub(crate) fn new(server: &'a mut ScopeServer, scope: ScopeId) -> Self {
        Self { server, scope }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope
    }

    /// The scope, unless it was unloaded while the listener ran.
    pub fn scope(&self) -> Option<&Scope> {
        self.server.scope(self.scope)
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.scope().map(Scope::connections).unwrap_or_default()
    }

    pub fn objects(&self) -> Vec<ObjectHandle> {
        self.scope().map(Scope::object_handles).unwrap_or_default()
    }

    pub fn instantiate(&self, prefab: PrefabId) -> Result<ObjectHandle, ScopeError> {
        self.server.instantiate(prefab)
    }

    pub fn instantiate_by_key(&self, key: &str) -> Result<ObjectHandle, ScopeError> {
        self.server.instantiate_by_key(key)
    }

    pub fn adopt(&self, prefab: PrefabId, state: Arc<dyn ReplicatedObject>) -> Result<ObjectHandle, ScopeError> {
        self.server.adopt(prefab, state)
    }

    /// Spawns `object` into this scope.
    pub async fn add_object(&mut self, object: &ObjectHandle) -> Result<ObjectId, ScopeError> {
        self.server.add_object(self.scope, object).await
    }

    /// Despawns `object` from this scope.
    pub async fn remove_object(&mut self, object: &ObjectHandle) -> Result<(), ScopeError> {
        self.server.remove_object(self.scope, object).await
    }

    pub fn refresh_existing_objects_to(&mut self, connection: ConnectionId, context: &str) -> Result<usize, ScopeError> {
        self.server.refresh_existing_objects_to(self.scope, connection, context)
    }

    /// The whole server, for operations on other scopes or connections.
    pub fn server(&mut self) -> &mut ScopeServer {
        &mut *self.server
    }

    /// Queues `job` to run on the server after the current operation.
    pub fn defer<F>(&self, job: F) -> Result<(), ScopeError>
    where
        F: for<'s> FnOnce(&'s mut ScopeServer) -> BoxFuture<'s, ()> + Send + 'static,
    {
        self.server.defer(job)
    }
}
