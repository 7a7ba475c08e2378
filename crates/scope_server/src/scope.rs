//! # Scopes
//!
//! A scope groups the connections currently inside it and the objects they can see.
//! Each loaded scope owns an [`ObjectRegistry`] and an ordered list of
//! [`ScopeListener`]s created from its prefab.
//!
//! ## Listener semantics
//!
//! Listeners run in registration order. A failing `on_load` aborts the load; every other
//! callback is isolated: the failure is logged and the next listener still runs.

use crate::context::ScopeContext;
use crate::error::HookResult;
use crate::object::ObjectHandle;
use crate::registry::ObjectRegistry;
use async_trait::async_trait;
use scope_protocol::{ConnectionId, PrefabId, ScopeId, DEFAULT_PREFAB};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Extension callbacks attached to a scope.
///
/// Every method defaults to a no-op. The [`ScopeContext`] gives direct access to the
/// scope and the server while the callback runs on the server's queue; use
/// [`ScopeContext::defer`] for follow-up work that must run after the current operation.
#[async_trait]
pub trait ScopeListener: Send + Sync {
    /// Populates the scope. An error aborts the load.
    async fn on_load(&self, _ctx: &mut ScopeContext<'_>) -> HookResult {
        Ok(())
    }

    async fn on_unload(&self, _ctx: &mut ScopeContext<'_>) -> HookResult {
        Ok(())
    }

    /// A connection entered the scope and has been told about the move.
    async fn on_joining(&self, _ctx: &mut ScopeContext<'_>, _connection: ConnectionId) -> HookResult {
        Ok(())
    }

    /// A connection is moving to another scope.
    async fn on_leaving(&self, _ctx: &mut ScopeContext<'_>, _connection: ConnectionId) -> HookResult {
        Ok(())
    }

    /// A connection disconnected while inside the scope.
    async fn on_goodbye(&self, _ctx: &mut ScopeContext<'_>, _connection: ConnectionId) -> HookResult {
        Ok(())
    }

    async fn on_spawned(&self, _ctx: &mut ScopeContext<'_>, _object: &ObjectHandle) -> HookResult {
        Ok(())
    }

    async fn on_despawned(&self, _ctx: &mut ScopeContext<'_>, _object: &ObjectHandle) -> HookResult {
        Ok(())
    }
}

/// Which prefab table a scope came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    /// Position in the default scope list; the scope id is always `index + 1`.
    Default { index: usize },
    /// Position in the extra scope table and the key it was loaded with.
    Extra { index: PrefabId, key: String },
}

impl ScopeKind {
    /// Prefab descriptor announced to clients moving into the scope.
    pub fn prefab_index(&self) -> PrefabId {
        match self {
            ScopeKind::Default { .. } => DEFAULT_PREFAB,
            ScopeKind::Extra { index, .. } => *index,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ScopeKind::Default { .. })
    }
}

/// A loaded scope.
pub struct Scope {
    id: ScopeId,
    instance: u64,
    kind: ScopeKind,
    name: String,
    registry: ObjectRegistry,
    connections: BTreeSet<ConnectionId>,
    listeners: Vec<Arc<dyn ScopeListener>>,
    sync_on_join: bool,
}

impl Scope {
    pub(crate) fn new(
        id: ScopeId,
        kind: ScopeKind,
        name: impl Into<String>,
        listeners: Vec<Arc<dyn ScopeListener>>,
        sync_on_join: bool,
    ) -> Self {
        Self {
            id,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            kind,
            name: name.into(),
            registry: ObjectRegistry::new(id),
            connections: BTreeSet::new(),
            listeners,
            sync_on_join,
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Process-wide unique number of this loaded instance. Ids are reused after an
    /// unload; instance numbers never are.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefab_index(&self) -> PrefabId {
        self.kind.prefab_index()
    }

    /// Whether joining connections receive every existing object before the
    /// `on_joining` listeners run.
    pub fn syncs_on_join(&self) -> bool {
        self.sync_on_join
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub(crate) fn objects_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    /// Handles of every object, in id order.
    pub fn object_handles(&self) -> Vec<ObjectHandle> {
        self.registry.iter().map(|(_, object)| object.clone()).collect()
    }

    /// Member connections in ascending order.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.connections.iter().copied().collect()
    }

    pub fn has_connection(&self, connection: ConnectionId) -> bool {
        self.connections.contains(&connection)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn insert_connection(&mut self, connection: ConnectionId) -> bool {
        self.connections.insert(connection)
    }

    pub(crate) fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        self.connections.remove(&connection)
    }

    pub(crate) fn take_connections(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.connections).into_iter().collect()
    }

    /// Appends a listener after the ones the prefab created.
    pub fn add_listener(&mut self, listener: Arc<dyn ScopeListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ScopeListener>> {
        self.listeners.clone()
    }

    /// Releases every object and forgets every member without notifying anyone.
    pub(crate) fn dispose(&mut self) {
        self.registry.detach_all();
        self.connections.clear();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("objects", &self.registry.len())
            .field("connections", &self.connections)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        // Objects of a dropped scope become standalone again.
        self.registry.detach_all();
    }
}
