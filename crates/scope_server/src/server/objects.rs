//! Object instantiation, spawn/despawn and state delivery.

use super::ScopeServer;
use crate::error::ScopeError;
use crate::object::{ObjectHandle, Placement, ReplicatedObject};
use crate::scope::Scope;
use scope_protocol::{ConnectionId, ObjectId, PrefabId, ScopeId};
use std::sync::Arc;
use tracing::{debug, error, warn};

impl ScopeServer {
    /// Creates an unspawned object from the object prefab at `prefab`.
    pub fn instantiate(&self, prefab: PrefabId) -> Result<ObjectHandle, ScopeError> {
        let state = self.catalog.object_prefab(prefab)?.create();
        Ok(ObjectHandle::new(prefab, self.authority, state))
    }

    /// Creates an unspawned object from the object prefab registered under `key`.
    pub fn instantiate_by_key(&self, key: &str) -> Result<ObjectHandle, ScopeError> {
        let prefab = self.catalog.object_prefab_index(key)?;
        self.instantiate(prefab)
    }

    /// Wraps externally built state as an object of prefab `prefab`.
    pub fn adopt(&self, prefab: PrefabId, state: Arc<dyn ReplicatedObject>) -> Result<ObjectHandle, ScopeError> {
        self.catalog.object_prefab(prefab)?;
        Ok(ObjectHandle::new(prefab, self.authority, state))
    }

    /// Spawns `object` into `scope` and announces it to every member.
    ///
    /// Adding an object to the scope it already lives in is a no-op. When the spawn
    /// notice cannot be built (oversized payload, failing state producer) the despawned
    /// listeners run, the object is unregistered again and the error returned.
    ///
    /// # Returns
    ///
    /// The object's id within `scope`.
    pub async fn add_object(&mut self, scope: ScopeId, object: &ObjectHandle) -> Result<ObjectId, ScopeError> {
        if object.authority() != self.authority {
            return Err(ScopeError::ForeignAuthority);
        }
        match object.placement() {
            Some(placement) if placement.scope == scope => return Ok(placement.object),
            Some(placement) => return Err(ScopeError::AlreadySpawned(placement.scope)),
            None => {}
        }

        let id = self
            .scopes
            .get_mut(&scope)
            .ok_or(ScopeError::UnknownScope(scope))?
            .objects_mut()
            .register(object)?;
        debug!(
            "✨ Object {} (prefab {}) registered in scope {}",
            id,
            object.prefab_id(),
            scope
        );

        for listener in object.listeners() {
            if let Err(e) = listener.on_spawned(object).await {
                error!("❌ Object {} spawned listener failed: {}", id, e);
            }
        }
        notify_scope_listeners!(self, scope, "spawned", |listener, ctx| listener.on_spawned(ctx, object));

        if object.placement() != Some(Placement { scope, object: id }) {
            debug!("👻 Object {} left scope {} before it was announced", id, scope);
            return Ok(id);
        }

        let connections = self.scopes.get(&scope).map(Scope::connections).unwrap_or_default();
        match self.broadcaster.broadcast_spawn(scope, id, object, &connections) {
            Ok(delivered) => debug!("📡 Spawn of object {} sent to {} connection(s)", id, delivered),
            Err(error) => {
                error!("❌ Spawn of object {} in scope {} rejected: {}", id, scope, error);
                self.roll_back_spawn(scope, id, object).await;
                return Err(error);
            }
        }

        for listener in object.listeners() {
            if let Err(e) = listener.on_after_spawned(object).await {
                error!("❌ Object {} after-spawned listener failed: {}", id, e);
            }
        }
        Ok(id)
    }

    /// Undoes a spawn whose notice could not be built. The spawned listeners already ran,
    /// so the despawned ones run too before the id is released.
    async fn roll_back_spawn(&mut self, scope: ScopeId, id: ObjectId, object: &ObjectHandle) {
        for listener in object.listeners() {
            if let Err(e) = listener.on_despawned(object).await {
                error!("❌ Object {} despawned listener failed: {}", id, e);
            }
        }
        notify_scope_listeners!(self, scope, "despawned", |listener, ctx| listener.on_despawned(ctx, object));

        if let Some(target) = self.scopes.get_mut(&scope) {
            let still_registered = target
                .objects()
                .get(id)
                .is_some_and(|registered| registered.same_object(object));
            if still_registered {
                if let Err(e) = target.objects_mut().unregister(id) {
                    warn!("⚠️ Could not roll back object {}: {}", id, e);
                }
            }
        }
    }

    /// Despawns `object` from `scope`, releasing its id.
    ///
    /// Removing an object that is not spawned anywhere is a no-op.
    pub async fn remove_object(&mut self, scope: ScopeId, object: &ObjectHandle) -> Result<(), ScopeError> {
        let Some(placement) = object.placement() else {
            return Ok(());
        };
        if placement.scope != scope {
            return Err(ScopeError::BelongsElsewhere {
                expected: scope,
                actual: placement.scope,
            });
        }
        let id = placement.object;

        for listener in object.listeners() {
            if let Err(e) = listener.on_before_despawned(object).await {
                error!("❌ Object {} before-despawned listener failed: {}", id, e);
            }
        }

        let connections = self.scopes.get(&scope).map(Scope::connections).unwrap_or_default();
        self.broadcaster.broadcast_despawn(scope, id, &connections);

        for listener in object.listeners() {
            if let Err(e) = listener.on_despawned(object).await {
                error!("❌ Object {} despawned listener failed: {}", id, e);
            }
        }
        notify_scope_listeners!(self, scope, "despawned", |listener, ctx| listener.on_despawned(ctx, object));

        if let Some(target) = self.scopes.get_mut(&scope) {
            let still_registered = target
                .objects()
                .get(id)
                .is_some_and(|registered| registered.same_object(object));
            if still_registered {
                target.objects_mut().unregister(id)?;
            }
        }
        debug!("🗑️ Object {} removed from scope {}", id, scope);
        Ok(())
    }

    /// Sends the full state of every object in `scope` to one connection.
    ///
    /// # Returns
    ///
    /// The number of spawn notices queued.
    pub fn sync_existing_objects_to(&self, scope: ScopeId, connection: ConnectionId) -> usize {
        let Some(target) = self.scopes.get(&scope) else {
            return 0;
        };
        let mut sent = 0;
        for (id, handle) in target.objects().iter() {
            if self.broadcaster.sync_object_to(connection, scope, id, handle) {
                sent += 1;
            }
        }
        sent
    }

    /// Sends refresh data of every object in `scope` to one of its members.
    ///
    /// # Arguments
    ///
    /// * `scope` - Scope whose objects are refreshed
    /// * `connection` - Must currently be a member of `scope`
    /// * `context` - Passed through to each object's refresh producer
    pub fn refresh_existing_objects_to(
        &self,
        scope: ScopeId,
        connection: ConnectionId,
        context: &str,
    ) -> Result<usize, ScopeError> {
        let target = self.scopes.get(&scope).ok_or(ScopeError::UnknownScope(scope))?;
        if !target.has_connection(connection) {
            return Err(ScopeError::NotInScope { connection, scope });
        }
        let mut sent = 0;
        for (id, handle) in target.objects().iter() {
            if self.broadcaster.refresh_object_to(connection, scope, id, handle, context) {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Refreshes every object of `scope` to every member.
    pub fn refresh_scope(&self, scope: ScopeId, context: &str) -> Result<usize, ScopeError> {
        let target = self.scopes.get(&scope).ok_or(ScopeError::UnknownScope(scope))?;
        let mut sent = 0;
        for connection in target.connections() {
            sent += self.refresh_existing_objects_to(scope, connection, context)?;
        }
        Ok(sent)
    }
}
