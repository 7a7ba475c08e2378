//! World lifecycle: the load/unload state machine and extra scopes.

use super::ScopeServer;
use crate::catalog::ScopePrefab;
use crate::context::ScopeContext;
use crate::error::ScopeError;
use crate::scope::{Scope, ScopeKind};
use scope_protocol::{LoadStatus, ScopeId, LIMBO, LIMBO_PREFAB};
use tracing::{debug, error, info, warn};

impl ScopeServer {
    /// Loads every default scope in declared order.
    ///
    /// A no-op unless the world is empty. If any scope fails to load, every scope created
    /// so far is destroyed without running its unload listeners, the world returns to
    /// empty, the transport is told to stop and the load error is returned.
    pub async fn load_world(&mut self) -> Result<(), ScopeError> {
        if self.status != LoadStatus::Empty {
            debug!("🌍 Ignoring world load while the world is {}", self.status);
            return Ok(());
        }

        info!(
            "🌍 Loading world with {} default scope(s)",
            self.catalog.default_scope_count()
        );
        self.status = LoadStatus::Loading;
        self.scopes.clear();
        self.scope_ids.reset();

        let catalog = self.catalog.clone();
        for (index, prefab) in catalog.default_scopes().iter().enumerate() {
            if let Err(error) = self.load_default_scope(index, prefab).await {
                self.status = LoadStatus::LoadError;
                error!("💥 World load failed: {}", error);

                let hooks = self.hooks.clone();
                if let Err(e) = hooks.on_load_error(&error).await {
                    error!("❌ Load error callback failed: {}", e);
                }

                self.destroy_all_scopes();
                self.status = LoadStatus::Empty;
                warn!("🛑 Stopping the transport after a failed world load");
                self.transport.stop();
                return Err(error);
            }
        }

        self.status = LoadStatus::Ready;
        info!("✅ World ready with {} scope(s)", self.scopes.len());
        Ok(())
    }

    /// Evicts every connection to Limbo, unloads and destroys every scope.
    ///
    /// A no-op unless the world is ready. Unload failures are reported through
    /// [`ServerHooks::on_unload_error`](crate::ServerHooks::on_unload_error) and never stop
    /// the remaining scopes from unloading.
    pub async fn unload_world(&mut self) {
        if self.status != LoadStatus::Ready {
            debug!("🌙 Ignoring world unload while the world is {}", self.status);
            return;
        }

        info!("🌙 Unloading world with {} scope(s)", self.scopes.len());
        self.status = LoadStatus::Unloading;

        for scope in self.loaded_scopes() {
            if !self.scopes.contains_key(&scope) {
                continue;
            }
            self.clear_connections_from_scope(scope);
            self.run_unload_listeners(scope).await;
        }

        self.destroy_all_scopes();
        self.status = LoadStatus::Empty;
        info!("✅ World unloaded");
    }

    /// Instantiates and loads the extra scope registered under `key`.
    ///
    /// # Returns
    ///
    /// The new scope's id. A failed load leaves nothing registered.
    pub async fn load_extra_scope(&mut self, key: &str) -> Result<ScopeId, ScopeError> {
        if self.status != LoadStatus::Ready {
            return Err(ScopeError::WorldNotReady(self.status));
        }

        let catalog = self.catalog.clone();
        let (index, prefab) = catalog
            .extra_scope(key)
            .ok_or_else(|| ScopeError::UnknownScopeKey(key.to_string()))?;

        let key = key.trim().to_string();
        let id = self.scope_ids.allocate()?;
        let scope = Scope::new(
            id,
            ScopeKind::Extra {
                index,
                key: key.clone(),
            },
            prefab.name(),
            prefab.create_listeners(),
            prefab.sync_on_join(),
        );
        self.scopes.insert(id, scope);

        if let Err(error) = self.run_load_listeners(id).await {
            error!("❌ Extra scope {:?} failed to load: {}", key, error);
            self.evict_scope(id);
            return Err(error);
        }

        info!("🧩 Extra scope {:?} loaded as scope {}", key, id);
        Ok(id)
    }

    /// Unloads an extra scope.
    ///
    /// Member connections are moved to Limbo, the unload listeners run, and the scope id
    /// is released.
    ///
    /// # Arguments
    ///
    /// * `scope` - Id of a loaded extra scope
    /// * `destroy` - When `false` the detached, empty scope is handed back
    pub async fn unload_extra_scope(&mut self, scope: ScopeId, destroy: bool) -> Result<Option<Scope>, ScopeError> {
        // Ids up to the default count belong to the default table, 0 included.
        if (scope as usize) <= self.catalog.default_scope_count() {
            return Err(ScopeError::CannotUnloadDefaultScope(scope));
        }
        if !self.scopes.contains_key(&scope) {
            return Err(ScopeError::UnknownScope(scope));
        }

        self.clear_connections_from_scope(scope);
        self.run_unload_listeners(scope).await;
        let removed = self.evict_scope(scope);
        info!("🧩 Extra scope {} unloaded", scope);

        Ok(if destroy { None } else { removed })
    }

    /// Moves every member of `scope` to Limbo without running leave hooks.
    ///
    /// Notification is best-effort per connection.
    ///
    /// # Returns
    ///
    /// The number of connections evicted.
    pub fn clear_connections_from_scope(&mut self, scope: ScopeId) -> usize {
        let Some(target) = self.scopes.get_mut(&scope) else {
            return 0;
        };
        let evicted = target.take_connections();
        for &connection in &evicted {
            if let Some(entry) = self.membership.get_mut(&connection) {
                *entry = LIMBO;
            }
            self.broadcaster.moved_to_scope(connection, LIMBO_PREFAB, LIMBO);
        }
        if !evicted.is_empty() {
            info!(
                "🚪 Moved {} connection(s) from scope {} to limbo",
                evicted.len(),
                scope
            );
        }
        evicted.len()
    }

    async fn load_default_scope(&mut self, index: usize, prefab: &ScopePrefab) -> Result<ScopeId, ScopeError> {
        let id = self.scope_ids.allocate()?;
        let scope = Scope::new(
            id,
            ScopeKind::Default { index },
            prefab.name(),
            prefab.create_listeners(),
            prefab.sync_on_join(),
        );
        self.scopes.insert(id, scope);
        self.run_load_listeners(id).await?;
        debug!("📦 Default scope {} ({}) loaded", id, prefab.name());
        Ok(id)
    }

    async fn run_load_listeners(&mut self, scope: ScopeId) -> Result<(), ScopeError> {
        for listener in self.scope_listeners(scope) {
            let mut context = ScopeContext::new(self, scope);
            listener
                .on_load(&mut context)
                .await
                .map_err(|e| ScopeError::LoadFailed {
                    scope,
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Runs every unload listener; returns how many failed.
    async fn run_unload_listeners(&mut self, scope: ScopeId) -> usize {
        let mut failures = 0;
        for listener in self.scope_listeners(scope) {
            let result = {
                let mut context = ScopeContext::new(self, scope);
                listener.on_unload(&mut context).await
            };
            if let Err(e) = result {
                failures += 1;
                let error = ScopeError::UnloadFailed {
                    scope,
                    source: Box::new(e),
                };
                error!("❌ {}", error);
                let hooks = self.hooks.clone();
                if let Err(e) = hooks.on_unload_error(scope, &error).await {
                    error!("❌ Unload error callback failed: {}", e);
                }
            }
        }
        failures
    }

    /// Removes `scope` after moving its members to Limbo and releases its id.
    fn evict_scope(&mut self, scope: ScopeId) -> Option<Scope> {
        self.clear_connections_from_scope(scope);
        let mut removed = self.scopes.remove(&scope)?;
        removed.dispose();
        if let Err(e) = self.scope_ids.release(scope) {
            warn!("⚠️ Scope id {} was not live on removal: {}", scope, e);
        }
        Some(removed)
    }

    fn destroy_all_scopes(&mut self) {
        for (_, mut scope) in std::mem::take(&mut self.scopes) {
            scope.dispose();
        }
        self.scope_ids.reset();
    }
}
