//! # Client Mirror
//!
//! Holds at most one materialized scope and the objects spawned in it, and applies
//! server notices to them in order.
//!
//! The mirror never repairs a disagreement with the server. A spawn for an id already in
//! use, or any object notice for a scope other than the current one, fails with a
//! [`LocalError`] and leaves the mirror untouched; the owner is expected to report it and
//! drop the connection.

use crate::catalog::{ClientCatalog, ScopeView};
use crate::error::{ErrorContext, LocalError, MirrorError};
use crate::instances::{InstanceManager, ObjectMirror};
use scope_protocol::{is_virtual_scope, ObjectId, PrefabId, ScopeId, ScopeMessage, DEFAULT_PREFAB, LIMBO};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a successfully applied notice changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    Welcomed,
    Moved { prefab: PrefabId, scope: ScopeId },
    Spawned { scope: ScopeId, object: ObjectId, prefab: PrefabId },
    Refreshed { scope: ScopeId, object: ObjectId },
    Despawned { scope: ScopeId, object: ObjectId },
}

struct Mirrored {
    prefab: PrefabId,
    instance: Box<dyn ObjectMirror>,
}

pub struct ClientMirror {
    catalog: Arc<ClientCatalog>,
    instances: Option<Box<dyn InstanceManager>>,
    current_scope: ScopeId,
    view: Option<Box<dyn ScopeView>>,
    objects: HashMap<ObjectId, Mirrored>,
    spawn_order: Vec<ObjectId>,
}

impl ClientMirror {
    /// Creates a mirror sitting in Limbo.
    pub fn new(catalog: Arc<ClientCatalog>) -> Self {
        Self {
            catalog,
            instances: None,
            current_scope: LIMBO,
            view: None,
            objects: HashMap::new(),
            spawn_order: Vec::new(),
        }
    }

    /// Routes instance creation and release through `manager`.
    pub fn with_instance_manager(mut self, manager: Box<dyn InstanceManager>) -> Self {
        self.instances = Some(manager);
        self
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope
    }

    /// Returns `true` if a real scope is materialized.
    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.objects.contains_key(&object)
    }

    pub fn object(&self, object: ObjectId) -> Option<&dyn ObjectMirror> {
        self.objects.get(&object).map(|mirrored| mirrored.instance.as_ref())
    }

    /// Ids of the mirrored objects, in spawn order.
    pub fn object_ids(&self) -> &[ObjectId] {
        &self.spawn_order
    }

    /// Applies one server notice.
    pub fn apply(&mut self, message: ScopeMessage) -> Result<MirrorEvent, LocalError> {
        match message {
            ScopeMessage::Welcome => {
                self.clear_current_scope();
                debug!("👋 Welcomed into limbo");
                Ok(MirrorEvent::Welcomed)
            }
            ScopeMessage::MovedToScope {
                prefab_index,
                scope_index,
            } => {
                self.move_to(prefab_index, scope_index)
                    .map_err(|e| LocalError::new(ErrorContext::ScopeLoadError, e))?;
                Ok(MirrorEvent::Moved {
                    prefab: prefab_index,
                    scope: scope_index,
                })
            }
            ScopeMessage::ObjectSpawned {
                scope_index,
                object_prefab_index,
                object_index,
                payload,
            } => {
                self.check_scope(scope_index)?;
                self.spawn(scope_index, object_prefab_index, object_index, &payload)
                    .map_err(|e| LocalError::new(ErrorContext::SpawnError, e))?;
                Ok(MirrorEvent::Spawned {
                    scope: scope_index,
                    object: object_index,
                    prefab: object_prefab_index,
                })
            }
            ScopeMessage::ObjectRefreshed {
                scope_index,
                object_index,
                payload,
            } => {
                self.check_scope(scope_index)?;
                let mirrored = self.objects.get_mut(&object_index).ok_or_else(|| {
                    LocalError::new(ErrorContext::RefreshError, MirrorError::UnknownObject(object_index))
                })?;
                mirrored
                    .instance
                    .refresh(&payload)
                    .map_err(|e| LocalError::new(ErrorContext::RefreshError, e))?;
                Ok(MirrorEvent::Refreshed {
                    scope: scope_index,
                    object: object_index,
                })
            }
            ScopeMessage::ObjectDespawned {
                scope_index,
                object_index,
            } => {
                self.check_scope(scope_index)?;
                let mirrored = self.objects.remove(&object_index).ok_or_else(|| {
                    LocalError::new(ErrorContext::DespawnError, MirrorError::UnknownObject(object_index))
                })?;
                self.spawn_order.retain(|id| *id != object_index);
                self.dispose(mirrored);
                Ok(MirrorEvent::Despawned {
                    scope: scope_index,
                    object: object_index,
                })
            }
        }
    }

    /// Despawns every object, newest first, and unloads the current view.
    pub fn clear_current_scope(&mut self) {
        let previous = self.current_scope;
        let order = std::mem::take(&mut self.spawn_order);
        for id in order.into_iter().rev() {
            if let Some(mirrored) = self.objects.remove(&id) {
                self.dispose(mirrored);
            }
        }
        if !self.objects.is_empty() {
            warn!("⚠️ {} mirrored object(s) were missing from the spawn order", self.objects.len());
            let leftovers: Vec<Mirrored> = self.objects.drain().map(|(_, mirrored)| mirrored).collect();
            for mirrored in leftovers {
                self.dispose(mirrored);
            }
        }
        if let Some(mut view) = self.view.take() {
            view.on_unload(previous);
            debug!("🧹 Scope {} torn down", previous);
        }
        self.current_scope = LIMBO;
    }

    fn move_to(&mut self, prefab: PrefabId, scope: ScopeId) -> Result<(), MirrorError> {
        self.clear_current_scope();
        if is_virtual_scope(scope) {
            self.current_scope = scope;
            info!("🌫️ Moved to virtual scope {}", scope);
            return Ok(());
        }

        let mut view = if prefab == DEFAULT_PREFAB {
            self.catalog.default_scope_view(scope)?
        } else {
            self.catalog.extra_scope_view(prefab)?
        };
        view.on_load(scope)?;
        self.view = Some(view);
        self.current_scope = scope;
        info!("🗺️ Materialized scope {} (prefab {})", scope, prefab);
        Ok(())
    }

    fn check_scope(&self, received: ScopeId) -> Result<(), LocalError> {
        if is_virtual_scope(self.current_scope) {
            return Err(LocalError::new(
                ErrorContext::InvalidServerScope,
                MirrorError::InvalidServerScope {
                    current: self.current_scope,
                    received,
                },
            ));
        }
        if received != self.current_scope {
            return Err(LocalError::new(
                ErrorContext::ScopeMismatch,
                MirrorError::ScopeMismatch {
                    current: self.current_scope,
                    received,
                },
            ));
        }
        Ok(())
    }

    fn spawn(&mut self, scope: ScopeId, prefab: PrefabId, object: ObjectId, payload: &[u8]) -> Result<(), MirrorError> {
        if self.objects.contains_key(&object) {
            return Err(MirrorError::AlreadySpawned(object));
        }
        let factory = self.catalog.object_factory(prefab)?;
        let mut instance = match self.instances.as_mut() {
            Some(manager) => manager.acquire(prefab, factory),
            None => factory(),
        };
        // A half-initialized instance is dropped, never pooled.
        instance.spawn(scope, object, payload)?;

        self.objects.insert(object, Mirrored { prefab, instance });
        self.spawn_order.push(object);
        debug!("✨ Object {} (prefab {}) mirrored in scope {}", object, prefab, scope);
        Ok(())
    }

    fn dispose(&mut self, mut mirrored: Mirrored) {
        mirrored.instance.despawn();
        if let Some(manager) = self.instances.as_mut() {
            manager.release(mirrored.prefab, mirrored.instance);
        }
    }
}
