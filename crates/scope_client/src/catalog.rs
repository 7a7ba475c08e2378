//! Client prefab tables, positionally aligned with the server catalog.

use crate::error::MirrorError;
use crate::instances::ObjectMirror;
use scope_protocol::{PrefabId, ScopeId, MAX_SCOPES, MAX_SCOPE_PREFABS};
use std::collections::HashSet;
use std::sync::Arc;

/// Client-side materialization of a scope.
pub trait ScopeView: Send + 'static {
    fn on_load(&mut self, _scope: ScopeId) -> Result<(), MirrorError> {
        Ok(())
    }

    fn on_unload(&mut self, _scope: ScopeId) {}
}

/// A view that materializes nothing.
#[derive(Debug, Default)]
pub struct EmptyView;

impl ScopeView for EmptyView {}

pub type ScopeViewFactory = Arc<dyn Fn() -> Box<dyn ScopeView> + Send + Sync>;

pub type MirrorFactory = Arc<dyn Fn() -> Box<dyn ObjectMirror> + Send + Sync>;

/// The three prefab lists, in the same order as on the server.
#[derive(Clone, Default)]
pub struct ClientCatalog {
    default_scopes: Vec<ScopeViewFactory>,
    extra_scopes: Vec<(String, ScopeViewFactory)>,
    objects: Vec<MirrorFactory>,
}

impl ClientCatalog {
    pub fn builder() -> ClientCatalogBuilder {
        ClientCatalogBuilder::default()
    }

    /// Builds the view for default scope `scope` (ids count from 1).
    pub fn default_scope_view(&self, scope: ScopeId) -> Result<Box<dyn ScopeView>, MirrorError> {
        let factory = (scope as usize)
            .checked_sub(1)
            .and_then(|index| self.default_scopes.get(index))
            .ok_or(MirrorError::UnknownDefaultScope(scope))?;
        Ok(factory())
    }

    pub fn extra_scope_view(&self, prefab: PrefabId) -> Result<Box<dyn ScopeView>, MirrorError> {
        let (_, factory) = self
            .extra_scopes
            .get(prefab as usize)
            .ok_or(MirrorError::UnknownScopePrefab(prefab))?;
        Ok(factory())
    }

    /// Key of the extra scope prefab at `prefab`.
    pub fn extra_scope_key(&self, prefab: PrefabId) -> Option<&str> {
        self.extra_scopes.get(prefab as usize).map(|(key, _)| key.as_str())
    }

    pub fn object_factory(&self, prefab: PrefabId) -> Result<&MirrorFactory, MirrorError> {
        self.objects
            .get(prefab as usize)
            .ok_or(MirrorError::UnknownObjectPrefab(prefab))
    }

    pub fn default_scope_count(&self) -> usize {
        self.default_scopes.len()
    }

    pub fn object_prefab_count(&self) -> usize {
        self.objects.len()
    }
}

#[derive(Default)]
pub struct ClientCatalogBuilder {
    default_scopes: Vec<ScopeViewFactory>,
    extra_scopes: Vec<(String, ScopeViewFactory)>,
    objects: Vec<MirrorFactory>,
}

impl ClientCatalogBuilder {
    pub fn default_scope<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ScopeView> + Send + Sync + 'static,
    {
        self.default_scopes.push(Arc::new(factory));
        self
    }

    pub fn extra_scope<F>(mut self, key: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ScopeView> + Send + Sync + 'static,
    {
        self.extra_scopes.push((key.into(), Arc::new(factory)));
        self
    }

    pub fn object<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ObjectMirror> + Send + Sync + 'static,
    {
        self.objects.push(Arc::new(factory));
        self
    }

    /// Applies the same count and key rules as the server catalog.
    pub fn build(self) -> Result<ClientCatalog, MirrorError> {
        if self.default_scopes.len() as u64 >= MAX_SCOPES as u64 {
            return Err(MirrorError::Catalog(format!(
                "{} default scopes exceed the limit",
                self.default_scopes.len()
            )));
        }
        if self.extra_scopes.len() as u64 > MAX_SCOPE_PREFABS as u64 {
            return Err(MirrorError::Catalog(format!(
                "{} extra scope prefabs exceed the limit",
                self.extra_scopes.len()
            )));
        }

        let mut seen = HashSet::new();
        let mut extra_scopes = Vec::with_capacity(self.extra_scopes.len());
        for (key, factory) in self.extra_scopes {
            let key = key.trim().to_string();
            if key.is_empty() || !seen.insert(key.clone()) {
                return Err(MirrorError::Catalog(format!(
                    "extra scope key {key:?} is empty or duplicated"
                )));
            }
            extra_scopes.push((key, factory));
        }

        Ok(ClientCatalog {
            default_scopes: self.default_scopes,
            extra_scopes,
            objects: self.objects,
        })
    }
}
