//! # Prefab Catalog
//!
//! Immutable lookup tables built once at startup: the ordered default scope list, the
//! keyed extra scope table and the object prefab table. Client catalogs must list the
//! same prefabs in the same order.

use crate::error::ScopeError;
use crate::object::ReplicatedObject;
use crate::scope::ScopeListener;
use scope_protocol::{PrefabId, MAX_SCOPES, MAX_SCOPE_PREFABS};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Creates the listeners of a freshly instantiated scope.
pub type ListenerFactory = Arc<dyn Fn() -> Vec<Arc<dyn ScopeListener>> + Send + Sync>;

/// Creates the state producer of a freshly instantiated object.
pub type ObjectFactory = Arc<dyn Fn() -> Arc<dyn ReplicatedObject> + Send + Sync>;

/// Blueprint for a scope.
#[derive(Clone)]
pub struct ScopePrefab {
    name: String,
    listeners: ListenerFactory,
    sync_on_join: bool,
}

impl ScopePrefab {
    /// A scope without listeners.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Arc::new(Vec::<Arc<dyn ScopeListener>>::new),
            sync_on_join: true,
        }
    }

    /// A scope whose instances get the listeners `factory` creates.
    pub fn with_listeners<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn ScopeListener>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            listeners: Arc::new(factory),
            sync_on_join: true,
        }
    }

    /// Skips the automatic full-state sync for joining connections.
    pub fn without_initial_sync(mut self) -> Self {
        self.sync_on_join = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sync_on_join(&self) -> bool {
        self.sync_on_join
    }

    pub(crate) fn create_listeners(&self) -> Vec<Arc<dyn ScopeListener>> {
        (self.listeners)()
    }
}

impl fmt::Debug for ScopePrefab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopePrefab")
            .field("name", &self.name)
            .field("sync_on_join", &self.sync_on_join)
            .finish()
    }
}

/// Blueprint for an object.
#[derive(Clone)]
pub struct ObjectPrefab {
    key: Option<String>,
    factory: ObjectFactory,
}

impl ObjectPrefab {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn ReplicatedObject> + Send + Sync + 'static,
    {
        Self {
            key: None,
            factory: Arc::new(factory),
        }
    }

    /// Makes the prefab reachable by `key` as well as by index.
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub(crate) fn create(&self) -> Arc<dyn ReplicatedObject> {
        (self.factory)()
    }
}

impl fmt::Debug for ObjectPrefab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPrefab").field("key", &self.key).finish()
    }
}

/// The server's prefab tables.
#[derive(Debug, Default)]
pub struct ServerCatalog {
    default_scopes: Vec<ScopePrefab>,
    extra_scopes: Vec<(String, ScopePrefab)>,
    extra_by_key: HashMap<String, PrefabId>,
    objects: Vec<ObjectPrefab>,
    objects_by_key: HashMap<String, PrefabId>,
}

impl ServerCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn default_scopes(&self) -> &[ScopePrefab] {
        &self.default_scopes
    }

    pub fn default_scope_count(&self) -> usize {
        self.default_scopes.len()
    }

    /// Resolves an extra scope key to its table index and prefab.
    pub fn extra_scope(&self, key: &str) -> Option<(PrefabId, &ScopePrefab)> {
        let index = *self.extra_by_key.get(key.trim())?;
        self.extra_scopes
            .get(index as usize)
            .map(|(_, prefab)| (index, prefab))
    }

    pub fn extra_scope_keys(&self) -> impl Iterator<Item = &str> {
        self.extra_scopes.iter().map(|(key, _)| key.as_str())
    }

    pub fn object_prefab_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_prefab(&self, index: PrefabId) -> Result<&ObjectPrefab, ScopeError> {
        self.objects
            .get(index as usize)
            .ok_or(ScopeError::ObjectPrefabOutOfRange {
                index,
                count: self.objects.len(),
            })
    }

    /// Resolves an object prefab key to its table index.
    pub fn object_prefab_index(&self, key: &str) -> Result<PrefabId, ScopeError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ScopeError::EmptyKey);
        }
        self.objects_by_key
            .get(key)
            .copied()
            .ok_or_else(|| ScopeError::UnknownObjectKey(key.to_string()))
    }
}

/// Collects prefabs and validates them into a [`ServerCatalog`].
#[derive(Default)]
pub struct CatalogBuilder {
    default_scopes: Vec<ScopePrefab>,
    extra_scopes: Vec<(String, ScopePrefab)>,
    objects: Vec<ObjectPrefab>,
}

impl CatalogBuilder {
    /// Appends a default scope; its scope id will be its position plus one.
    pub fn default_scope(mut self, prefab: ScopePrefab) -> Self {
        self.default_scopes.push(prefab);
        self
    }

    /// Appends a keyed extra scope.
    pub fn extra_scope(mut self, key: impl Into<String>, prefab: ScopePrefab) -> Self {
        self.extra_scopes.push((key.into(), prefab));
        self
    }

    /// Appends an object prefab.
    pub fn object(mut self, prefab: ObjectPrefab) -> Self {
        self.objects.push(prefab);
        self
    }

    /// Validates counts and keys.
    ///
    /// Fails when there are more default scopes than ordinary scope ids, more extra
    /// prefabs than the sentinel band allows, or when a key is empty or duplicated.
    pub fn build(self) -> Result<ServerCatalog, ScopeError> {
        if self.default_scopes.len() as u64 >= MAX_SCOPES as u64 {
            return Err(ScopeError::Catalog(format!(
                "{} default scopes exceed the limit of {}",
                self.default_scopes.len(),
                MAX_SCOPES - 1
            )));
        }
        if self.extra_scopes.len() as u64 > MAX_SCOPE_PREFABS as u64 {
            return Err(ScopeError::Catalog(format!(
                "{} extra scope prefabs exceed the limit of {}",
                self.extra_scopes.len(),
                MAX_SCOPE_PREFABS
            )));
        }

        let mut extra_scopes = Vec::with_capacity(self.extra_scopes.len());
        let mut extra_by_key = HashMap::new();
        for (index, (key, prefab)) in self.extra_scopes.into_iter().enumerate() {
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err(ScopeError::Catalog(format!(
                    "extra scope prefab {index} has an empty key"
                )));
            }
            if extra_by_key.insert(key.clone(), index as PrefabId).is_some() {
                return Err(ScopeError::Catalog(format!(
                    "extra scope key {key:?} is used more than once"
                )));
            }
            extra_scopes.push((key, prefab));
        }

        let mut objects_by_key = HashMap::new();
        let mut objects = Vec::with_capacity(self.objects.len());
        for (index, mut prefab) in self.objects.into_iter().enumerate() {
            if let Some(key) = prefab.key.take() {
                let key = key.trim().to_string();
                if key.is_empty() {
                    return Err(ScopeError::Catalog(format!(
                        "object prefab {index} has an empty key"
                    )));
                }
                if objects_by_key.insert(key.clone(), index as PrefabId).is_some() {
                    return Err(ScopeError::Catalog(format!(
                        "object prefab key {key:?} is used more than once"
                    )));
                }
                prefab.key = Some(key);
            }
            objects.push(prefab);
        }

        Ok(ServerCatalog {
            default_scopes: self.default_scopes,
            extra_scopes,
            extra_by_key,
            objects,
            objects_by_key,
        })
    }
}
