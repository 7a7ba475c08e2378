//! Client-side object mirrors and where their instances come from.
//!
//! Without an [`InstanceManager`] the mirror builds a fresh instance for every spawn and
//! drops it on despawn. [`PooledInstances`] keeps released instances per prefab instead.

use crate::catalog::MirrorFactory;
use crate::error::MirrorError;
use scope_protocol::{ObjectId, PrefabId, ScopeId};
use std::any::Any;
use std::collections::HashMap;
use tracing::trace;

/// Local representation of one replicated object.
pub trait ObjectMirror: Send + 'static {
    /// Initializes the instance from a spawn payload.
    fn spawn(&mut self, scope: ScopeId, object: ObjectId, payload: &[u8]) -> Result<(), MirrorError>;

    /// Applies a refresh payload.
    fn refresh(&mut self, payload: &[u8]) -> Result<(), MirrorError>;

    /// Local teardown before the instance is released.
    fn despawn(&mut self) {}

    fn as_any(&self) -> &dyn Any;
}

/// Source of object mirror instances.
pub trait InstanceManager: Send {
    /// Hands out an instance for `prefab`, built with `factory` if none is available.
    fn acquire(&mut self, prefab: PrefabId, factory: &MirrorFactory) -> Box<dyn ObjectMirror>;

    /// Takes back an instance after its despawn.
    fn release(&mut self, prefab: PrefabId, instance: Box<dyn ObjectMirror>);
}

/// Reuses released instances, up to `capacity` per prefab.
pub struct PooledInstances {
    capacity: usize,
    pools: HashMap<PrefabId, Vec<Box<dyn ObjectMirror>>>,
}

impl PooledInstances {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pools: HashMap::new(),
        }
    }

    /// Number of idle instances kept for `prefab`.
    pub fn idle(&self, prefab: PrefabId) -> usize {
        self.pools.get(&prefab).map_or(0, Vec::len)
    }
}

impl Default for PooledInstances {
    fn default() -> Self {
        Self::new(32)
    }
}

impl InstanceManager for PooledInstances {
    fn acquire(&mut self, prefab: PrefabId, factory: &MirrorFactory) -> Box<dyn ObjectMirror> {
        match self.pools.get_mut(&prefab).and_then(Vec::pop) {
            Some(instance) => {
                trace!("♻️ Reusing pooled instance of prefab {}", prefab);
                instance
            }
            None => factory(),
        }
    }

    fn release(&mut self, prefab: PrefabId, instance: Box<dyn ObjectMirror>) {
        let pool = self.pools.entry(prefab).or_default();
        if pool.len() < self.capacity {
            pool.push(instance);
        }
    }
}
