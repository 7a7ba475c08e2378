//! Per-scope object table.

use crate::object::{ObjectHandle, Placement};
use scope_protocol::{IdPool, ObjectId, ProtocolError, ScopeId};
use std::collections::BTreeMap;

/// Maps object ids to objects within one scope and owns the id pool they are drawn from.
///
/// Registration and the handle's placement are updated together, so a registered
/// object always reports this scope and its id, and an unregistered one reports none.
#[derive(Debug)]
pub struct ObjectRegistry {
    scope: ScopeId,
    objects: BTreeMap<ObjectId, ObjectHandle>,
    ids: IdPool,
}

impl ObjectRegistry {
    pub fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            objects: BTreeMap::new(),
            ids: IdPool::new(u32::MAX),
        }
    }

    /// Assigns a fresh id to `object` and records it.
    pub fn register(&mut self, object: &ObjectHandle) -> Result<ObjectId, ProtocolError> {
        let id = self.ids.allocate()?;
        self.objects.insert(id, object.clone());
        object.set_placement(Some(Placement {
            scope: self.scope,
            object: id,
        }));
        Ok(id)
    }

    /// Forgets `id` and releases it back to the pool.
    pub fn unregister(&mut self, id: ObjectId) -> Result<ObjectHandle, ProtocolError> {
        let object = self
            .objects
            .remove(&id)
            .ok_or(ProtocolError::NotAllocated(id))?;
        self.ids.release(id)?;
        object.set_placement(None);
        Ok(object)
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectHandle> {
        self.objects.get(&id)
    }

    /// Objects in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &ObjectHandle)> {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of ids currently drawn from the pool.
    pub fn ids_in_use(&self) -> usize {
        self.ids.in_use()
    }

    /// Detaches every object without notifying anyone.
    pub fn detach_all(&mut self) -> Vec<ObjectHandle> {
        self.ids.reset();
        let objects = std::mem::take(&mut self.objects);
        objects
            .into_values()
            .inspect(|object| object.set_placement(None))
            .collect()
    }
}
