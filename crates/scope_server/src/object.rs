//! # Replicated Objects
//!
//! An object is created standalone through the server ([`ScopeServer::instantiate`] or
//! [`ScopeServer::adopt`]) and only gains an id once it is added to a scope. The
//! [`ObjectHandle`] is the shared reference application code keeps; the scope's
//! registry holds a clone of it while the object is spawned.
//!
//! ## State production
//!
//! [`ReplicatedObject`] turns application state into payload bytes. Full state may
//! differ per observer: [`ReplicatedObject::full_data_groups`] partitions the observers
//! into groups that share an identical payload, and the broadcaster sends one spawn
//! notice per group.
//!
//! [`ScopeServer::instantiate`]: crate::ScopeServer::instantiate
//! [`ScopeServer::adopt`]: crate::ScopeServer::adopt

use crate::error::{HookError, HookResult};
use async_trait::async_trait;
use scope_protocol::{AuthorityId, ConnectionId, ObjectId, PrefabId, ScopeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Where a spawned object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub scope: ScopeId,
    pub object: ObjectId,
}

/// Observers that receive the same spawn payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnGroup {
    pub connections: Vec<ConnectionId>,
    /// `None` means the object is not shown to these observers.
    pub payload: Option<Vec<u8>>,
}

/// Produces the replicated state of one object.
///
/// Spawn payloads ([`full_data`](Self::full_data)) and refresh payloads
/// ([`refresh_data`](Self::refresh_data)) may use unrelated schemas.
pub trait ReplicatedObject: Send + Sync + 'static {
    /// Full state as seen by `connection`, or `None` to hide the object from it.
    fn full_data(&self, connection: ConnectionId) -> Result<Option<Vec<u8>>, HookError>;

    /// Refresh data for `connection` under `context`, or `None` to skip it.
    fn refresh_data(
        &self,
        connection: ConnectionId,
        context: &str,
    ) -> Result<Option<Vec<u8>>, HookError>;

    /// Partitions `connections` by identical full state.
    ///
    /// The default asks [`full_data`](Self::full_data) once per connection; override it
    /// when whole audiences can be computed at once.
    fn full_data_groups(&self, connections: &[ConnectionId]) -> Result<Vec<SpawnGroup>, HookError> {
        group_by_payload(connections, |connection| self.full_data(connection))
    }
}

/// Groups connections by the payload `produce` returns for each, preserving the order in
/// which distinct payloads first appear.
pub fn group_by_payload<F>(connections: &[ConnectionId], mut produce: F) -> Result<Vec<SpawnGroup>, HookError>
where
    F: FnMut(ConnectionId) -> Result<Option<Vec<u8>>, HookError>,
{
    let mut groups: Vec<SpawnGroup> = Vec::new();
    let mut index: HashMap<Option<Vec<u8>>, usize> = HashMap::new();
    for &connection in connections {
        let payload = produce(connection)?;
        match index.get(&payload) {
            Some(&slot) => groups[slot].connections.push(connection),
            None => {
                index.insert(payload.clone(), groups.len());
                groups.push(SpawnGroup {
                    connections: vec![connection],
                    payload,
                });
            }
        }
    }
    Ok(groups)
}

/// Local lifecycle callbacks of a single object.
///
/// All methods default to no-ops. Failures are logged and never interrupt the spawn or
/// despawn they decorate.
#[async_trait]
pub trait ObjectListener: Send + Sync {
    /// Runs right after the object got its id, before any observer hears of it.
    async fn on_spawned(&self, _object: &ObjectHandle) -> HookResult {
        Ok(())
    }

    /// Runs after the spawn notice went out.
    async fn on_after_spawned(&self, _object: &ObjectHandle) -> HookResult {
        Ok(())
    }

    /// Runs before the despawn notice goes out.
    async fn on_before_despawned(&self, _object: &ObjectHandle) -> HookResult {
        Ok(())
    }

    /// Runs after the despawn notice, while the object still holds its id.
    async fn on_despawned(&self, _object: &ObjectHandle) -> HookResult {
        Ok(())
    }
}

struct ObjectCell {
    prefab: PrefabId,
    authority: AuthorityId,
    placement: Mutex<Option<Placement>>,
    state: Arc<dyn ReplicatedObject>,
    listeners: Mutex<Vec<Arc<dyn ObjectListener>>>,
}

/// Shared reference to a replicated object.
#[derive(Clone)]
pub struct ObjectHandle(Arc<ObjectCell>);

impl ObjectHandle {
    pub(crate) fn new(prefab: PrefabId, authority: AuthorityId, state: Arc<dyn ReplicatedObject>) -> Self {
        Self(Arc::new(ObjectCell {
            prefab,
            authority,
            placement: Mutex::new(None),
            state,
            listeners: Mutex::new(Vec::new()),
        }))
    }

    /// Index of this object's prefab in the object prefab table.
    pub fn prefab_id(&self) -> PrefabId {
        self.0.prefab
    }

    /// Server instance that created this object.
    pub fn authority(&self) -> AuthorityId {
        self.0.authority
    }

    /// Current scope and id, or `None` while the object is standalone.
    pub fn placement(&self) -> Option<Placement> {
        *self.0.placement.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scope(&self) -> Option<ScopeId> {
        self.placement().map(|p| p.scope)
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.placement().map(|p| p.object)
    }

    pub fn is_spawned(&self) -> bool {
        self.placement().is_some()
    }

    /// The state producer behind this handle.
    pub fn state(&self) -> &Arc<dyn ReplicatedObject> {
        &self.0.state
    }

    /// Appends a lifecycle listener. Listeners run in subscription order.
    pub fn subscribe(&self, listener: Arc<dyn ObjectListener>) {
        self.0
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Returns `true` when both handles refer to the same object.
    pub fn same_object(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ObjectListener>> {
        self.0
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_placement(&self, placement: Option<Placement>) {
        *self.0.placement.lock().unwrap_or_else(PoisonError::into_inner) = placement;
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("prefab", &self.0.prefab)
            .field("placement", &self.placement())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Censored;

    impl ReplicatedObject for Censored {
        fn full_data(&self, connection: ConnectionId) -> Result<Option<Vec<u8>>, HookError> {
            Ok(match connection % 3 {
                0 => None,
                1 => Some(b"public".to_vec()),
                _ => Some(b"secret".to_vec()),
            })
        }

        fn refresh_data(&self, _: ConnectionId, _: &str) -> Result<Option<Vec<u8>>, HookError> {
            Ok(None)
        }
    }

    #[test]
    fn observers_are_grouped_by_identical_payload() {
        let groups = Censored.full_data_groups(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(
            groups,
            vec![
                SpawnGroup { connections: vec![1, 4], payload: Some(b"public".to_vec()) },
                SpawnGroup { connections: vec![2, 5], payload: Some(b"secret".to_vec()) },
                SpawnGroup { connections: vec![3, 6], payload: None },
            ]
        );
    }

    #[test]
    fn grouping_propagates_producer_failures() {
        let result = group_by_payload(&[1, 2], |c| {
            if c == 2 {
                Err(HookError::failed("broken"))
            } else {
                Ok(None)
            }
        });
        assert!(matches!(result, Err(HookError::Failed(reason)) if reason == "broken"));
    }

    #[test]
    fn handles_share_placement() {
        let handle = ObjectHandle::new(0, AuthorityId::new(), Arc::new(Censored));
        let other = handle.clone();
        assert!(!other.is_spawned());
        handle.set_placement(Some(Placement { scope: 2, object: 9 }));
        assert_eq!(other.scope(), Some(2));
        assert_eq!(other.id(), Some(9));
        assert!(handle.same_object(&other));
    }
}
