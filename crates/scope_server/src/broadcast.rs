//! # Replication Broadcaster
//!
//! Turns object state into spawn, refresh and despawn notices and hands them to the
//! [`Transport`]. Nothing here waits on the network.
//!
//! Payload bounds are enforced per message: a spawn broadcast is checked in full before
//! anything is sent, so an oversized object never reaches part of its audience. Sync and
//! refresh traffic to a single connection is best-effort; a failure is logged and the
//! object skipped.

use crate::error::ScopeError;
use crate::object::ObjectHandle;
use crate::transport::Transport;
use scope_protocol::{ConnectionId, ObjectId, PrefabId, ScopeId, ScopeMessage};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    max_payload: usize,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn Transport>, max_payload: usize) -> Self {
        Self {
            transport,
            max_payload,
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Rejects payloads that would not fit in one message.
    pub fn check_payload(&self, size: usize) -> Result<(), ScopeError> {
        if size > self.max_payload {
            return Err(ScopeError::PayloadTooLarge {
                size,
                max: self.max_payload,
            });
        }
        Ok(())
    }

    /// Best-effort delivery of one notice. Returns whether it was queued.
    pub fn notify(&self, connection: ConnectionId, message: ScopeMessage) -> bool {
        let name = message.name();
        match self.transport.send(connection, message) {
            Ok(()) => true,
            Err(e) => {
                warn!("📡 Could not queue {} for connection {}: {}", name, connection, e);
                false
            }
        }
    }

    pub fn welcome(&self, connection: ConnectionId) -> bool {
        self.notify(connection, ScopeMessage::Welcome)
    }

    pub fn moved_to_scope(&self, connection: ConnectionId, prefab: PrefabId, scope: ScopeId) -> bool {
        self.notify(
            connection,
            ScopeMessage::MovedToScope {
                prefab_index: prefab,
                scope_index: scope,
            },
        )
    }

    /// Sends the full state of a freshly spawned object to `connections`, one notice per
    /// group of identical payloads. Groups without state are skipped.
    ///
    /// # Returns
    ///
    /// The number of connections a spawn notice was queued for.
    pub fn broadcast_spawn(
        &self,
        scope: ScopeId,
        object: ObjectId,
        handle: &ObjectHandle,
        connections: &[ConnectionId],
    ) -> Result<usize, ScopeError> {
        if connections.is_empty() {
            return Ok(0);
        }
        let groups = handle
            .state()
            .full_data_groups(connections)
            .map_err(|e| ScopeError::ObjectState {
                object,
                source: Box::new(e),
            })?;

        let mut outgoing = Vec::with_capacity(groups.len());
        for group in groups {
            let Some(payload) = group.payload else {
                debug!(
                    "🙈 Object {} in scope {} hidden from {} connection(s)",
                    object,
                    scope,
                    group.connections.len()
                );
                continue;
            };
            self.check_payload(payload.len())?;
            outgoing.push((
                group.connections,
                ScopeMessage::ObjectSpawned {
                    scope_index: scope,
                    object_prefab_index: handle.prefab_id(),
                    object_index: object,
                    payload,
                },
            ));
        }

        Ok(outgoing
            .iter()
            .map(|(targets, message)| self.transport.broadcast(targets, message))
            .sum())
    }

    /// Tells `connections` that `object` left the scope.
    pub fn broadcast_despawn(&self, scope: ScopeId, object: ObjectId, connections: &[ConnectionId]) -> usize {
        if connections.is_empty() {
            return 0;
        }
        self.transport.broadcast(
            connections,
            &ScopeMessage::ObjectDespawned {
                scope_index: scope,
                object_index: object,
            },
        )
    }

    /// Sends the full state of an existing object to one connection.
    pub fn sync_object_to(
        &self,
        connection: ConnectionId,
        scope: ScopeId,
        object: ObjectId,
        handle: &ObjectHandle,
    ) -> bool {
        let payload = match handle.state().full_data(connection) {
            Ok(Some(payload)) => payload,
            Ok(None) => return false,
            Err(e) => {
                warn!("❌ Object {} in scope {} failed to produce full data: {}", object, scope, e);
                return false;
            }
        };
        if let Err(e) = self.check_payload(payload.len()) {
            warn!("❌ Not syncing object {} in scope {}: {}", object, scope, e);
            return false;
        }
        self.notify(
            connection,
            ScopeMessage::ObjectSpawned {
                scope_index: scope,
                object_prefab_index: handle.prefab_id(),
                object_index: object,
                payload,
            },
        )
    }

    /// Sends refresh data of an existing object to one connection.
    pub fn refresh_object_to(
        &self,
        connection: ConnectionId,
        scope: ScopeId,
        object: ObjectId,
        handle: &ObjectHandle,
        context: &str,
    ) -> bool {
        let payload = match handle.state().refresh_data(connection, context) {
            Ok(Some(payload)) => payload,
            Ok(None) => return false,
            Err(e) => {
                warn!("❌ Object {} in scope {} failed to produce refresh data: {}", object, scope, e);
                return false;
            }
        };
        if let Err(e) = self.check_payload(payload.len()) {
            warn!("❌ Not refreshing object {} in scope {}: {}", object, scope, e);
            return false;
        }
        self.notify(
            connection,
            ScopeMessage::ObjectRefreshed {
                scope_index: scope,
                object_index: object,
                payload,
            },
        )
    }
}
