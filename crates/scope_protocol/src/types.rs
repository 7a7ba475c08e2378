//! # Core Type Definitions
//!
//! Identifiers and reserved values used on both sides of the replication protocol.
//!
//! ## Sentinel band
//!
//! The top of the `u32` range (`0xFFFF_FF00..=0xFFFF_FFFF`) is reserved. Ordinary scope ids are
//! drawn from `1..MAX_SCOPES` and ordinary prefab indices from `0..MAX_SCOPE_PREFABS`, so neither
//! can ever collide with a marker:
//!
//! | value         | as a scope id | as a scope prefab index      |
//! |---------------|---------------|------------------------------|
//! | `0xFFFF_FF00` | [`LIMBO`]       | [`LIMBO_PREFAB`]             |
//! | `0xFFFF_FF01` | [`MAINTENANCE`] | [`MAINTENANCE_PREFAB`]       |
//! | `0xFFFF_FFFF` | -             | [`DEFAULT_PREFAB`]           |

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a loaded scope, unique while the scope is registered.
pub type ScopeId = u32;

/// Identifier of an object, unique only within its owning scope.
pub type ObjectId = u32;

/// Index into a prefab table (scope prefabs or object prefabs).
pub type PrefabId = u32;

/// Opaque connection identifier owned by the transport layer.
pub type ConnectionId = u64;

/// Exclusive upper bound for ordinary scope ids.
pub const MAX_SCOPES: u32 = 0xFFFF_FF00;

/// Exclusive upper bound for extra scope prefab indices.
pub const MAX_SCOPE_PREFABS: u32 = 0xFFFF_FF00;

/// Virtual scope holding connections that see no objects.
pub const LIMBO: ScopeId = 0xFFFF_FF00;

/// Virtual scope used to park connections during service disruption.
pub const MAINTENANCE: ScopeId = 0xFFFF_FF01;

/// Prefab marker meaning "index the default scope list with the scope id".
pub const DEFAULT_PREFAB: PrefabId = 0xFFFF_FFFF;

/// Prefab marker announcing a move into [`LIMBO`].
pub const LIMBO_PREFAB: PrefabId = 0xFFFF_FF00;

/// Prefab marker announcing a move into [`MAINTENANCE`].
pub const MAINTENANCE_PREFAB: PrefabId = 0xFFFF_FF01;

/// Encoded size of the largest notice around an empty payload: an `object_spawned` with
/// every id at `u32::MAX`.
pub const FRAME_OVERHEAD: usize = 122;

/// Smallest transport message size a deployment may configure.
pub const MIN_MESSAGE_SIZE: usize = 512;

/// Transport message size used when nothing else is configured.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1028;

/// Largest object payload whose encoded notice still fits in `message_size` bytes.
///
/// Payloads travel as base64, four characters for every three bytes.
pub const fn max_payload_for(message_size: usize) -> usize {
    message_size.saturating_sub(FRAME_OVERHEAD) / 4 * 3
}

/// Returns `true` for the two virtual scopes, which are never registered and hold no objects.
pub fn is_virtual_scope(scope: ScopeId) -> bool {
    scope == LIMBO || scope == MAINTENANCE
}

/// Returns the prefab marker a move into a virtual scope is announced with.
pub fn virtual_scope_prefab(scope: ScopeId) -> Option<PrefabId> {
    match scope {
        LIMBO => Some(LIMBO_PREFAB),
        MAINTENANCE => Some(MAINTENANCE_PREFAB),
        _ => None,
    }
}

/// World lifecycle status.
///
/// Transitions only along `Empty -> Loading -> Ready -> Unloading -> Empty`, or
/// `Loading -> LoadError -> Empty` when a default scope fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoadStatus {
    #[default]
    Empty,
    Loading,
    LoadError,
    Ready,
    Unloading,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStatus::Empty => "empty",
            LoadStatus::Loading => "loading",
            LoadStatus::LoadError => "load-error",
            LoadStatus::Ready => "ready",
            LoadStatus::Unloading => "unloading",
        };
        f.write_str(name)
    }
}

/// Identity of the server instance that owns a set of objects.
///
/// Objects remember which authority instantiated them so one server never adopts an
/// object created by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorityId(pub Uuid);

impl AuthorityId {
    /// Creates a fresh random authority id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuthorityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_sit_above_ordinary_ids() {
        assert!(LIMBO >= MAX_SCOPES);
        assert!(MAINTENANCE >= MAX_SCOPES);
        assert!(DEFAULT_PREFAB >= MAX_SCOPE_PREFABS);
        assert!(is_virtual_scope(LIMBO));
        assert!(is_virtual_scope(MAINTENANCE));
        assert!(!is_virtual_scope(1));
        assert_eq!(virtual_scope_prefab(LIMBO), Some(LIMBO_PREFAB));
        assert_eq!(virtual_scope_prefab(MAINTENANCE), Some(MAINTENANCE_PREFAB));
        assert_eq!(virtual_scope_prefab(7), None);
    }

    #[test]
    fn authority_ids_are_distinct() {
        assert_ne!(AuthorityId::new(), AuthorityId::new());
    }
}
