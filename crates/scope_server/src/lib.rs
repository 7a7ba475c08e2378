//! # Scope Server
//!
//! Authoritative side of scope-based replication. The world is partitioned into
//! *scopes*; every connected client is a member of exactly one scope (or of one of the
//! virtual scopes, Limbo and Maintenance) and is told about the objects of that scope
//! only.
//!
//! ## Architecture Overview
//!
//! * **Catalog** ([`ServerCatalog`]) - default scopes, keyed extra scopes and object prefabs
//! * **Scopes** ([`Scope`]) - member set plus an [`ObjectRegistry`] of spawned objects
//! * **Server** ([`ScopeServer`]) - world lifecycle, membership and object operations
//! * **Broadcaster** ([`Broadcaster`]) - spawn/refresh/despawn notices, size checks
//! * **Worker** ([`spawn_server`], [`ServerHandle`]) - single-writer queue in front of the server
//!
//! ### Message Flow
//!
//! 1. The transport reports a connection; the server places it in Limbo and welcomes it
//! 2. Application code sends the connection to a scope; the client learns the scope's prefab
//! 3. Existing objects are synced, later spawns/refreshes/despawns follow as they happen
//! 4. On disconnect the connection's last scope runs its goodbye listeners
//!
//! ## Extension Points
//!
//! * [`ServerHooks`] - deployment-wide welcome/transfer/goodbye policy and error reports
//! * [`ScopeListener`] - per-scope load, unload, membership and object callbacks
//! * [`ObjectListener`] - per-object spawn and despawn callbacks
//! * [`ReplicatedObject`] - produces the bytes each observer receives
//!
//! ## Thread Safety
//!
//! The server itself is plain `&mut self` state. Concurrency comes from running it on a
//! worker: every [`ServerHandle`] call becomes a job, and jobs never interleave.

pub use broadcast::Broadcaster;
pub use catalog::{CatalogBuilder, ObjectPrefab, ScopePrefab, ServerCatalog};
pub use config::ServerConfig;
pub use context::ScopeContext;
pub use error::{HookError, HookResult, ScopeError};
pub use hooks::{DefaultHooks, ServerHooks};
pub use object::{group_by_payload, ObjectHandle, ObjectListener, Placement, ReplicatedObject, SpawnGroup};
pub use registry::ObjectRegistry;
pub use scope::{Scope, ScopeKind, ScopeListener};
pub use server::ScopeServer;
pub use transport::Transport;
pub use utils::{create_server, start_server_with_config};
pub use worker::{spawn_server, ServerHandle};

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod object;
pub mod registry;
pub mod scope;
pub mod server;
pub mod transport;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod tests;
