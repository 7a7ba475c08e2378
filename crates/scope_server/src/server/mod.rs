//! # Scope Server
//!
//! [`ScopeServer`] is the single owner of the scope table, every object registry, the
//! scope id pool and the membership table. All of its mutating operations take
//! `&mut self`; run it behind [`spawn_server`](crate::spawn_server) so that requests from
//! different connections are applied one at a time, in submission order.
//!
//! ## Architecture
//!
//! * **Lifecycle** (`lifecycle.rs`): world load/unload state machine, extra scopes
//! * **Membership** (`membership.rs`): connection to scope map and transfers
//! * **Objects** (`objects.rs`): instantiation, spawn/despawn, sync and refresh
//!
//! Extension code runs inline on the same queue: [`ServerHooks`] for deployment-wide
//! policy and [`ScopeListener`]s per scope.

use crate::broadcast::Broadcaster;
use crate::catalog::ServerCatalog;
use crate::config::ServerConfig;
use crate::error::ScopeError;
use crate::hooks::{DefaultHooks, ServerHooks};
use crate::scope::{Scope, ScopeListener};
use crate::transport::Transport;
use crate::worker::{Job, ServerHandle};
use futures::future::BoxFuture;
use scope_protocol::{
    is_virtual_scope, AuthorityId, ConnectionId, IdPool, LoadStatus, ScopeId, MAX_SCOPES,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Runs `$call` for every listener of `$scope`, logging failures and moving on.
macro_rules! notify_scope_listeners {
    ($server:expr, $scope:expr, $hook:literal, |$listener:ident, $ctx:ident| $call:expr) => {{
        let scope_id: scope_protocol::ScopeId = $scope;
        for $listener in $server.scope_listeners(scope_id) {
            let mut context = $crate::context::ScopeContext::new(&mut *$server, scope_id);
            let $ctx = &mut context;
            if let Err(error) = $call.await {
                tracing::error!("❌ Scope {} {} listener failed: {}", scope_id, $hook, error);
            }
        }
    }};
}

mod lifecycle;
mod membership;
mod objects;

/// Authoritative replication state of one server instance.
pub struct ScopeServer {
    config: ServerConfig,
    catalog: Arc<ServerCatalog>,
    authority: AuthorityId,
    transport: Arc<dyn Transport>,
    broadcaster: Broadcaster,
    hooks: Arc<dyn ServerHooks>,
    status: LoadStatus,
    scopes: BTreeMap<ScopeId, Scope>,
    scope_ids: IdPool,
    membership: HashMap<ConnectionId, ScopeId>,
    queue: Option<mpsc::WeakUnboundedSender<Job>>,
}

impl ScopeServer {
    /// Creates an empty server. Call [`load_world`](Self::load_world) to populate it.
    ///
    /// # Arguments
    ///
    /// * `config` - Message size limits
    /// * `catalog` - Prefab tables, fixed for the server's lifetime
    /// * `transport` - Outbound message sink
    pub fn new(config: ServerConfig, catalog: ServerCatalog, transport: Arc<dyn Transport>) -> Self {
        let broadcaster = Broadcaster::new(transport.clone(), config.max_payload_size());
        Self {
            config,
            catalog: Arc::new(catalog),
            authority: AuthorityId::new(),
            transport,
            broadcaster,
            hooks: Arc::new(DefaultHooks),
            status: LoadStatus::Empty,
            scopes: BTreeMap::new(),
            scope_ids: IdPool::new(MAX_SCOPES),
            membership: HashMap::new(),
            queue: None,
        }
    }

    /// Replaces the server-level hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn ServerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    /// Identity stamped on every object this server instantiates.
    pub fn authority(&self) -> AuthorityId {
        self.authority
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn scope(&self, scope: ScopeId) -> Option<&Scope> {
        self.scopes.get(&scope)
    }

    pub fn scope_mut(&mut self, scope: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(&scope)
    }

    /// Ids of every loaded scope, ascending.
    pub fn loaded_scopes(&self) -> Vec<ScopeId> {
        self.scopes.keys().copied().collect()
    }

    /// Current scope of `connection`, virtual or real.
    pub fn membership_of(&self, connection: ConnectionId) -> Option<ScopeId> {
        self.membership.get(&connection).copied()
    }

    pub fn connection_count(&self) -> usize {
        self.membership.len()
    }

    /// Returns `true` if `scope` is Limbo, Maintenance or a loaded scope.
    pub fn resolves(&self, scope: ScopeId) -> bool {
        is_virtual_scope(scope) || self.scopes.contains_key(&scope)
    }

    /// A handle to the queue this server runs on, if it runs on one.
    pub fn handle(&self) -> Option<ServerHandle> {
        self.queue
            .as_ref()
            .and_then(|queue| queue.upgrade())
            .map(ServerHandle::from_sender)
    }

    /// Queues `job` behind every operation already submitted.
    ///
    /// Fails with [`ScopeError::QueueClosed`] when the server is not running on a
    /// worker.
    pub fn defer<F>(&self, job: F) -> Result<(), ScopeError>
    where
        F: for<'s> FnOnce(&'s mut ScopeServer) -> BoxFuture<'s, ()> + Send + 'static,
    {
        self.handle().ok_or(ScopeError::QueueClosed)?.submit(job)
    }

    pub(crate) fn attach_queue(&mut self, queue: mpsc::WeakUnboundedSender<Job>) {
        self.queue = Some(queue);
    }

    pub(crate) fn scope_listeners(&self, scope: ScopeId) -> Vec<Arc<dyn ScopeListener>> {
        self.scopes
            .get(&scope)
            .map(Scope::listeners)
            .unwrap_or_default()
    }
}
