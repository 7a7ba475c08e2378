//! Deployment-wide extension points of the scope server.
//!
//! The three membership hooks default to the server's built-in transfer behavior
//! ([`ScopeServer::default_on_leaving_scope`] and friends). An override can replace that
//! behavior entirely or wrap it by calling the default from its own body.

use crate::error::{HookResult, ScopeError};
use crate::server::ScopeServer;
use async_trait::async_trait;
use scope_protocol::{ConnectionId, ScopeId};

/// Server-level hooks, invoked from the server queue.
#[async_trait]
pub trait ServerHooks: Send + Sync {
    /// A connection was just placed in Limbo and welcomed.
    async fn on_welcome(&self, _server: &mut ScopeServer, _connection: ConnectionId) -> HookResult {
        Ok(())
    }

    /// First step of a transfer; membership still points at `scope`.
    async fn on_leaving_scope(&self, server: &mut ScopeServer, connection: ConnectionId, scope: ScopeId) -> HookResult {
        server.default_on_leaving_scope(connection, scope).await
    }

    /// Last step of a transfer; membership already points at `scope`.
    async fn on_joining_scope(&self, server: &mut ScopeServer, connection: ConnectionId, scope: ScopeId) -> HookResult {
        server.default_on_joining_scope(connection, scope).await
    }

    /// The connection is gone; `scope` was its last scope and its membership entry is
    /// already deleted.
    async fn on_goodbye(&self, server: &mut ScopeServer, connection: ConnectionId, scope: ScopeId) -> HookResult {
        server.default_on_goodbye(connection, scope).await
    }

    /// Loading the world failed; the server is about to be told to stop.
    async fn on_load_error(&self, _error: &ScopeError) -> HookResult {
        Ok(())
    }

    /// Unloading one scope failed; the unload continues with the next listener or scope.
    async fn on_unload_error(&self, _scope: ScopeId, _error: &ScopeError) -> HookResult {
        Ok(())
    }
}

/// Hooks that keep every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

#[async_trait]
impl ServerHooks for DefaultHooks {}
