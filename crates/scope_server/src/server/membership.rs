//! Connection-scope membership: arrivals, departures and transfers.

use super::ScopeServer;
use crate::error::{HookResult, ScopeError};
use scope_protocol::{
    is_virtual_scope, virtual_scope_prefab, ClientMessage, ConnectionId, ScopeId, LIMBO, LIMBO_PREFAB, MAINTENANCE,
};
use tracing::{debug, error, info, warn};

impl ScopeServer {
    /// Registers a new connection in Limbo and welcomes it.
    pub async fn connected(&mut self, connection: ConnectionId) -> Result<(), ScopeError> {
        if self.membership.contains_key(&connection) {
            return Err(ScopeError::DuplicateConnection(connection));
        }
        self.membership.insert(connection, LIMBO);
        info!("🔗 Connection {} entered limbo", connection);
        self.broadcaster.welcome(connection);

        let hooks = self.hooks.clone();
        if let Err(e) = hooks.on_welcome(self, connection).await {
            error!("❌ Welcome hook failed for connection {}: {}", connection, e);
        }
        Ok(())
    }

    /// Forgets a connection the transport reported as gone.
    ///
    /// The membership entry is removed first; the goodbye hook then receives the scope
    /// the connection was last in. Unknown connections are ignored.
    pub async fn disconnected(&mut self, connection: ConnectionId) {
        let Some(scope) = self.membership.remove(&connection) else {
            debug!("🔌 Ignoring disconnect of unknown connection {}", connection);
            return;
        };
        info!("🔌 Connection {} left from scope {}", connection, scope);

        let hooks = self.hooks.clone();
        if let Err(e) = hooks.on_goodbye(self, connection, scope).await {
            error!("❌ Goodbye hook failed for connection {}: {}", connection, e);
        }
    }

    /// Handles an upstream message from a client.
    pub fn handle_client_message(&mut self, connection: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::LocalError => {
                warn!("💥 Connection {} reported a local error, closing it", connection);
                self.transport.close(connection);
            }
        }
    }

    /// Moves `connection` into `scope`.
    ///
    /// Runs the leaving hook while membership still points at the old scope, updates the
    /// membership, then runs the joining hook. Hook failures are logged and the transfer
    /// completes anyway.
    ///
    /// # Arguments
    ///
    /// * `connection` - A connected client
    /// * `scope` - A loaded scope, Limbo or Maintenance
    /// * `force` - Re-run the transfer even if the connection is already in `scope`
    pub async fn send_to(&mut self, connection: ConnectionId, scope: ScopeId, force: bool) -> Result<(), ScopeError> {
        if !self.resolves(scope) {
            return Err(ScopeError::UnknownScope(scope));
        }
        let current = self
            .membership_of(connection)
            .ok_or(ScopeError::UnknownConnection(connection))?;
        if current == scope && !force {
            debug!("↪️ Connection {} already in scope {}", connection, scope);
            return Ok(());
        }

        let hooks = self.hooks.clone();
        if let Err(e) = hooks.on_leaving_scope(self, connection, current).await {
            error!("❌ Leaving hook failed for connection {} in scope {}: {}", connection, current, e);
        }

        // Leaving hooks may have disconnected the client.
        let Some(entry) = self.membership.get_mut(&connection) else {
            warn!("⚠️ Connection {} vanished while leaving scope {}", connection, current);
            return Ok(());
        };
        *entry = scope;

        if let Err(e) = hooks.on_joining_scope(self, connection, scope).await {
            error!("❌ Joining hook failed for connection {} in scope {}: {}", connection, scope, e);
        }
        debug!("🚚 Connection {} moved from scope {} to {}", connection, current, scope);
        Ok(())
    }

    pub async fn send_to_limbo(&mut self, connection: ConnectionId) -> Result<(), ScopeError> {
        self.send_to(connection, LIMBO, false).await
    }

    pub async fn send_to_maintenance(&mut self, connection: ConnectionId) -> Result<(), ScopeError> {
        self.send_to(connection, MAINTENANCE, false).await
    }

    /// Built-in leaving behavior: drop the connection from the scope and notify its
    /// leaving listeners. Virtual and already unloaded scopes need nothing.
    pub async fn default_on_leaving_scope(&mut self, connection: ConnectionId, scope: ScopeId) -> HookResult {
        if is_virtual_scope(scope) {
            return Ok(());
        }
        let Some(target) = self.scopes.get_mut(&scope) else {
            return Ok(());
        };
        target.remove_connection(connection);
        notify_scope_listeners!(self, scope, "leaving", |listener, ctx| listener.on_leaving(ctx, connection));
        Ok(())
    }

    /// Built-in joining behavior.
    ///
    /// Virtual scopes only get the move notice. Loaded scopes add the member, announce
    /// the move, sync existing objects when the scope asks for it and notify the joining
    /// listeners. A scope that vanished in the meantime sends the connection to Limbo.
    pub async fn default_on_joining_scope(&mut self, connection: ConnectionId, scope: ScopeId) -> HookResult {
        if let Some(prefab) = virtual_scope_prefab(scope) {
            self.broadcaster.moved_to_scope(connection, prefab, scope);
            return Ok(());
        }

        let Some(target) = self.scopes.get_mut(&scope) else {
            warn!("⚠️ Scope {} is gone, sending connection {} to limbo", scope, connection);
            if let Some(entry) = self.membership.get_mut(&connection) {
                *entry = LIMBO;
            }
            self.broadcaster.moved_to_scope(connection, LIMBO_PREFAB, LIMBO);
            return Ok(());
        };

        target.insert_connection(connection);
        let prefab = target.prefab_index();
        let sync = target.syncs_on_join();
        self.broadcaster.moved_to_scope(connection, prefab, scope);
        if sync {
            let sent = self.sync_existing_objects_to(scope, connection);
            debug!("📦 Synced {} object(s) of scope {} to connection {}", sent, scope, connection);
        }

        notify_scope_listeners!(self, scope, "joining", |listener, ctx| listener.on_joining(ctx, connection));
        Ok(())
    }

    /// Built-in goodbye behavior: drop the departed connection from its last scope and
    /// notify that scope's goodbye listeners.
    pub async fn default_on_goodbye(&mut self, connection: ConnectionId, scope: ScopeId) -> HookResult {
        if is_virtual_scope(scope) {
            return Ok(());
        }
        let Some(target) = self.scopes.get_mut(&scope) else {
            return Ok(());
        };
        target.remove_connection(connection);
        notify_scope_listeners!(self, scope, "goodbye", |listener, ctx| listener.on_goodbye(ctx, connection));
        Ok(())
    }
}
