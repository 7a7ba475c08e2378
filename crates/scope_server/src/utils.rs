//! Factory helpers for server instances.

use crate::catalog::ServerCatalog;
use crate::config::ServerConfig;
use crate::server::ScopeServer;
use crate::transport::Transport;
use crate::worker::{spawn_server, ServerHandle};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Creates a server with the default message size limits.
///
/// # Arguments
///
/// * `catalog` - Validated prefab tables
/// * `transport` - Outbound message sink
pub fn create_server(catalog: ServerCatalog, transport: Arc<dyn Transport>) -> ScopeServer {
    ScopeServer::new(ServerConfig::default(), catalog, transport)
}

/// Creates a server with custom limits and starts its worker right away.
///
/// # Returns
///
/// The handle for submitting work and the worker task, which yields the server back once
/// every handle is dropped.
pub fn start_server_with_config(
    config: ServerConfig,
    catalog: ServerCatalog,
    transport: Arc<dyn Transport>,
) -> (ServerHandle, JoinHandle<ScopeServer>) {
    spawn_server(ScopeServer::new(config, catalog, transport))
}
