//! Application lifecycle: startup, serving and phased shutdown.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::error::ServerError;
use crate::logging::display_banner;
use crate::requests::RequestRouter;
use crate::sample::build_catalog;
use crate::shutdown::ShutdownState;
use crate::signals::{setup_signal_handlers, wait_for_signal};
use crate::transport::{accept_loop, ConnectionManager};
use scope_server::{spawn_server, ScopeServer, ServerHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The running host: replication server worker, WebSocket transport and sample world.
///
/// # Architecture
///
/// * **Worker**: one task owns the [`ScopeServer`] and applies requests in order
/// * **Transport**: [`ConnectionManager`] maps connection ids to socket writers
/// * **Acceptor**: one task accepts sockets and spawns a handler per client
pub struct Application {
    config: AppConfig,
    shutdown: ShutdownState,
    manager: Arc<ConnectionManager>,
    server: ServerHandle,
    worker: JoinHandle<ScopeServer>,
}

impl Application {
    /// Loads configuration, applies CLI overrides and starts the server worker.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Returns
    ///
    /// An `Application` ready to run, or an error if the configuration is invalid or
    /// the world catalog cannot be built.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let catalog = build_catalog(&config.world)?;
        let shutdown = ShutdownState::new();
        let manager = Arc::new(ConnectionManager::new(config.server.max_connections, shutdown.clone()));
        let scope_server = ScopeServer::new(config.to_server_config(), catalog, manager.clone());
        let (server, worker) = spawn_server(scope_server);

        Ok(Self {
            config,
            shutdown,
            manager,
            server,
            worker,
        })
    }

    /// Serves clients until a termination signal arrives or the server asks to stop.
    ///
    /// # Returns
    ///
    /// `Ok(())` after a clean shutdown, or an error if the listener could not be bound
    /// or the world failed to load.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Self {
            config,
            shutdown,
            manager,
            server,
            worker,
        } = self;

        log_configuration_summary(&config);

        let listener = TcpListener::bind(&config.server.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {e}", config.server.bind_address)))?;

        info!("🌍 Loading world...");
        if let Err(e) = server.load_world().await {
            error!("❌ World failed to load: {}", e);
            return Err(ServerError::from(e).into());
        }
        info!("✅ World loaded");

        let default_extra = config.world.extra_scopes.first().map(|extra| extra.key.trim().to_string());
        let router = RequestRouter::new(server.clone(), default_extra);
        let acceptor = tokio::spawn(accept_loop(listener, manager.clone(), router, shutdown.clone()));

        info!("✅ Scoped server is now running!");
        info!("🎮 Ready to accept connections on {}", config.server.bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            result = setup_signal_handlers(&shutdown) => result?,
            _ = shutdown.initiated() => warn!("🛑 Shutdown requested by the replication server"),
        }

        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Stopping the acceptor...");
        if tokio::time::timeout(Duration::from_secs(2), acceptor).await.is_err() {
            warn!("⏰ Acceptor did not stop in time");
        }

        info!("🌍 Phase 2: Unloading the world...");
        if let Err(e) = server.unload_world().await {
            error!("❌ World unload failed: {}", e);
        }
        shutdown.complete_shutdown();

        info!("🧹 Phase 3: Closing {} connection(s)...", manager.connection_count());
        manager.close_all("server shutting down");
        drop(server);
        match tokio::time::timeout(Duration::from_secs(5), worker).await {
            Ok(Ok(_)) => info!("✅ Server worker stopped"),
            Ok(Err(e)) => error!("❌ Server worker failed: {}", e),
            Err(_) => warn!("⏰ Server worker did not stop in time; connections may still be draining"),
        }

        info!("✅ Scoped server shutdown complete");
        Ok(())
    }
}

fn log_configuration_summary(config: &AppConfig) {
    info!("📋 Configuration Summary:");
    info!("  🌐 Bind address: {}", config.server.bind_address);
    info!("  👥 Max connections: {}", config.server.max_connections);
    info!(
        "  📦 Max message size: {} bytes ({} byte payloads)",
        config.server.max_message_size,
        config.to_server_config().max_payload_size()
    );
    for (index, scope) in config.world.default_scopes.iter().enumerate() {
        info!(
            "  🗺️  Scope {} '{}': {} cube(s), refresh every {} ms",
            index + 1,
            scope.name,
            scope.cubes.len(),
            scope.refresh_interval_ms
        );
    }
    for extra in &config.world.extra_scopes {
        info!("  🧩 Extra scope '{}': refresh every {} ms", extra.key, extra.refresh_interval_ms);
    }
    info!("  📝 Log level: {}", config.logging.level);
}
