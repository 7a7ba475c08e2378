//! # Scope Probe
//!
//! Connects to a `scoped` server, mirrors everything it is shown and walks the sample
//! world: each default scope in turn, a fresh extra scope, then Limbo, over and over.
//! A desynchronized mirror reports `LocalError` upstream and ends the probe.

mod tour;

use async_trait::async_trait;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use lib_scoped::config::AppConfig;
use lib_scoped::requests::{Downstream, SampleReply};
use lib_scoped::sample::client_catalog;
use scope_client::{ClientMirror, LocalError, MirrorError, MirrorEvent, MirrorListener, MirrorSession, Uplink};
use scope_protocol::ClientMessage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use tour::Tour;

#[derive(Parser, Debug)]
#[command(name = "scope-probe")]
#[command(about = "Mirrors a scoped server while touring its scopes")]
struct Args {
    /// Server WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// World configuration shared with the server (defaults when missing)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Seconds spent in each stop of the tour
    #[arg(short, long, default_value = "3")]
    stay: u64,

    /// Total run time in seconds
    #[arg(short, long, default_value = "30")]
    duration: u64,
}

/// Upstream half of the socket.
struct SocketUplink {
    frames: mpsc::UnboundedSender<Message>,
}

impl Uplink for SocketUplink {
    fn send(&self, message: ClientMessage) -> Result<(), MirrorError> {
        let bytes = message.encode()?;
        let text = String::from_utf8(bytes).map_err(|e| MirrorError::Uplink(e.to_string()))?;
        self.frames
            .send(Message::Text(text.into()))
            .map_err(|_| MirrorError::Uplink("socket writer is gone".to_string()))
    }

    fn close(&self) {
        if self.frames.send(Message::Close(None)).is_err() {
            debug!("Socket writer already stopped");
        }
    }
}

#[derive(Default)]
struct Tally {
    moves: AtomicU64,
    spawns: AtomicU64,
    refreshes: AtomicU64,
    despawns: AtomicU64,
    failed: AtomicU64,
}

#[async_trait]
impl MirrorListener for Tally {
    async fn on_event(&self, event: &MirrorEvent) {
        match event {
            MirrorEvent::Welcomed => info!("👋 Welcomed"),
            MirrorEvent::Moved { prefab, scope } => {
                self.moves.fetch_add(1, Ordering::Relaxed);
                info!("🗺️ Now in scope {} (prefab {})", scope, prefab);
            }
            MirrorEvent::Spawned { object, .. } => {
                self.spawns.fetch_add(1, Ordering::Relaxed);
                debug!("✨ Cube {} appeared", object);
            }
            MirrorEvent::Refreshed { .. } => {
                self.refreshes.fetch_add(1, Ordering::Relaxed);
            }
            MirrorEvent::Despawned { object, .. } => {
                self.despawns.fetch_add(1, Ordering::Relaxed);
                debug!("💨 Cube {} vanished", object);
            }
        }
    }

    async fn on_local_error(&self, error: &LocalError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        error!("💥 Mirror desynchronized: {}", error);
    }

    async fn on_disconnected(&self) {
        info!("🔌 Server closed the connection");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let args = Args::parse();
    let config = if args.config.exists() {
        AppConfig::load_from_file(&args.config)
            .await
            .map_err(|e| format!("cannot read {}: {e}", args.config.display()))?
    } else {
        AppConfig::default()
    };
    let catalog = Arc::new(client_catalog(&config.world)?);

    info!("🚀 Probing {}", args.url);
    let (ws_stream, _) = connect_async(&args.url).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (frames, mut outbound) = mpsc::unbounded_channel::<Message>();
    let tally = Arc::new(Tally::default());
    let (session, mirror_task) = MirrorSession::spawn(
        ClientMirror::new(catalog),
        Arc::new(SocketUplink { frames: frames.clone() }),
        tally.clone(),
    );

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if let Err(e) = ws_sender.send(frame).await {
                warn!("Send failed: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut tour = Tour::new(&config.world);
    let mut hops = interval(Duration::from_secs(args.stay.max(1)));
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                info!("⏰ Probe time is up");
                break;
            }
            _ = hops.tick() => {
                let Some(stop) = tour.next() else { continue };
                match serde_json::to_string(&stop) {
                    Ok(json) => {
                        info!("🧭 Requesting {:?}", stop);
                        if frames.send(Message::Text(json.into())).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Could not encode {:?}: {}", stop, e),
                }
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Downstream>(text.as_str()) {
                    Ok(Downstream::Scope(message)) => {
                        if session.push(message).is_err() {
                            warn!("Mirror session ended");
                            break;
                        }
                    }
                    Ok(Downstream::Reply(SampleReply::Ok)) => debug!("✅ Request served"),
                    Ok(Downstream::Reply(SampleReply::Error { reason })) => warn!("🚫 Request refused: {}", reason),
                    Err(_) => {
                        // Let the mirror classify it; it reports a malformed message upstream.
                        if session.push_frame(text.as_bytes().to_vec()).is_err() {
                            break;
                        }
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    if session.disconnected().is_err() {
                        debug!("Mirror session already ended");
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    if frames.send(Message::Close(None)).is_err() {
        debug!("Socket writer already stopped");
    }
    drop(frames);
    drop(session);
    let _ = writer.await;
    let mirror = mirror_task.await?;

    info!("📋 Probe summary:");
    info!("   • Scope moves: {}", tally.moves.load(Ordering::Relaxed));
    info!("   • Cubes spawned: {}", tally.spawns.load(Ordering::Relaxed));
    info!("   • Refreshes applied: {}", tally.refreshes.load(Ordering::Relaxed));
    info!("   • Cubes despawned: {}", tally.despawns.load(Ordering::Relaxed));
    info!("   • Final scope: {} with {} cube(s)", mirror.current_scope(), mirror.object_count());
    if tally.failed.load(Ordering::Relaxed) > 0 {
        return Err("mirror desynchronized".into());
    }
    Ok(())
}
