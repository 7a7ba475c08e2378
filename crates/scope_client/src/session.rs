//! Ordered mirror updates for one connection.
//!
//! A [`MirrorSession`] owns a [`ClientMirror`] on its own task and feeds it the notices of
//! one connection in arrival order. The first local error ends the session: the server is
//! told through the [`Uplink`], the uplink is closed and the listener hears about it.

use crate::error::{ErrorContext, LocalError, MirrorError};
use crate::mirror::{ClientMirror, MirrorEvent};
use async_trait::async_trait;
use scope_protocol::{ClientMessage, ScopeMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Upstream side of the connection.
pub trait Uplink: Send + Sync {
    fn send(&self, message: ClientMessage) -> Result<(), MirrorError>;

    /// Terminates the connection.
    fn close(&self);
}

/// Observer of a running session.
#[async_trait]
pub trait MirrorListener: Send + Sync {
    async fn on_event(&self, _event: &MirrorEvent) {}

    async fn on_local_error(&self, _error: &LocalError) {}

    async fn on_disconnected(&self) {}
}

/// Listener that ignores everything.
pub struct SilentListener;

#[async_trait]
impl MirrorListener for SilentListener {}

enum SessionInput {
    Message(ScopeMessage),
    Frame(Vec<u8>),
    Disconnected,
}

/// Sender side of a running session.
#[derive(Clone)]
pub struct MirrorSession {
    inputs: mpsc::UnboundedSender<SessionInput>,
}

impl MirrorSession {
    /// Starts the session task.
    ///
    /// # Returns
    ///
    /// The session and its task; the task hands the mirror back when the session ends.
    pub fn spawn(
        mirror: ClientMirror,
        uplink: Arc<dyn Uplink>,
        listener: Arc<dyn MirrorListener>,
    ) -> (Self, JoinHandle<ClientMirror>) {
        let (inputs, queue) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(mirror, queue, uplink, listener));
        (Self { inputs }, task)
    }

    /// Queues a decoded notice.
    pub fn push(&self, message: ScopeMessage) -> Result<(), MirrorError> {
        self.enqueue(SessionInput::Message(message))
    }

    /// Queues a raw frame; it is decoded on the session task.
    pub fn push_frame(&self, frame: impl Into<Vec<u8>>) -> Result<(), MirrorError> {
        self.enqueue(SessionInput::Frame(frame.into()))
    }

    /// Reports that the connection closed.
    pub fn disconnected(&self) -> Result<(), MirrorError> {
        self.enqueue(SessionInput::Disconnected)
    }

    pub fn is_open(&self) -> bool {
        !self.inputs.is_closed()
    }

    fn enqueue(&self, input: SessionInput) -> Result<(), MirrorError> {
        self.inputs.send(input).map_err(|_| MirrorError::SessionClosed)
    }
}

async fn run_session(
    mut mirror: ClientMirror,
    mut queue: mpsc::UnboundedReceiver<SessionInput>,
    uplink: Arc<dyn Uplink>,
    listener: Arc<dyn MirrorListener>,
) -> ClientMirror {
    while let Some(input) = queue.recv().await {
        let outcome = match input {
            SessionInput::Message(message) => mirror.apply(message),
            SessionInput::Frame(frame) => match ScopeMessage::decode(&frame) {
                Ok(message) => mirror.apply(message),
                Err(e) => Err(LocalError::new(ErrorContext::MalformedMessage, e.into())),
            },
            SessionInput::Disconnected => {
                info!("🔌 Mirror session disconnected");
                mirror.clear_current_scope();
                listener.on_disconnected().await;
                break;
            }
        };

        match outcome {
            Ok(event) => listener.on_event(&event).await,
            Err(local) => {
                error!("💥 Mirror desynchronized: {}", local);
                if let Err(e) = uplink.send(ClientMessage::LocalError) {
                    warn!("📡 Could not report local error upstream: {}", e);
                }
                uplink.close();
                listener.on_local_error(&local).await;
                break;
            }
        }
    }
    mirror
}
