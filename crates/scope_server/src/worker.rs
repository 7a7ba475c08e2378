//! Single-writer queue in front of a [`ScopeServer`].
//!
//! Every request, whichever connection or task it comes from, becomes a job on one
//! unbounded channel. One task owns the server and runs the jobs strictly in submission
//! order, so no two operations ever interleave.

use crate::error::ScopeError;
use crate::object::{ObjectHandle, ReplicatedObject};
use crate::scope::Scope;
use crate::server::ScopeServer;
use futures::future::{self, BoxFuture, FutureExt};
use scope_protocol::{ClientMessage, ConnectionId, LoadStatus, ObjectId, PrefabId, ScopeId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A unit of work run against the server.
pub(crate) type Job = Box<dyn for<'a> FnOnce(&'a mut ScopeServer) -> BoxFuture<'a, ()> + Send>;

/// Starts the worker task that owns `server`.
///
/// # Returns
///
/// A cloneable handle for submitting work, and the worker task. The task ends once
/// every handle is dropped and hands the server back.
pub fn spawn_server(mut server: ScopeServer) -> (ServerHandle, JoinHandle<ScopeServer>) {
    let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
    server.attach_queue(jobs.downgrade());

    let task = tokio::spawn(async move {
        info!("🚀 Scope server worker started");
        let mut processed: u64 = 0;
        while let Some(job) = queue.recv().await {
            job(&mut server).await;
            processed += 1;
        }
        info!("🛑 Scope server worker stopped after {} job(s)", processed);
        server
    });

    (ServerHandle::from_sender(jobs), task)
}

/// Cloneable entry point to a running [`ScopeServer`].
///
/// Do not await a handle from inside a listener or hook: the worker is busy running that
/// listener, so the request could never be served. Use the listener's
/// [`ScopeContext`](crate::ScopeContext) or [`ScopeServer::defer`] instead.
#[derive(Clone)]
pub struct ServerHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl ServerHandle {
    pub(crate) fn from_sender(jobs: mpsc::UnboundedSender<Job>) -> Self {
        Self { jobs }
    }

    /// Queues `job` without waiting for it.
    pub fn submit<F>(&self, job: F) -> Result<(), ScopeError>
    where
        F: for<'s> FnOnce(&'s mut ScopeServer) -> BoxFuture<'s, ()> + Send + 'static,
    {
        self.jobs.send(Box::new(job)).map_err(|_| ScopeError::QueueClosed)
    }

    /// Queues `job` and waits for its result.
    pub async fn run<R, F>(&self, job: F) -> Result<R, ScopeError>
    where
        R: Send + 'static,
        F: for<'s> FnOnce(&'s mut ScopeServer) -> BoxFuture<'s, R> + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.submit(move |server| {
            async move {
                let outcome = job(server).await;
                if reply.send(outcome).is_err() {
                    debug!("📭 Caller stopped waiting for a server job");
                }
            }
            .boxed()
        })?;
        result.await.map_err(|_| ScopeError::QueueClosed)
    }

    /// Returns `true` while the worker is accepting jobs.
    pub fn is_open(&self) -> bool {
        !self.jobs.is_closed()
    }

    pub async fn load_world(&self) -> Result<(), ScopeError> {
        self.run(|server| server.load_world().boxed()).await?
    }

    pub async fn unload_world(&self) -> Result<(), ScopeError> {
        self.run(|server| server.unload_world().boxed()).await
    }

    pub async fn status(&self) -> Result<LoadStatus, ScopeError> {
        self.run(|server| future::ready(server.status()).boxed()).await
    }

    pub async fn load_extra_scope(&self, key: impl Into<String>) -> Result<ScopeId, ScopeError> {
        let key = key.into();
        self.run(move |server| async move { server.load_extra_scope(&key).await }.boxed())
            .await?
    }

    pub async fn unload_extra_scope(&self, scope: ScopeId, destroy: bool) -> Result<Option<Scope>, ScopeError> {
        self.run(move |server| server.unload_extra_scope(scope, destroy).boxed())
            .await?
    }

    pub async fn connected(&self, connection: ConnectionId) -> Result<(), ScopeError> {
        self.run(move |server| server.connected(connection).boxed()).await?
    }

    /// Reports a closed connection; does not wait for the goodbye hooks.
    pub fn disconnected(&self, connection: ConnectionId) -> Result<(), ScopeError> {
        self.submit(move |server| server.disconnected(connection).boxed())
    }

    /// Hands an upstream client message to the server; does not wait.
    pub fn client_message(&self, connection: ConnectionId, message: ClientMessage) -> Result<(), ScopeError> {
        self.submit(move |server| {
            server.handle_client_message(connection, message);
            future::ready(()).boxed()
        })
    }

    pub async fn send_to(&self, connection: ConnectionId, scope: ScopeId, force: bool) -> Result<(), ScopeError> {
        self.run(move |server| server.send_to(connection, scope, force).boxed())
            .await?
    }

    pub async fn membership_of(&self, connection: ConnectionId) -> Result<Option<ScopeId>, ScopeError> {
        self.run(move |server| future::ready(server.membership_of(connection)).boxed())
            .await
    }

    pub async fn instantiate(&self, prefab: PrefabId) -> Result<ObjectHandle, ScopeError> {
        self.run(move |server| future::ready(server.instantiate(prefab)).boxed())
            .await?
    }

    pub async fn adopt(&self, prefab: PrefabId, state: Arc<dyn ReplicatedObject>) -> Result<ObjectHandle, ScopeError> {
        self.run(move |server| future::ready(server.adopt(prefab, state)).boxed())
            .await?
    }

    pub async fn add_object(&self, scope: ScopeId, object: ObjectHandle) -> Result<ObjectId, ScopeError> {
        self.run(move |server| async move { server.add_object(scope, &object).await }.boxed())
            .await?
    }

    pub async fn remove_object(&self, scope: ScopeId, object: ObjectHandle) -> Result<(), ScopeError> {
        self.run(move |server| async move { server.remove_object(scope, &object).await }.boxed())
            .await?
    }

    pub async fn refresh_existing_objects_to(
        &self,
        scope: ScopeId,
        connection: ConnectionId,
        context: impl Into<String>,
    ) -> Result<usize, ScopeError> {
        let context = context.into();
        self.run(move |server| {
            future::ready(server.refresh_existing_objects_to(scope, connection, &context)).boxed()
        })
        .await?
    }

    pub async fn refresh_scope(&self, scope: ScopeId, context: impl Into<String>) -> Result<usize, ScopeError> {
        let context = context.into();
        self.run(move |server| future::ready(server.refresh_scope(scope, &context)).boxed())
            .await?
    }
}
