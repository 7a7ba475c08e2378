//! Navigation requests of the sample world.
//!
//! Besides the replication protocol, a sample client may ask to be moved around:
//!
//! ```json
//! {"goto": "default", "index": 2}
//! {"goto": "extra"}
//! {"goto": "extra", "key": "sample-extra"}
//! {"goto": "limbo"}
//! ```
//!
//! Every request is answered with `{"reply": "ok"}` or
//! `{"reply": "error", "reason": "..."}`, sent after the scope notices it caused.

use futures::future::FutureExt;
use scope_protocol::{ClientMessage, ConnectionId, ScopeId, ScopeMessage, LIMBO};
use scope_server::{ScopeError, ServerHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where a client wants to go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "goto", rename_all = "lowercase")]
pub enum SampleRequest {
    /// A default scope, by id
    #[serde(rename = "default")]
    DefaultScope { index: ScopeId },
    /// A fresh instance of an extra scope; the first configured key when omitted
    #[serde(rename = "extra")]
    ExtraScope {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    Limbo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "lowercase")]
pub enum SampleReply {
    Ok,
    Error { reason: String },
}

/// Anything a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Upstream {
    Protocol(ClientMessage),
    Request(SampleRequest),
}

/// Anything a client may receive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Downstream {
    Scope(ScopeMessage),
    Reply(SampleReply),
}

impl SampleReply {
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                warn!("🔴 Failed to serialize reply: {}", e);
                r#"{"reply":"error","reason":"internal"}"#.to_string()
            }
        }
    }
}

impl From<Result<(), ScopeError>> for SampleReply {
    fn from(outcome: Result<(), ScopeError>) -> Self {
        match outcome {
            Ok(()) => SampleReply::Ok,
            Err(e) => SampleReply::Error { reason: e.to_string() },
        }
    }
}

/// Serves navigation requests against one server.
#[derive(Clone)]
pub struct RequestRouter {
    server: ServerHandle,
    default_extra: Option<String>,
}

impl RequestRouter {
    /// # Arguments
    ///
    /// * `server` - Queue of the replication server
    /// * `default_extra` - Extra scope key used when a request names none
    pub fn new(server: ServerHandle, default_extra: Option<String>) -> Self {
        Self { server, default_extra }
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    /// Moves `connection` as requested.
    pub async fn serve(&self, connection: ConnectionId, request: SampleRequest) -> SampleReply {
        debug!("🧭 Connection {} requested {:?}", connection, request);
        let outcome = match request {
            SampleRequest::DefaultScope { index } => self.goto_default(connection, index).await,
            SampleRequest::ExtraScope { key } => match key.or_else(|| self.default_extra.clone()) {
                Some(key) => self.goto_extra(connection, key).await,
                None => Err(ScopeError::UnknownScopeKey(String::new())),
            },
            SampleRequest::Limbo => self.server.send_to(connection, LIMBO, false).await,
        };
        if let Err(e) = &outcome {
            warn!("🧭 Request from connection {} failed: {}", connection, e);
        }
        outcome.into()
    }

    async fn goto_default(&self, connection: ConnectionId, index: ScopeId) -> Result<(), ScopeError> {
        self.server
            .run(move |server| {
                async move {
                    let is_default = server.scope(index).is_some_and(|scope| scope.kind().is_default());
                    if !is_default {
                        return Err(ScopeError::UnknownScope(index));
                    }
                    server.send_to(connection, index, false).await
                }
                .boxed()
            })
            .await?
    }

    /// Loads a new instance and moves the connection into it in one job, so that nothing
    /// can observe (or unload) the instance while it is still empty.
    async fn goto_extra(&self, connection: ConnectionId, key: String) -> Result<(), ScopeError> {
        self.server
            .run(move |server| {
                async move {
                    let scope = server.load_extra_scope(&key).await?;
                    if let Err(e) = server.send_to(connection, scope, false).await {
                        if let Err(cleanup) = server.unload_extra_scope(scope, true).await {
                            warn!("🧹 Could not discard unused scope {}: {}", scope, cleanup);
                        }
                        return Err(e);
                    }
                    Ok(())
                }
                .boxed()
            })
            .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::sample::build_catalog;
    use futures::future;
    use scope_server::{start_server_with_config, ServerConfig, Transport};
    use std::sync::Arc;

    struct Discard;

    impl Transport for Discard {
        fn send(&self, _connection: ConnectionId, _message: ScopeMessage) -> Result<(), ScopeError> {
            Ok(())
        }

        fn close(&self, _connection: ConnectionId) {}

        fn stop(&self) {}
    }

    #[test]
    fn requests_parse_from_json() {
        let parsed: Upstream = serde_json::from_str(r#"{"goto":"default","index":2}"#).unwrap();
        assert_eq!(parsed, Upstream::Request(SampleRequest::DefaultScope { index: 2 }));

        let parsed: Upstream = serde_json::from_str(r#"{"goto":"extra"}"#).unwrap();
        assert_eq!(parsed, Upstream::Request(SampleRequest::ExtraScope { key: None }));

        let parsed: Upstream = serde_json::from_str(r#"{"goto":"limbo"}"#).unwrap();
        assert_eq!(parsed, Upstream::Request(SampleRequest::Limbo));

        let parsed: Upstream = serde_json::from_str(r#"{"kind":"local_error"}"#).unwrap();
        assert_eq!(parsed, Upstream::Protocol(ClientMessage::LocalError));

        assert!(serde_json::from_str::<Upstream>(r#"{"goto":"moon"}"#).is_err());
    }

    #[test]
    fn replies_serialize_to_the_documented_shape() {
        assert_eq!(SampleReply::Ok.to_json(), r#"{"reply":"ok"}"#);
        let error = SampleReply::Error {
            reason: "nope".to_string(),
        };
        assert_eq!(error.to_json(), r#"{"reply":"error","reason":"nope"}"#);

        let downstream: Downstream = serde_json::from_str(r#"{"reply":"ok"}"#).unwrap();
        assert_eq!(downstream, Downstream::Reply(SampleReply::Ok));
        let downstream: Downstream = serde_json::from_str(r#"{"kind":"welcome"}"#).unwrap();
        assert_eq!(downstream, Downstream::Scope(ScopeMessage::Welcome));
    }

    #[tokio::test]
    async fn navigation_round_trip() {
        let mut world = AppConfig::default().world;
        world.default_scopes.iter_mut().for_each(|s| s.refresh_interval_ms = 0);
        world.extra_scopes.iter_mut().for_each(|s| s.refresh_interval_ms = 0);
        let (handle, _worker) =
            start_server_with_config(ServerConfig::default(), build_catalog(&world).unwrap(), Arc::new(Discard));
        handle.load_world().await.unwrap();
        handle.connected(1).await.unwrap();

        let router = RequestRouter::new(handle.clone(), Some("sample-extra".to_string()));

        assert_eq!(router.serve(1, SampleRequest::DefaultScope { index: 2 }).await, SampleReply::Ok);
        assert_eq!(handle.membership_of(1).await.unwrap(), Some(2));

        assert!(matches!(
            router.serve(1, SampleRequest::DefaultScope { index: 9 }).await,
            SampleReply::Error { .. }
        ));

        assert_eq!(router.serve(1, SampleRequest::ExtraScope { key: None }).await, SampleReply::Ok);
        assert_eq!(handle.membership_of(1).await.unwrap(), Some(3));

        // Extra scopes are not reachable through the default route.
        assert!(matches!(
            router.serve(1, SampleRequest::DefaultScope { index: 3 }).await,
            SampleReply::Error { .. }
        ));

        assert!(matches!(
            router
                .serve(
                    1,
                    SampleRequest::ExtraScope {
                        key: Some("missing".to_string())
                    }
                )
                .await,
            SampleReply::Error { .. }
        ));

        assert_eq!(router.serve(1, SampleRequest::Limbo).await, SampleReply::Ok);
        assert_eq!(handle.membership_of(1).await.unwrap(), Some(LIMBO));

        // The emptied instance unloaded itself.
        let loaded = handle
            .run(|server| future::ready(server.loaded_scopes()).boxed())
            .await
            .unwrap();
        assert_eq!(loaded, vec![1, 2]);

        // Unknown connections leave no stray instance behind.
        assert!(matches!(
            router.serve(42, SampleRequest::ExtraScope { key: None }).await,
            SampleReply::Error { .. }
        ));
        let loaded = handle
            .run(|server| future::ready(server.loaded_scopes()).boxed())
            .await
            .unwrap();
        assert_eq!(loaded, vec![1, 2]);
    }
}
