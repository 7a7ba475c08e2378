use crate::*;
use async_trait::async_trait;
use futures::future::{self, FutureExt};
use scope_protocol::{
    ClientMessage, ConnectionId, LoadStatus, ScopeId, ScopeMessage, DEFAULT_PREFAB, LIMBO, LIMBO_PREFAB, MAINTENANCE,
    MAINTENANCE_PREFAB,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(ConnectionId, ScopeMessage)>>,
    closed: Mutex<Vec<ConnectionId>>,
    stopped: AtomicBool,
}

impl RecordingTransport {
    fn sent_to(&self, connection: ConnectionId) -> Vec<ScopeMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| *target == connection)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, connection: ConnectionId, message: ScopeMessage) -> Result<(), ScopeError> {
        self.sent.lock().unwrap().push((connection, message));
        Ok(())
    }

    fn close(&self, connection: ConnectionId) {
        self.closed.lock().unwrap().push(connection);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct Label(&'static str);

impl ReplicatedObject for Label {
    fn full_data(&self, _: ConnectionId) -> Result<Option<Vec<u8>>, HookError> {
        Ok(Some(self.0.as_bytes().to_vec()))
    }

    fn refresh_data(&self, _: ConnectionId, context: &str) -> Result<Option<Vec<u8>>, HookError> {
        Ok(Some(format!("{}:{}", self.0, context).into_bytes()))
    }
}

/// Only visible to odd connection ids.
struct Secret;

impl ReplicatedObject for Secret {
    fn full_data(&self, connection: ConnectionId) -> Result<Option<Vec<u8>>, HookError> {
        Ok((connection % 2 == 1).then(|| b"secret".to_vec()))
    }

    fn refresh_data(&self, _: ConnectionId, _: &str) -> Result<Option<Vec<u8>>, HookError> {
        Ok(None)
    }
}

struct Boulder;

impl ReplicatedObject for Boulder {
    fn full_data(&self, _: ConnectionId) -> Result<Option<Vec<u8>>, HookError> {
        Ok(Some(vec![7; 2000]))
    }

    fn refresh_data(&self, _: ConnectionId, _: &str) -> Result<Option<Vec<u8>>, HookError> {
        Ok(Some(vec![7; 2000]))
    }
}

/// Payload of a fixed size.
struct Filler(usize);

impl ReplicatedObject for Filler {
    fn full_data(&self, _: ConnectionId) -> Result<Option<Vec<u8>>, HookError> {
        Ok(Some(vec![0xFF; self.0]))
    }

    fn refresh_data(&self, _: ConnectionId, _: &str) -> Result<Option<Vec<u8>>, HookError> {
        Ok(None)
    }
}

#[derive(Default)]
struct SpawnTally {
    spawned: AtomicUsize,
    after_spawned: AtomicUsize,
    despawned: AtomicUsize,
}

#[async_trait]
impl ObjectListener for SpawnTally {
    async fn on_spawned(&self, _object: &ObjectHandle) -> HookResult {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_after_spawned(&self, _object: &ObjectHandle) -> HookResult {
        self.after_spawned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_despawned(&self, _object: &ObjectHandle) -> HookResult {
        self.despawned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Journal {
    name: &'static str,
    log: Log,
    fail_load: bool,
    fail_unload: bool,
}

impl Journal {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(format!("{} {}", self.name, entry));
    }
}

#[async_trait]
impl ScopeListener for Journal {
    async fn on_load(&self, ctx: &mut ScopeContext<'_>) -> HookResult {
        self.record(format!("load {}", ctx.scope_id()));
        if self.fail_load {
            return Err(HookError::failed("load refused"));
        }
        Ok(())
    }

    async fn on_unload(&self, ctx: &mut ScopeContext<'_>) -> HookResult {
        self.record(format!("unload {}", ctx.scope_id()));
        if self.fail_unload {
            return Err(HookError::failed("unload refused"));
        }
        Ok(())
    }

    async fn on_joining(&self, _ctx: &mut ScopeContext<'_>, connection: ConnectionId) -> HookResult {
        self.record(format!("join {connection}"));
        Ok(())
    }

    async fn on_leaving(&self, _ctx: &mut ScopeContext<'_>, connection: ConnectionId) -> HookResult {
        self.record(format!("leave {connection}"));
        Ok(())
    }

    async fn on_goodbye(&self, _ctx: &mut ScopeContext<'_>, connection: ConnectionId) -> HookResult {
        self.record(format!("goodbye {connection}"));
        Ok(())
    }

    async fn on_spawned(&self, _ctx: &mut ScopeContext<'_>, object: &ObjectHandle) -> HookResult {
        self.record(format!("spawned {}", object.id().unwrap_or_default()));
        Ok(())
    }

    async fn on_despawned(&self, _ctx: &mut ScopeContext<'_>, object: &ObjectHandle) -> HookResult {
        self.record(format!("despawned {}", object.id().unwrap_or_default()));
        Ok(())
    }
}

/// Unloads its extra scope once the last member leaves.
struct SelfUnloading;

#[async_trait]
impl ScopeListener for SelfUnloading {
    async fn on_leaving(&self, ctx: &mut ScopeContext<'_>, _connection: ConnectionId) -> HookResult {
        if ctx.connections().is_empty() {
            let scope = ctx.scope_id();
            ctx.defer(move |server| {
                async move {
                    let _ = server.unload_extra_scope(scope, true).await;
                }
                .boxed()
            })?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct CountingHooks {
    welcomed: Mutex<Vec<ConnectionId>>,
    load_errors: AtomicUsize,
    unload_errors: AtomicUsize,
}

#[async_trait]
impl ServerHooks for CountingHooks {
    async fn on_welcome(&self, _server: &mut ScopeServer, connection: ConnectionId) -> HookResult {
        self.welcomed.lock().unwrap().push(connection);
        Ok(())
    }

    async fn on_load_error(&self, _error: &ScopeError) -> HookResult {
        self.load_errors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_unload_error(&self, _scope: ScopeId, _error: &ScopeError) -> HookResult {
        self.unload_errors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn journal_scope(name: &'static str, log: &Log, fail_load: bool, fail_unload: bool) -> ScopePrefab {
    let log = log.clone();
    ScopePrefab::with_listeners(name, move || {
        vec![Arc::new(Journal {
            name,
            log: log.clone(),
            fail_load,
            fail_unload,
        }) as Arc<dyn ScopeListener>]
    })
}

fn object_prefabs(builder: CatalogBuilder) -> CatalogBuilder {
    builder
        .object(ObjectPrefab::new(|| Arc::new(Label("crate")) as Arc<dyn ReplicatedObject>).keyed("crate"))
        .object(ObjectPrefab::new(|| Arc::new(Secret) as Arc<dyn ReplicatedObject>).keyed("secret"))
        .object(ObjectPrefab::new(|| Arc::new(Boulder) as Arc<dyn ReplicatedObject>).keyed("boulder"))
}

fn world(log: &Log) -> ServerCatalog {
    object_prefabs(
        ServerCatalog::builder()
            .default_scope(journal_scope("lobby", log, false, false))
            .default_scope(journal_scope("plaza", log, false, false))
            .extra_scope("arena", journal_scope("arena", log, false, false))
            .extra_scope("cave", ScopePrefab::with_listeners("cave", || {
                vec![Arc::new(SelfUnloading) as Arc<dyn ScopeListener>]
            })),
    )
    .build()
    .expect("catalog should be valid")
}

fn server_with(catalog: ServerCatalog) -> (ScopeServer, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let server = create_server(catalog, transport.clone());
    (server, transport)
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn world_load_assigns_ids_in_declared_order() {
    let log = Log::default();
    let (mut server, _) = server_with(world(&log));

    server.load_world().await.expect("world should load");

    assert_eq!(server.status(), LoadStatus::Ready);
    assert_eq!(server.loaded_scopes(), vec![1, 2]);
    assert_eq!(server.scope(1).map(Scope::name), Some("lobby"));
    assert_eq!(server.scope(2).map(Scope::prefab_index), Some(DEFAULT_PREFAB));
    assert_eq!(entries(&log), vec!["lobby load 1", "plaza load 2"]);

    // Loading twice is ignored.
    server.load_world().await.expect("second load is a no-op");
    assert_eq!(entries(&log).len(), 2);
}

#[tokio::test]
async fn failed_world_load_destroys_partial_world() {
    let log = Log::default();
    let catalog = ServerCatalog::builder()
        .default_scope(journal_scope("lobby", &log, false, false))
        .default_scope(journal_scope("broken", &log, true, false))
        .default_scope(journal_scope("never", &log, false, false))
        .build()
        .expect("catalog should be valid");
    let hooks = Arc::new(CountingHooks::default());
    let (server, transport) = server_with(catalog);
    let mut server = server.with_hooks(hooks.clone());

    let error = server.load_world().await.expect_err("load must fail");

    assert!(matches!(error, ScopeError::LoadFailed { scope: 2, .. }));
    assert_eq!(server.status(), LoadStatus::Empty);
    assert!(server.loaded_scopes().is_empty());
    assert!(transport.stopped.load(Ordering::SeqCst));
    assert_eq!(hooks.load_errors.load(Ordering::SeqCst), 1);
    // No unload listeners for a world that never became ready.
    assert_eq!(entries(&log), vec!["lobby load 1", "broken load 2"]);
}

#[tokio::test]
async fn new_connections_are_welcomed_into_limbo() {
    let log = Log::default();
    let hooks = Arc::new(CountingHooks::default());
    let (server, transport) = server_with(world(&log));
    let mut server = server.with_hooks(hooks.clone());

    server.connected(7).await.expect("first connect succeeds");

    assert_eq!(server.membership_of(7), Some(LIMBO));
    assert_eq!(transport.sent_to(7), vec![ScopeMessage::Welcome]);
    assert_eq!(*hooks.welcomed.lock().unwrap(), vec![7]);
    assert!(matches!(
        server.connected(7).await,
        Err(ScopeError::DuplicateConnection(7))
    ));
}

#[tokio::test]
async fn late_joiner_receives_existing_objects() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.load_world().await.expect("world should load");

    for _ in 0..3 {
        let object = server.instantiate_by_key("crate").expect("known prefab");
        server.add_object(1, &object).await.expect("spawn succeeds");
    }
    server.connected(1).await.expect("connect");
    transport.clear();

    server.send_to(1, 1, false).await.expect("transfer succeeds");

    let received = transport.sent_to(1);
    assert_eq!(
        received[0],
        ScopeMessage::MovedToScope {
            prefab_index: DEFAULT_PREFAB,
            scope_index: 1
        }
    );
    let spawned: Vec<_> = received[1..]
        .iter()
        .map(|message| match message {
            ScopeMessage::ObjectSpawned { object_index, payload, .. } => (*object_index, payload.clone()),
            other => panic!("unexpected message {other:?}"),
        })
        .collect();
    assert_eq!(
        spawned,
        vec![
            (1, b"crate".to_vec()),
            (2, b"crate".to_vec()),
            (3, b"crate".to_vec())
        ]
    );
    assert!(entries(&log).contains(&"lobby join 1".to_string()));
}

#[tokio::test]
async fn transfer_to_current_scope_needs_force() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.load_world().await.expect("world should load");
    let object = server.instantiate(0).expect("known prefab");
    server.add_object(1, &object).await.expect("spawn succeeds");
    server.connected(3).await.expect("connect");
    server.send_to(3, 1, false).await.expect("transfer succeeds");
    log.lock().unwrap().clear();
    transport.clear();

    server.send_to(3, 1, false).await.expect("same scope is accepted");
    assert!(transport.sent_to(3).is_empty());
    assert!(entries(&log).is_empty());

    server.send_to(3, 1, true).await.expect("forced transfer succeeds");
    assert_eq!(entries(&log), vec!["lobby leave 3", "lobby join 3"]);
    assert_eq!(transport.sent_to(3).len(), 2);
    assert_eq!(object.id(), Some(1));
}

#[tokio::test]
async fn virtual_scopes_only_get_the_move_notice() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.load_world().await.expect("world should load");
    server.connected(5).await.expect("connect");
    server.send_to(5, 2, false).await.expect("transfer succeeds");
    transport.clear();

    server.send_to_maintenance(5).await.expect("maintenance resolves");

    assert_eq!(server.membership_of(5), Some(MAINTENANCE));
    assert!(!server.scope(2).expect("loaded").has_connection(5));
    assert_eq!(
        transport.sent_to(5),
        vec![ScopeMessage::MovedToScope {
            prefab_index: MAINTENANCE_PREFAB,
            scope_index: MAINTENANCE
        }]
    );
    assert!(matches!(
        server.send_to(5, 99, false).await,
        Err(ScopeError::UnknownScope(99))
    ));
    assert!(matches!(
        server.send_to(6, 1, false).await,
        Err(ScopeError::UnknownConnection(6))
    ));
}

#[tokio::test]
async fn object_ids_are_reused_lowest_first() {
    let log = Log::default();
    let (mut server, _) = server_with(world(&log));
    server.load_world().await.expect("world should load");

    let mut objects = Vec::new();
    for _ in 0..3 {
        let object = server.instantiate(0).expect("known prefab");
        server.add_object(2, &object).await.expect("spawn succeeds");
        objects.push(object);
    }
    server.remove_object(2, &objects[1]).await.expect("despawn succeeds");
    assert!(!objects[1].is_spawned());

    let replacement = server.instantiate(0).expect("known prefab");
    assert_eq!(server.add_object(2, &replacement).await.expect("spawn succeeds"), 2);
    assert_eq!(server.add_object(2, &replacement).await.expect("re-adding is a no-op"), 2);
    assert!(matches!(
        server.add_object(1, &replacement).await,
        Err(ScopeError::AlreadySpawned(2))
    ));
    assert!(matches!(
        server.remove_object(1, &replacement).await,
        Err(ScopeError::BelongsElsewhere { expected: 1, actual: 2 })
    ));
    assert!(entries(&log).contains(&"plaza despawned 2".to_string()));
}

#[tokio::test]
async fn hidden_objects_are_not_sent_to_censored_observers() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.load_world().await.expect("world should load");
    for connection in [1, 2] {
        server.connected(connection).await.expect("connect");
        server.send_to(connection, 1, false).await.expect("transfer");
    }
    transport.clear();

    let secret = server.instantiate_by_key("secret").expect("known prefab");
    server.add_object(1, &secret).await.expect("spawn succeeds");

    assert_eq!(transport.sent_to(1).len(), 1);
    assert!(transport.sent_to(2).is_empty());
}

#[tokio::test]
async fn oversized_spawn_is_rejected_before_sending() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.load_world().await.expect("world should load");
    server.connected(1).await.expect("connect");
    server.send_to(1, 1, false).await.expect("transfer");
    transport.clear();

    let boulder = server.instantiate_by_key("boulder").expect("known prefab");
    let tally = Arc::new(SpawnTally::default());
    boulder.subscribe(tally.clone());
    let error = server.add_object(1, &boulder).await.expect_err("payload is too large");

    assert!(matches!(error, ScopeError::PayloadTooLarge { size: 2000, max: 678 }));
    assert!(!boulder.is_spawned());
    assert!(server.scope(1).expect("loaded").objects().is_empty());
    assert!(transport.sent_to(1).is_empty());

    // Every spawned listener that ran is matched by a despawned one.
    assert_eq!(tally.spawned.load(Ordering::SeqCst), 1);
    assert_eq!(tally.despawned.load(Ordering::SeqCst), 1);
    assert_eq!(tally.after_spawned.load(Ordering::SeqCst), 0);
    let scope_log: Vec<String> = entries(&log).into_iter().filter(|e| e.contains("spawned")).collect();
    assert_eq!(scope_log, vec!["lobby spawned 1", "lobby despawned 1"]);

    // The released id goes to the next object.
    let label = server.instantiate_by_key("crate").expect("known prefab");
    assert_eq!(server.add_object(1, &label).await.expect("spawn succeeds"), 1);
}

#[tokio::test]
async fn largest_payload_spawn_fits_in_one_message() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.load_world().await.expect("world should load");
    server.connected(1).await.expect("connect");
    server.send_to(1, 1, false).await.expect("transfer");
    transport.clear();

    let limit = server.config().max_payload_size();
    let widest = server.adopt(0, Arc::new(Filler(limit))).expect("known prefab");
    server.add_object(1, &widest).await.expect("payload at the limit is accepted");

    let sent = transport.sent_to(1);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload_len(), limit);
    let frame = sent[0].encode().expect("notice encodes");
    assert!(frame.len() <= server.config().effective_message_size());

    let too_wide = server.adopt(0, Arc::new(Filler(limit + 1))).expect("known prefab");
    assert!(matches!(
        server.add_object(1, &too_wide).await,
        Err(ScopeError::PayloadTooLarge { .. })
    ));
}

#[tokio::test]
async fn objects_from_another_server_are_refused() {
    let log = Log::default();
    let (mut server, _) = server_with(world(&log));
    let (other, _) = server_with(world(&log));
    server.load_world().await.expect("world should load");

    let foreign = other.instantiate(0).expect("known prefab");
    assert!(matches!(
        server.add_object(1, &foreign).await,
        Err(ScopeError::ForeignAuthority)
    ));
}

#[tokio::test]
async fn refresh_requires_membership() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.load_world().await.expect("world should load");
    let object = server.instantiate(0).expect("known prefab");
    server.add_object(1, &object).await.expect("spawn succeeds");
    server.connected(4).await.expect("connect");

    assert!(matches!(
        server.refresh_existing_objects_to(1, 4, "tick"),
        Err(ScopeError::NotInScope { connection: 4, scope: 1 })
    ));

    server.send_to(4, 1, false).await.expect("transfer");
    transport.clear();
    assert_eq!(server.refresh_scope(1, "tick").expect("refresh succeeds"), 1);
    assert_eq!(
        transport.sent_to(4),
        vec![ScopeMessage::ObjectRefreshed {
            scope_index: 1,
            object_index: 1,
            payload: b"crate:tick".to_vec()
        }]
    );
}

#[tokio::test]
async fn default_scopes_cannot_be_unloaded_one_by_one() {
    let log = Log::default();
    let (mut server, _) = server_with(world(&log));
    server.load_world().await.expect("world should load");

    assert!(matches!(
        server.unload_extra_scope(1, true).await,
        Err(ScopeError::CannotUnloadDefaultScope(1))
    ));
    assert!(matches!(
        server.unload_extra_scope(0, true).await,
        Err(ScopeError::CannotUnloadDefaultScope(0))
    ));
    assert!(matches!(
        server.unload_extra_scope(40, true).await,
        Err(ScopeError::UnknownScope(40))
    ));
}

#[tokio::test]
async fn extra_scopes_reuse_released_ids() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    assert!(matches!(
        server.load_extra_scope("arena").await,
        Err(ScopeError::WorldNotReady(LoadStatus::Empty))
    ));
    server.load_world().await.expect("world should load");

    let arena = server.load_extra_scope(" arena ").await.expect("arena loads");
    assert_eq!(arena, 3);
    assert!(matches!(
        server.load_extra_scope("nowhere").await,
        Err(ScopeError::UnknownScopeKey(_))
    ));

    server.connected(8).await.expect("connect");
    server.send_to(8, arena, false).await.expect("transfer");
    assert_eq!(
        transport.sent_to(8)[1],
        ScopeMessage::MovedToScope {
            prefab_index: 0,
            scope_index: arena
        }
    );

    let detached = server
        .unload_extra_scope(arena, false)
        .await
        .expect("unload succeeds")
        .expect("detached scope is returned");
    assert_eq!(detached.connection_count(), 0);
    assert_eq!(server.membership_of(8), Some(LIMBO));
    assert_eq!(
        transport.sent_to(8).last(),
        Some(&ScopeMessage::MovedToScope {
            prefab_index: LIMBO_PREFAB,
            scope_index: LIMBO
        })
    );
    assert_eq!(server.load_extra_scope("arena").await.expect("reloads"), 3);
    let reloaded = server.scope(3).expect("loaded");
    assert!(reloaded.instance() > detached.instance());
}

#[tokio::test]
async fn unload_world_keeps_going_after_failures() {
    let log = Log::default();
    let catalog = ServerCatalog::builder()
        .default_scope(journal_scope("fragile", &log, false, true))
        .default_scope(journal_scope("sturdy", &log, false, false))
        .build()
        .expect("catalog should be valid");
    let hooks = Arc::new(CountingHooks::default());
    let (server, transport) = server_with(catalog);
    let mut server = server.with_hooks(hooks.clone());
    server.load_world().await.expect("world should load");
    server.connected(2).await.expect("connect");
    server.send_to(2, 1, false).await.expect("transfer");
    log.lock().unwrap().clear();
    transport.clear();

    server.unload_world().await;

    assert_eq!(server.status(), LoadStatus::Empty);
    assert!(server.loaded_scopes().is_empty());
    assert_eq!(hooks.unload_errors.load(Ordering::SeqCst), 1);
    assert_eq!(entries(&log), vec!["fragile unload 1", "sturdy unload 2"]);
    assert_eq!(server.membership_of(2), Some(LIMBO));
    assert_eq!(
        transport.sent_to(2),
        vec![ScopeMessage::MovedToScope {
            prefab_index: LIMBO_PREFAB,
            scope_index: LIMBO
        }]
    );
}

#[tokio::test]
async fn goodbye_runs_for_the_last_scope() {
    let log = Log::default();
    let (mut server, _) = server_with(world(&log));
    server.load_world().await.expect("world should load");
    server.connected(9).await.expect("connect");
    server.send_to(9, 2, false).await.expect("transfer");

    server.disconnected(9).await;

    assert_eq!(server.membership_of(9), None);
    assert!(!server.scope(2).expect("loaded").has_connection(9));
    assert_eq!(entries(&log).last().map(String::as_str), Some("plaza goodbye 9"));
}

#[tokio::test]
async fn client_local_error_closes_the_connection() {
    let log = Log::default();
    let (mut server, transport) = server_with(world(&log));
    server.connected(11).await.expect("connect");

    server.handle_client_message(11, ClientMessage::LocalError);

    assert_eq!(*transport.closed.lock().unwrap(), vec![11]);
}

#[tokio::test(flavor = "multi_thread")]
async fn deferred_jobs_run_after_the_current_operation() {
    let log = Log::default();
    let (server, _) = server_with(world(&log));
    let (handle, worker) = spawn_server(server);
    handle.load_world().await.expect("world should load");

    let cave = handle.load_extra_scope("cave").await.expect("cave loads");
    handle.connected(1).await.expect("connect");
    handle.send_to(1, cave, false).await.expect("transfer");
    handle.send_to(1, LIMBO, false).await.expect("back to limbo");

    let loaded = handle
        .run(|server| future::ready(server.loaded_scopes()).boxed())
        .await
        .expect("worker is running");
    assert_eq!(loaded, vec![1, 2]);

    drop(handle);
    let server = worker.await.expect("worker exits cleanly");
    assert_eq!(server.status(), LoadStatus::Ready);
}

/// Wraps the built-in transfer steps and then fails, which must not undo them.
struct WrappingHooks {
    log: Log,
}

#[async_trait]
impl ServerHooks for WrappingHooks {
    async fn on_leaving_scope(&self, server: &mut ScopeServer, connection: ConnectionId, scope: ScopeId) -> HookResult {
        self.log.lock().unwrap().push(format!("hook leaving {connection} from {scope}"));
        server.default_on_leaving_scope(connection, scope).await
    }

    async fn on_joining_scope(&self, server: &mut ScopeServer, connection: ConnectionId, scope: ScopeId) -> HookResult {
        server.default_on_joining_scope(connection, scope).await?;
        self.log.lock().unwrap().push(format!("hook joined {connection} to {scope}"));
        Err(HookError::failed("joining hook gave up"))
    }
}

#[tokio::test]
async fn overridden_hooks_wrap_the_builtin_transfer() {
    let log = Log::default();
    let (server, transport) = server_with(world(&log));
    let mut server = server.with_hooks(Arc::new(WrappingHooks { log: log.clone() }));
    server.load_world().await.expect("world should load");
    server.connected(4).await.expect("connect");

    server.send_to(4, 1, false).await.expect("failing hook does not fail the transfer");
    server.send_to(4, 2, false).await.expect("second transfer");

    assert_eq!(server.membership_of(4), Some(2));
    assert!(!server.scope(1).expect("loaded").has_connection(4));
    assert!(server.scope(2).expect("loaded").has_connection(4));
    assert_eq!(
        entries(&log)[2..],
        [
            "hook leaving 4 from 4294967040",
            "lobby join 4",
            "hook joined 4 to 1",
            "hook leaving 4 from 1",
            "lobby leave 4",
            "plaza join 4",
            "hook joined 4 to 2",
        ]
    );
    assert!(transport
        .sent_to(4)
        .contains(&ScopeMessage::MovedToScope {
            prefab_index: DEFAULT_PREFAB,
            scope_index: 2,
        }));
}
