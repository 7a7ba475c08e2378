//! # Sample World
//!
//! A world of colored cubes. Each default scope starts with the cubes listed in the
//! configuration; every extra scope instance starts with one random cube and unloads
//! itself once its last connection leaves. While a scope is loaded its cubes are
//! shuffled periodically and the new state is refreshed to every member.
//!
//! Both halves of the catalog live here so that their prefab order cannot drift apart:
//! [`build_catalog`] for the server and [`client_catalog`] for mirrors.

use crate::config::{CubeSettings, WorldSettings};
use async_trait::async_trait;
use futures::future::{self, FutureExt};
use rand::seq::SliceRandom;
use rand::Rng;
use scope_client::{ClientCatalog, MirrorError, ObjectMirror, ScopeView};
use scope_protocol::{ConnectionId, Model, ObjectId, ScopeId};
use scope_server::{
    HookError, HookResult, ObjectPrefab, ReplicatedObject, Scope, ScopeContext, ScopeError, ScopeListener,
    ScopePrefab, ServerCatalog, ServerHandle, SpawnGroup,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Object prefab key of the cube.
pub const CUBE_KEY: &str = "cube";

/// Colors a shuffled cube picks from: white, red, green, blue.
const PALETTE: [[u8; 4]; 4] = [
    [255, 255, 255, 255],
    [255, 0, 0, 255],
    [0, 255, 0, 255],
    [0, 0, 255, 255],
];

/// Half-size of the box shuffled cubes are placed in.
const EXTENT: f32 = 4.0;

/// Full state of a cube, sent on spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cube {
    pub color: [u8; 4],
    pub position: [f32; 3],
}

/// Refresh state of a cube.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubeRefresh {
    pub color: [u8; 4],
    pub position: [f32; 3],
}

impl Cube {
    /// A cube with a palette color somewhere inside the shuffle box.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let color = *PALETTE.choose(rng).unwrap_or(&PALETTE[0]);
        let position = [
            rng.gen_range(-EXTENT..=EXTENT),
            rng.gen_range(-EXTENT..=EXTENT),
            rng.gen_range(-EXTENT..=EXTENT),
        ];
        Self { color, position }
    }
}

impl From<CubeSettings> for Cube {
    fn from(settings: CubeSettings) -> Self {
        Self {
            color: settings.color,
            position: settings.position,
        }
    }
}

impl From<Cube> for CubeRefresh {
    fn from(cube: Cube) -> Self {
        Self {
            color: cube.color,
            position: cube.position,
        }
    }
}

impl From<CubeRefresh> for Cube {
    fn from(refresh: CubeRefresh) -> Self {
        Self {
            color: refresh.color,
            position: refresh.position,
        }
    }
}

/// Server-side cube. Every observer sees the same state.
#[derive(Debug)]
pub struct CubeObject {
    state: Mutex<Cube>,
}

impl CubeObject {
    pub fn new(cube: Cube) -> Self {
        Self {
            state: Mutex::new(cube),
        }
    }

    pub fn snapshot(&self) -> Cube {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, cube: Cube) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = cube;
    }

    /// Moves the cube to a random spot and repaints it.
    pub fn shuffle(&self) {
        let cube = Cube::random(&mut rand::thread_rng());
        self.set(cube);
    }
}

impl ReplicatedObject for CubeObject {
    fn full_data(&self, _connection: ConnectionId) -> Result<Option<Vec<u8>>, HookError> {
        Ok(Some(self.snapshot().to_payload()?))
    }

    fn refresh_data(&self, _connection: ConnectionId, _context: &str) -> Result<Option<Vec<u8>>, HookError> {
        Ok(Some(CubeRefresh::from(self.snapshot()).to_payload()?))
    }

    fn full_data_groups(&self, connections: &[ConnectionId]) -> Result<Vec<SpawnGroup>, HookError> {
        if connections.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![SpawnGroup {
            connections: connections.to_vec(),
            payload: Some(self.snapshot().to_payload()?),
        }])
    }
}

enum Seeds {
    Fixed(Vec<Cube>),
    Random(usize),
}

/// Scope behavior of the sample world.
pub struct CubeScope {
    seeds: Seeds,
    refresh_every: Option<Duration>,
    unload_when_empty: bool,
    cubes: Mutex<Vec<Arc<CubeObject>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl CubeScope {
    /// A scope that starts with `cubes`.
    pub fn seeded(cubes: Vec<Cube>, refresh_every: Option<Duration>) -> Self {
        Self::with_seeds(Seeds::Fixed(cubes), refresh_every, false)
    }

    /// A scope with one random cube that unloads itself when it empties.
    pub fn ephemeral(refresh_every: Option<Duration>) -> Self {
        Self::with_seeds(Seeds::Random(1), refresh_every, true)
    }

    fn with_seeds(seeds: Seeds, refresh_every: Option<Duration>, unload_when_empty: bool) -> Self {
        Self {
            seeds,
            refresh_every,
            unload_when_empty,
            cubes: Mutex::new(Vec::new()),
            ticker: Mutex::new(None),
        }
    }

    /// Cubes spawned by the last load.
    pub fn cubes(&self) -> Vec<Arc<CubeObject>> {
        self.cubes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn initial_cubes(&self) -> Vec<Cube> {
        match &self.seeds {
            Seeds::Fixed(cubes) => cubes.clone(),
            Seeds::Random(count) => {
                let mut rng = rand::thread_rng();
                (0..*count).map(|_| Cube::random(&mut rng)).collect()
            }
        }
    }

    fn start_ticker(&self, server: ServerHandle, scope: ScopeId, every: Duration, cubes: Vec<Arc<CubeObject>>) {
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let batch = cubes.clone();
                let outcome = server
                    .run(move |server| {
                        for cube in &batch {
                            cube.shuffle();
                        }
                        future::ready(server.refresh_scope(scope, "")).boxed()
                    })
                    .await;
                match outcome {
                    Ok(Ok(connections)) => trace!("🎲 Scope {} shuffled for {} connection(s)", scope, connections),
                    Ok(Err(ScopeError::UnknownScope(_))) | Err(ScopeError::QueueClosed) => break,
                    Ok(Err(e)) => warn!("🎲 Scope {} refresh failed: {}", scope, e),
                    Err(e) => {
                        warn!("🎲 Scope {} refresh could not be queued: {}", scope, e);
                        break;
                    }
                }
            }
            debug!("⏱️ Refresh ticker for scope {} stopped", scope);
        });

        let previous = self.ticker.lock().unwrap_or_else(PoisonError::into_inner).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_ticker(&self) {
        if let Some(task) = self.ticker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }

    fn unload_if_empty(&self, ctx: &ScopeContext<'_>) -> HookResult {
        if !self.unload_when_empty || !ctx.connections().is_empty() {
            return Ok(());
        }
        let scope = ctx.scope_id();
        let Some(instance) = ctx.scope().map(Scope::instance) else {
            return Ok(());
        };
        ctx.defer(move |server| {
            async move {
                // Someone may have joined in the meantime, or the id now names a newer scope.
                let empty = server
                    .scope(scope)
                    .is_some_and(|s| s.instance() == instance && s.connection_count() == 0);
                if !empty {
                    return;
                }
                match server.unload_extra_scope(scope, true).await {
                    Ok(_) => info!("🧹 Scope {} unloaded after its last connection left", scope),
                    Err(e) => warn!("🧹 Scope {} could not unload itself: {}", scope, e),
                }
            }
            .boxed()
        })?;
        Ok(())
    }
}

impl Drop for CubeScope {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[async_trait]
impl ScopeListener for CubeScope {
    async fn on_load(&self, ctx: &mut ScopeContext<'_>) -> HookResult {
        let prefab = ctx.server().catalog().object_prefab_index(CUBE_KEY)?;
        let mut spawned = Vec::new();
        for cube in self.initial_cubes() {
            let object = Arc::new(CubeObject::new(cube));
            let handle = ctx.adopt(prefab, object.clone())?;
            ctx.add_object(&handle).await?;
            spawned.push(object);
        }
        info!("🧊 Scope {} populated with {} cube(s)", ctx.scope_id(), spawned.len());

        if let Some(every) = self.refresh_every {
            match ctx.server().handle() {
                Some(server) => self.start_ticker(server, ctx.scope_id(), every, spawned.clone()),
                None => warn!("⏱️ Scope {} is not served by a worker; shuffling disabled", ctx.scope_id()),
            }
        }
        *self.cubes.lock().unwrap_or_else(PoisonError::into_inner) = spawned;
        Ok(())
    }

    async fn on_unload(&self, _ctx: &mut ScopeContext<'_>) -> HookResult {
        self.stop_ticker();
        self.cubes.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    async fn on_leaving(&self, ctx: &mut ScopeContext<'_>, _connection: ConnectionId) -> HookResult {
        self.unload_if_empty(ctx)
    }

    async fn on_goodbye(&self, ctx: &mut ScopeContext<'_>, _connection: ConnectionId) -> HookResult {
        self.unload_if_empty(ctx)
    }
}

/// Builds the server catalog for `world`.
pub fn build_catalog(world: &WorldSettings) -> Result<ServerCatalog, ScopeError> {
    let mut builder = ServerCatalog::builder().object(
        ObjectPrefab::new(|| {
            let cube = Cube::random(&mut rand::thread_rng());
            Arc::new(CubeObject::new(cube)) as Arc<dyn ReplicatedObject>
        })
        .keyed(CUBE_KEY),
    );

    for settings in &world.default_scopes {
        let seeds: Vec<Cube> = settings.cubes.iter().copied().map(Cube::from).collect();
        let every = settings.refresh_interval();
        builder = builder.default_scope(ScopePrefab::with_listeners(settings.name.clone(), move || {
            vec![Arc::new(CubeScope::seeded(seeds.clone(), every)) as Arc<dyn ScopeListener>]
        }));
    }

    for settings in &world.extra_scopes {
        let every = settings.refresh_interval();
        builder = builder.extra_scope(
            settings.key.trim(),
            ScopePrefab::with_listeners(settings.key.trim(), move || {
                vec![Arc::new(CubeScope::ephemeral(every)) as Arc<dyn ScopeListener>]
            }),
        );
    }

    builder.build()
}

/// Client-side cube.
#[derive(Debug, Default)]
pub struct CubeMirror {
    pub placement: Option<(ScopeId, ObjectId)>,
    pub cube: Option<Cube>,
    pub refreshes: u64,
}

impl ObjectMirror for CubeMirror {
    fn spawn(&mut self, scope: ScopeId, object: ObjectId, payload: &[u8]) -> Result<(), MirrorError> {
        self.cube = Some(Cube::from_payload(payload)?);
        self.placement = Some((scope, object));
        self.refreshes = 0;
        Ok(())
    }

    fn refresh(&mut self, payload: &[u8]) -> Result<(), MirrorError> {
        self.cube = Some(CubeRefresh::from_payload(payload)?.into());
        self.refreshes += 1;
        Ok(())
    }

    fn despawn(&mut self) {
        self.placement = None;
        self.cube = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Client view of a sample scope; it only logs.
pub struct CubeRoom {
    name: String,
}

impl ScopeView for CubeRoom {
    fn on_load(&mut self, scope: ScopeId) -> Result<(), MirrorError> {
        info!("🏠 Entered '{}' (scope {})", self.name, scope);
        Ok(())
    }

    fn on_unload(&mut self, scope: ScopeId) {
        info!("🚪 Left '{}' (scope {})", self.name, scope);
    }
}

/// Builds the client catalog matching [`build_catalog`] for the same `world`.
pub fn client_catalog(world: &WorldSettings) -> Result<ClientCatalog, MirrorError> {
    let mut builder = ClientCatalog::builder().object(|| Box::new(CubeMirror::default()) as Box<dyn ObjectMirror>);

    for settings in &world.default_scopes {
        let name = settings.name.clone();
        builder = builder.default_scope(move || Box::new(CubeRoom { name: name.clone() }) as Box<dyn ScopeView>);
    }
    for settings in &world.extra_scopes {
        let name = settings.key.trim().to_string();
        builder = builder.extra_scope(settings.key.trim(), move || {
            Box::new(CubeRoom { name: name.clone() }) as Box<dyn ScopeView>
        });
    }

    builder.build()
}
