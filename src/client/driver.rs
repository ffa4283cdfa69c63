//! Client event-loop driver
//!
//! Owns a reconciler, the scene and the spawns in flight, and processes one
//! input at a time: an inbound event, a finished spawn, or the loading flag
//! falling. Each input is handled to completion before the next, so the
//! mirror and the visual registry need no further locking.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::mirror::TokenMirror;
use crate::sync::events::SyncEvent;
use crate::token::state::NetworkId;

use super::reconciler::{Reconciler, SpawnOutcome};
use super::spawner::{SpawnRequest, Spawner};
use super::visual::Scene;

type SpawnFuture<V> = BoxFuture<'static, (NetworkId, Result<V>)>;

/// Drives a reconciler from an event channel
pub struct ClientDriver<S: Spawner> {
    reconciler: Reconciler,
    scene: Option<Scene<S::Visual>>,
    spawner: Arc<S>,
    spawn_timeout: Option<Duration>,
    in_flight: FuturesUnordered<SpawnFuture<S::Visual>>,
}

impl<S: Spawner> ClientDriver<S> {
    pub fn new(mirror: Arc<TokenMirror>, scene: Scene<S::Visual>, spawner: Arc<S>) -> Self {
        Self {
            reconciler: Reconciler::new(mirror),
            scene: Some(scene),
            spawner,
            spawn_timeout: None,
            in_flight: FuturesUnordered::new(),
        }
    }

    /// Apply the spawn timeout from configuration
    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.spawn_timeout = config.spawn_timeout();
        self
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn mirror(&self) -> &Arc<TokenMirror> {
        self.reconciler.mirror()
    }

    pub fn scene(&self) -> Option<&Scene<S::Visual>> {
        self.scene.as_ref()
    }

    /// Detach the scene; visual work is dropped until one is attached again
    pub fn detach_scene(&mut self) -> Option<Scene<S::Visual>> {
        self.scene.take()
    }

    pub fn attach_scene(&mut self, scene: Scene<S::Visual>) {
        self.scene = Some(scene);
    }

    pub fn spawns_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Handle one inbound event and start any spawns it requires
    pub fn dispatch(&mut self, event: SyncEvent) {
        let name = event.name();
        match self.reconciler.handle(event, self.scene.as_mut()) {
            Ok(spawns) => self.start_spawns(spawns),
            Err(e) => log_dropped(name, &e),
        }
    }

    /// Run the post-loading full pass
    pub fn loading_finished(&mut self) {
        info!("Scene loading finished, reconciling");
        match self.reconciler.loading_finished(self.scene.as_mut()) {
            Ok(spawns) => self.start_spawns(spawns),
            Err(e) => log_dropped("loading_finished", &e),
        }
    }

    fn start_spawns(&mut self, requests: Vec<SpawnRequest>) {
        for request in requests {
            let network_id = request.network_id.clone();
            let construct = self.spawner.spawn(request);
            let timeout = self.spawn_timeout;
            trace!(network_id = %network_id, "Starting spawn");
            self.in_flight.push(
                async move {
                    let result = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, construct).await {
                            Ok(result) => result,
                            Err(_) => Err(SyncError::SpawnTimeout {
                                network_id: network_id.to_string(),
                            }),
                        },
                        None => construct.await,
                    };
                    (network_id, result)
                }
                .boxed(),
            );
        }
    }

    fn spawn_finished(&mut self, network_id: &NetworkId, result: Result<S::Visual>) {
        match self
            .reconciler
            .complete_spawn(network_id.as_str(), result, self.scene.as_mut())
        {
            Ok(SpawnOutcome::Registered) => {}
            Ok(outcome) => debug!(network_id = %network_id, outcome = ?outcome, "Spawn discarded"),
            Err(e) => log_dropped("spawn_finished", &e),
        }
    }

    /// Wait for every spawn in flight to finish
    pub async fn settle(&mut self) {
        loop {
            let next = self.in_flight.next().await;
            let Some((network_id, result)) = next else {
                break;
            };
            self.spawn_finished(&network_id, result);
        }
    }

    /// Process events until the channel closes or shutdown is signalled
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<SyncEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let mut loading = self.scene.as_ref().map(|scene| scene.loading_gate());
        info!("Client sync driver started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        info!("Event channel closed");
                        break;
                    }
                },
                Some((network_id, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.spawn_finished(&network_id, result);
                }
                finished = wait_loading(&mut loading), if loading.is_some() => {
                    if finished {
                        self.loading_finished();
                    } else {
                        debug!("Loading flag dropped, no longer watching");
                        loading = None;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Client sync driver shutting down");
                    break;
                }
            }
        }

        self.settle().await;
        info!(stats = ?self.reconciler.stats(), "Client sync driver stopped");
        self
    }
}

async fn wait_loading(gate: &mut Option<super::visual::LoadingGate>) -> bool {
    match gate {
        Some(gate) => gate.wait_finished().await,
        None => std::future::pending().await,
    }
}

fn log_dropped(event: &str, error: &SyncError) {
    if error.is_silent() {
        trace!(event = event, error = %error, "Update dropped");
    } else {
        warn!(event = event, error = %error, "Update dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::spawner::MemorySpawner;
    use crate::client::visual::{LoadingFlag, LoadingGate, MemoryVisual};
    use crate::token::state::{IdentityTriple, TokenState, Transform, Vec3};

    fn token(id: &str) -> TokenState {
        TokenState::new(id, IdentityTriple::new("monsters", "goblin")).with_health(10, 10)
    }

    fn state_event(state: &TokenState) -> SyncEvent {
        SyncEvent::TokenStateReceived {
            network_id: state.network_id.clone(),
            snapshot: state.to_snapshot(),
        }
    }

    fn driver(spawner: MemorySpawner, gate: LoadingGate) -> ClientDriver<MemorySpawner> {
        ClientDriver::new(
            Arc::new(TokenMirror::new()),
            Scene::new(gate),
            Arc::new(spawner),
        )
    }

    fn visual<'a>(driver: &'a ClientDriver<MemorySpawner>, id: &str) -> Option<&'a MemoryVisual> {
        driver.scene().and_then(|scene| scene.visuals.get(id))
    }

    #[tokio::test]
    async fn test_dispatch_and_settle() {
        let mut driver = driver(MemorySpawner::new(), LoadingGate::idle());
        driver.dispatch(state_event(&token("a").with_position(Vec3::new(1.0, 0.0, 0.0))));
        assert_eq!(driver.spawns_in_flight(), 1);
        driver.settle().await;

        let visual = visual(&driver, "a").unwrap();
        assert_eq!(visual.state.position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(visual.state.current_health, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_state_events_spawn_once() {
        let mut driver = driver(
            MemorySpawner::new().with_delay(Duration::from_millis(200)),
            LoadingGate::idle(),
        );
        driver.dispatch(state_event(&token("a")));
        driver.dispatch(state_event(&token("a").with_health(2, 10)));
        assert_eq!(driver.spawns_in_flight(), 1);
        driver.settle().await;

        assert_eq!(driver.scene().unwrap().visuals.len(), 1);
        assert_eq!(visual(&driver, "a").unwrap().state.current_health, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_timeout() {
        let config = SyncConfig {
            spawn_timeout_ms: 100,
            ..SyncConfig::default()
        };
        let mut driver = driver(
            MemorySpawner::new().with_delay(Duration::from_secs(5)),
            LoadingGate::idle(),
        )
        .with_config(&config);
        driver.dispatch(state_event(&token("a")));
        driver.settle().await;

        assert!(visual(&driver, "a").is_none());
        assert!(!driver.reconciler().is_spawn_pending("a"));
        assert!(driver.mirror().contains("a"));
    }

    #[tokio::test]
    async fn test_detached_scene_drops_visual_work() {
        let mut driver = driver(MemorySpawner::new(), LoadingGate::idle());
        let scene = driver.detach_scene().unwrap();
        driver.dispatch(state_event(&token("a")));
        assert_eq!(driver.spawns_in_flight(), 0);
        assert!(driver.mirror().contains("a"));

        driver.attach_scene(scene);
        driver.dispatch(SyncEvent::Resync);
        driver.settle().await;
        assert!(visual(&driver, "a").is_some());
    }

    #[tokio::test]
    async fn test_run_processes_events_until_closed() {
        let driver = driver(MemorySpawner::new(), LoadingGate::idle());
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(driver.run(rx, shutdown_rx));

        tx.send(state_event(&token("a"))).await.unwrap();
        tx.send(SyncEvent::TokenTransformReceived {
            network_id: "missing".into(),
            transform: Transform::default(),
        })
        .await
        .unwrap();
        drop(tx);

        let driver = handle.await.unwrap();
        assert!(visual(&driver, "a").is_some());
        assert_eq!(driver.reconciler().stats().transforms_dropped, 1);
    }

    #[tokio::test]
    async fn test_run_reconciles_when_loading_finishes() {
        let flag = LoadingFlag::new(true);
        let driver = driver(MemorySpawner::new(), flag.gate());
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(driver.run(rx, shutdown_rx));

        tx.send(state_event(&token("a"))).await.unwrap();
        tx.send(state_event(&token("b"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        flag.finish();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = shutdown_tx.send(());

        let driver = handle.await.unwrap();
        assert_eq!(driver.scene().unwrap().visuals.len(), 2);
        assert_eq!(driver.reconciler().stats().states_deferred, 2);
    }
}
