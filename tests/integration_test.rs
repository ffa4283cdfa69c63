//! Integration tests for host to client synchronization
//!
//! These tests verify the end-to-end behavior of:
//! - Initial full state per recipient class
//! - Late spawns, transform batching and property updates
//! - Visibility withdrawal and token removal
//! - Convergence over a lossy, reordering transform channel

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, mpsc};

use tablesync::client::{ClientDriver, LoadingFlag, LoadingGate, MemorySpawner, Scene};
use tablesync::config::SyncConfig;
use tablesync::host::Broadcaster;
use tablesync::mirror::TokenMirror;
use tablesync::net::{LoopbackLink, LoopbackRouter};
use tablesync::sync::{OutboundMessage, RecipientId};
use tablesync::token::{IdentityTriple, RecipientClass, TokenState, Transform, Vec3};

const GM: RecipientId = 1;
const PLAYER: RecipientId = 2;

struct Client {
    id: RecipientId,
    link: LoopbackLink,
    driver: ClientDriver<MemorySpawner>,
}

/// Host plus clients pumped synchronously through loopback links
struct Table {
    host: Broadcaster,
    clients: Vec<Client>,
}

impl Table {
    fn new() -> Self {
        Self {
            host: Broadcaster::new(Arc::new(TokenMirror::new())),
            clients: Vec::new(),
        }
    }

    async fn join(&mut self, id: RecipientId, class: RecipientClass, link: LoopbackLink) {
        self.join_with_gate(id, class, link, LoadingGate::idle()).await;
    }

    async fn join_with_gate(
        &mut self,
        id: RecipientId,
        class: RecipientClass,
        link: LoopbackLink,
        gate: LoadingGate,
    ) {
        let driver = ClientDriver::new(
            Arc::new(TokenMirror::new()),
            Scene::new(gate),
            Arc::new(MemorySpawner::new()),
        );
        self.clients.push(Client { id, link, driver });
        let full_state = self.host.join(id, class);
        self.pump(vec![full_state]).await;
    }

    async fn pump(&mut self, messages: Vec<OutboundMessage>) {
        for message in messages {
            let client = self
                .clients
                .iter_mut()
                .find(|c| c.id == message.recipient)
                .expect("message for unknown recipient");
            for event in client.link.deliver(message.event) {
                client.driver.dispatch(event);
            }
        }
        for client in &mut self.clients {
            client.driver.settle().await;
        }
    }

    async fn place(&mut self, state: TokenState) {
        let (_, messages) = self.host.place(state);
        self.pump(messages).await;
    }

    async fn flush(&mut self) {
        let batches = self.host.flush_transforms();
        self.pump(batches).await;
    }

    fn client(&self, id: RecipientId) -> &ClientDriver<MemorySpawner> {
        &self
            .clients
            .iter()
            .find(|c| c.id == id)
            .expect("unknown client")
            .driver
    }

    fn visual_ids(&self, id: RecipientId) -> Vec<String> {
        self.client(id)
            .scene()
            .map(|scene| scene.visuals.ids().iter().map(|id| id.to_string()).collect())
            .unwrap_or_default()
    }
}

fn token(id: &str) -> TokenState {
    TokenState::new(id, IdentityTriple::new("monsters", "goblin")).with_health(7, 7)
}

/// Test that a joining recipient receives exactly the tokens it may see
#[tokio::test]
async fn test_join_receives_filtered_full_state() {
    let mut table = Table::new();
    table.host.place(token("goblin"));
    table.host.place(token("ambush").with_visibility(false, false));
    table.host.place(token("gm-blind").with_visibility(true, true));

    table.join(GM, RecipientClass::Gm, LoopbackLink::perfect()).await;
    table.join(PLAYER, RecipientClass::Player, LoopbackLink::perfect()).await;

    assert_eq!(table.visual_ids(GM), vec!["ambush", "goblin"]);
    assert_eq!(table.visual_ids(PLAYER), vec!["gm-blind", "goblin"]);
}

/// Test that a token placed mid-session spawns at its state and then follows transforms
#[tokio::test]
async fn test_late_spawn_then_move() {
    let mut table = Table::new();
    table.join(GM, RecipientClass::Gm, LoopbackLink::perfect()).await;
    table.join(PLAYER, RecipientClass::Player, LoopbackLink::perfect()).await;

    table
        .place(token("goblin").with_position(Vec3::new(1.0, 0.0, 1.0)))
        .await;
    for id in [GM, PLAYER] {
        let visual = table.client(id).scene().unwrap().visuals.get("goblin").unwrap();
        assert_eq!(visual.state.position, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(visual.interpolation_target, None);
    }

    let messages = table
        .host
        .move_token("goblin", Transform::at(Vec3::new(4.0, 0.0, 2.0)));
    assert!(messages.is_empty(), "moves travel in batches only");
    table.flush().await;

    for id in [GM, PLAYER] {
        let visual = table.client(id).scene().unwrap().visuals.get("goblin").unwrap();
        assert_eq!(visual.target().position, Vec3::new(4.0, 0.0, 2.0));
        assert_eq!(table.client(id).reconciler().stats().transforms_applied, 1);
    }
}

/// Test that property changes reach every knowing recipient as full overwrites
#[tokio::test]
async fn test_damage_propagates() {
    let mut table = Table::new();
    table.join(GM, RecipientClass::Gm, LoopbackLink::perfect()).await;
    table.join(PLAYER, RecipientClass::Player, LoopbackLink::perfect()).await;
    table.place(token("goblin")).await;

    let messages = table.host.update("goblin", |t| {
        t.current_health = 2;
        t.add_status_effect("prone");
    });
    assert_eq!(messages.len(), 2);
    table.pump(messages).await;

    for id in [GM, PLAYER] {
        let client = table.client(id);
        let mirrored = client.mirror().get("goblin").unwrap();
        assert_eq!(mirrored.current_health, 2);
        assert_eq!(mirrored.status_effects, vec!["prone".to_string()]);
        let visual = client.scene().unwrap().visuals.get("goblin").unwrap();
        assert_eq!(visual.state.current_health, 2);
    }
}

/// Test that hiding a token withdraws it from players without leaking later updates
#[tokio::test]
async fn test_hide_withdraws_from_players() {
    let mut table = Table::new();
    table.join(GM, RecipientClass::Gm, LoopbackLink::perfect()).await;
    table.join(PLAYER, RecipientClass::Player, LoopbackLink::perfect()).await;
    table.place(token("ogre")).await;

    let messages = table.host.update("ogre", |t| t.is_visible_to_players = false);
    table.pump(messages).await;
    assert!(table.visual_ids(PLAYER).is_empty());
    assert!(!table.client(PLAYER).mirror().contains("ogre"));
    assert_eq!(table.visual_ids(GM), vec!["ogre"]);

    table.host.move_token("ogre", Transform::at(Vec3::ONE));
    let messages = table.host.update("ogre", |t| t.current_health = 1);
    assert!(messages.iter().all(|m| m.recipient == GM));
    table.pump(messages).await;
    table.flush().await;

    assert!(!table.client(PLAYER).mirror().contains("ogre"));
    assert_eq!(table.client(PLAYER).reconciler().stats().transforms_dropped, 0);

    // Revealing again spawns it back for players
    let messages = table.host.update("ogre", |t| t.is_visible_to_players = true);
    table.pump(messages).await;
    assert_eq!(table.visual_ids(PLAYER), vec!["ogre"]);
    assert_eq!(
        table.client(PLAYER).mirror().get("ogre").unwrap().current_health,
        1
    );
}

/// Test that removal tears down visuals and late transforms are ignored
#[tokio::test]
async fn test_removal_propagates() {
    let mut table = Table::new();
    table.join(GM, RecipientClass::Gm, LoopbackLink::perfect()).await;
    table.join(PLAYER, RecipientClass::Player, LoopbackLink::perfect()).await;
    table.place(token("goblin")).await;
    table.place(token("orc")).await;

    let messages = table.host.remove("goblin");
    assert_eq!(messages.len(), 2);
    table.pump(messages).await;

    for id in [GM, PLAYER] {
        assert_eq!(table.visual_ids(id), vec!["orc"]);
        assert!(!table.client(id).mirror().contains("goblin"));
    }
    assert!(table.host.remove("goblin").is_empty());
}

/// Test that a state arriving while the level loads is applied once loading finishes
#[tokio::test]
async fn test_loading_defers_then_reconciles() {
    let flag = LoadingFlag::new(true);
    let mut table = Table::new();
    table
        .join_with_gate(PLAYER, RecipientClass::Player, LoopbackLink::perfect(), flag.gate())
        .await;
    table.place(token("goblin")).await;

    assert!(table.visual_ids(PLAYER).is_empty());
    assert!(table.client(PLAYER).mirror().contains("goblin"));

    flag.finish();
    let client = &mut table.clients[0];
    client.driver.loading_finished();
    client.driver.settle().await;
    assert_eq!(table.visual_ids(PLAYER), vec!["goblin"]);
}

/// Test that a lossy transform channel never corrupts properties and a resync converges
#[tokio::test]
async fn test_lossy_transforms_converge_after_resync() {
    let mut table = Table::new();
    table.join(GM, RecipientClass::Gm, LoopbackLink::new(0.5, 0.3, 7)).await;
    table
        .join(PLAYER, RecipientClass::Player, LoopbackLink::new(0.5, 0.3, 11))
        .await;
    for id in ["a", "b", "c"] {
        table.place(token(id)).await;
    }

    for step in 0..30 {
        for id in ["a", "b", "c"] {
            table
                .host
                .move_token(id, Transform::at(Vec3::new(step as f32, 0.0, 0.0)));
        }
        if step == 10 {
            let messages = table.host.update("b", |t| t.current_health = 3);
            table.pump(messages).await;
        }
        table.flush().await;
    }

    // Properties travelled reliably regardless of transform loss
    for id in [GM, PLAYER] {
        assert_eq!(table.client(id).mirror().get("b").unwrap().current_health, 3);
        let link = table.clients.iter().find(|c| c.id == id).unwrap().link.stats();
        assert!(link.dropped > 0);
    }

    let resync: Vec<OutboundMessage> = [GM, PLAYER]
        .iter()
        .filter_map(|id| table.host.full_state_for(*id))
        .collect();
    table.pump(resync).await;

    for id in [GM, PLAYER] {
        let client = table.client(id);
        assert_eq!(client.mirror().all(), table.host.mirror().all());
        for visual_id in ["a", "b", "c"] {
            let visual = client.scene().unwrap().visuals.get(visual_id).unwrap();
            assert_eq!(visual.target().position, Vec3::new(29.0, 0.0, 0.0));
        }
    }
}

/// Test the asynchronous pipeline: host tick loop, router task and client drivers
#[tokio::test(start_paused = true)]
async fn test_async_session_end_to_end() {
    let config = SyncConfig::default();
    let host = Arc::new(Broadcaster::new(Arc::new(TokenMirror::new())));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut router = LoopbackRouter::new();

    let mut handles = Vec::new();
    for (id, class) in [(GM, RecipientClass::Gm), (PLAYER, RecipientClass::Player)] {
        let (tx, rx) = mpsc::channel(config.event_queue_capacity);
        let driver = ClientDriver::new(
            Arc::new(TokenMirror::new()),
            Scene::new(LoadingGate::idle()),
            Arc::new(MemorySpawner::new().with_delay(Duration::from_millis(30))),
        )
        .with_config(&config);
        handles.push((id, tokio::spawn(driver.run(rx, shutdown_tx.subscribe()))));
        router.connect(id, LoopbackLink::perfect(), tx);
        router.route(host.join(id, class)).await.unwrap();
    }

    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(config.event_queue_capacity);
    let router_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            router.route(message).await.unwrap();
        }
        router
    });

    let (stop_tx, _) = broadcast::channel::<()>(1);
    let ticker = host.clone();
    let tick_out = out_tx.clone();
    let mut tick_stop = stop_tx.subscribe();
    let tick = config.transform_tick();
    let ticker_task = tokio::spawn(async move {
        ticker.run_transform_ticks(tick, tick_out, &mut tick_stop).await;
    });

    let (_, messages) = host.place(token("goblin"));
    let (_, hidden) = host.place(token("lurker").with_visibility(false, false));
    for message in messages.into_iter().chain(hidden) {
        out_tx.send(message).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    for step in 1..=5 {
        host.move_token("goblin", Transform::at(Vec3::new(step as f32, 0.0, 0.0)));
        host.move_token("lurker", Transform::at(Vec3::new(0.0, 0.0, step as f32)));
        tokio::time::sleep(tick).await;
    }
    tokio::time::sleep(tick * 2).await;

    stop_tx.send(()).unwrap();
    ticker_task.await.unwrap();
    drop(out_tx);
    let router = router_task.await.unwrap();
    drop(router);

    for (id, handle) in handles {
        let driver = handle.await.unwrap();
        let scene = driver.scene().unwrap();
        let goblin = scene.visuals.get("goblin").unwrap();
        assert_eq!(goblin.target().position, Vec3::new(5.0, 0.0, 0.0));
        if id == GM {
            assert!(scene.visuals.contains("lurker"));
        } else {
            assert!(!scene.visuals.contains("lurker"));
            assert!(!driver.mirror().contains("lurker"));
        }
    }
}
