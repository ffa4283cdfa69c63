//! Tablesync Simulator
//!
//! Runs a host broadcaster, one GM client and a configurable number of player
//! clients in a single process, connected through lossy loopback links, and
//! plays a short scripted session against them.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tablesync::client::{ClientDriver, LoadingGate, MemorySpawner, Scene};
use tablesync::config::SyncConfig;
use tablesync::host::Broadcaster;
use tablesync::mirror::TokenMirror;
use tablesync::net::{LoopbackLink, LoopbackRouter};
use tablesync::sync::{OutboundMessage, RecipientId};
use tablesync::token::{IdentityTriple, RecipientClass, TokenState, Transform, Vec3};
use tablesync::VERSION;

type ClientHandle = JoinHandle<ClientDriver<MemorySpawner>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration, then initialize logging at the configured verbosity
    let config = SyncConfig::load().await?;
    init_logging(config.debug);

    info!("Tablesync simulator v{}", VERSION);
    if config.config_path.exists() {
        info!(
            "Configuration loaded from: {}",
            config.config_path.display()
        );
    } else {
        warn!(
            "Config file not found at {}, using defaults",
            config.config_path.display()
        );
    }
    info!(
        session = %config.session_name,
        players = config.simulation.players,
        ticks = config.simulation.ticks,
        drop_rate = config.simulation.transform_drop_rate,
        reorder_rate = config.simulation.transform_reorder_rate,
        "Starting session"
    );

    // Ctrl+C reaches every task; `stop_tx` only ends the host transform loop
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (stop_tx, _) = broadcast::channel::<()>(1);
    let (out_tx, out_rx) = mpsc::channel::<OutboundMessage>(config.event_queue_capacity);

    let host = Arc::new(Broadcaster::new(Arc::new(TokenMirror::new())));
    let mut router = LoopbackRouter::new();

    // Connect the GM and the players
    let mut clients: Vec<(RecipientId, RecipientClass, ClientHandle)> = Vec::new();
    let classes = std::iter::once(RecipientClass::Gm)
        .chain(std::iter::repeat(RecipientClass::Player).take(config.simulation.players));
    for class in classes {
        let id = host.recipients().allocate_id();
        let (tx, rx) = mpsc::channel(config.event_queue_capacity);
        let driver = ClientDriver::new(
            Arc::new(TokenMirror::new()),
            Scene::new(LoadingGate::idle()),
            Arc::new(MemorySpawner::new().with_delay(Duration::from_millis(30))),
        )
        .with_config(&config);
        let handle = tokio::spawn(driver.run(rx, shutdown_tx.subscribe()));

        router.connect(id, LoopbackLink::from_config(&config.simulation, id), tx);
        router.route(host.join(id, class)).await?;
        clients.push((id, class, handle));
    }

    // Route everything the host produces through the loopback links
    let router_handle = tokio::spawn(route_outbound(router, out_rx));

    // Start the host transform flush loop
    let ticker = host.clone();
    let tick = config.transform_tick();
    let tick_out = out_tx.clone();
    let mut tick_stop = stop_tx.subscribe();
    let ticker_handle = tokio::spawn(async move {
        ticker.run_transform_ticks(tick, tick_out, &mut tick_stop).await;
    });

    tokio::select! {
        result = run_scenario(&host, &out_tx, &config) => {
            result.context("Scenario failed")?;
        }
        _ = wait_for_shutdown(shutdown_tx.clone()) => {
            warn!("Scenario interrupted");
        }
    }

    let _ = stop_tx.send(());
    ticker_handle.await?;
    drop(out_tx);
    let router = router_handle.await?;

    for (id, class, handle) in clients {
        let driver = handle.await?;
        report(&host, id, class, &driver, &router);
    }

    info!("Simulation complete");
    Ok(())
}

/// Initialize the logging system
///
/// `RUST_LOG` wins; otherwise `debug` raises the crate's own level.
fn init_logging(debug: bool) {
    let default_filter = if debug {
        "info,tablesync=debug,tablesync_sim=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// Deliver outbound messages until every sender is dropped
async fn route_outbound(
    mut router: LoopbackRouter,
    mut out_rx: mpsc::Receiver<OutboundMessage>,
) -> LoopbackRouter {
    while let Some(message) = out_rx.recv().await {
        if let Err(e) = router.route(message).await {
            warn!("Routing stopped: {}", e);
            return router;
        }
    }
    if let Err(e) = router.flush().await {
        warn!("Failed to flush held transforms: {}", e);
    }
    router
}

/// Scripted session: place, move, hide, damage, remove, resync
async fn run_scenario(
    host: &Broadcaster,
    out_tx: &mpsc::Sender<OutboundMessage>,
    config: &SyncConfig,
) -> Result<()> {
    let goblin = IdentityTriple::new("monsters", "goblin");
    let mut placed = Vec::new();
    for (i, name) in ["goblin-1", "goblin-2"].iter().enumerate() {
        let state = TokenState::new(*name, goblin.clone())
            .with_name(format!("Goblin {}", i + 1))
            .with_health(7, 7)
            .with_position(Vec3::new(i as f32 * 2.0, 0.0, 0.0));
        let (id, messages) = host.place(state);
        send(out_tx, messages).await?;
        placed.push(id);
    }

    let ogre = TokenState::new("ogre", IdentityTriple::new("monsters", "ogre").with_variant("chief"))
        .with_name("Ogre Chief")
        .with_health(59, 59);
    let (ogre_id, messages) = host.place(ogre);
    send(out_tx, messages).await?;
    placed.push(ogre_id.clone());

    // Runtime spawn with a generated id
    let hero = TokenState::new("", IdentityTriple::new("heroes", "paladin"))
        .with_name("Aric")
        .with_player_control("char-aric")
        .with_health(32, 32);
    let (hero_id, messages) = host.place(hero);
    send(out_tx, messages).await?;
    placed.push(hero_id.clone());
    info!(hero = %hero_id, "Placed {} tokens", placed.len());

    let ticks = config.simulation.ticks.max(1);
    for tick in 0..ticks {
        let angle = TAU * tick as f32 / ticks as f32;
        for (i, id) in placed.iter().enumerate() {
            if !host.mirror().contains(id.as_str()) {
                continue;
            }
            let radius = 1.0 + i as f32;
            let position = Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin());
            let transform = Transform {
                position,
                rotation: Vec3::new(0.0, angle.to_degrees(), 0.0),
                scale: Vec3::ONE,
            };
            send(out_tx, host.move_token(id.as_str(), transform)).await?;
        }

        if tick == ticks / 3 {
            info!(network_id = %ogre_id, "Hiding token from players");
            let messages = host.update(ogre_id.as_str(), |t| t.is_visible_to_players = false);
            send(out_tx, messages).await?;
        }
        if tick == ticks / 2 {
            info!(network_id = %hero_id, "Hero takes damage");
            let messages = host.update(hero_id.as_str(), |t| {
                t.current_health -= 12;
                t.add_status_effect("poisoned");
            });
            send(out_tx, messages).await?;
        }
        if tick == 2 * ticks / 3 {
            info!(network_id = %placed[0], "Removing token");
            send(out_tx, host.remove(placed[0].as_str())).await?;
        }

        tokio::time::sleep(config.transform_tick()).await;
    }

    // Let the last batch go out, then resync every client over the reliable channel
    tokio::time::sleep(config.transform_tick() * 2).await;
    for id in host.recipients().ids() {
        if let Some(message) = host.full_state_for(id) {
            send(out_tx, vec![message]).await?;
        }
    }
    Ok(())
}

async fn send(out_tx: &mpsc::Sender<OutboundMessage>, messages: Vec<OutboundMessage>) -> Result<()> {
    for message in messages {
        out_tx
            .send(message)
            .await
            .context("Outbound channel closed")?;
    }
    Ok(())
}

/// Log a client's final scene and whether it matches what the host allows it to see
fn report(
    host: &Broadcaster,
    id: RecipientId,
    class: RecipientClass,
    driver: &ClientDriver<MemorySpawner>,
    router: &LoopbackRouter,
) {
    let expected: Vec<TokenState> = host
        .mirror()
        .all()
        .into_iter()
        .filter(|state| state.is_visible_to(class))
        .collect();
    let mirrored = driver.mirror().all();
    let converged = expected == mirrored;

    info!(
        recipient = id,
        class = %class,
        tokens = mirrored.len(),
        converged = converged,
        stats = ?driver.reconciler().stats(),
        link = ?router.stats(id),
        "Client final state"
    );

    if let Some(scene) = driver.scene() {
        for (network_id, visual) in scene.visuals.iter() {
            let position = visual.target().position;
            info!(
                recipient = id,
                network_id = %network_id,
                token = %visual.state,
                x = position.x,
                z = position.z,
                "Visual"
            );
        }
    }

    if !converged {
        error!(recipient = id, "Client mirror diverged from host");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
