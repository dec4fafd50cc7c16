use std::process;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;

use tilerealm_server::background_saver;
use tilerealm_server::config::ServerConfig;
use tilerealm_server::effects::default_pipeline;
use tilerealm_server::game_loop::TickScheduler;
use tilerealm_server::inventory::MemoryInventory;
use tilerealm_server::items::load_item_catalog;
use tilerealm_server::keydb::{KeyDb, KeyDbSessionAuthenticator};
use tilerealm_server::keydb_store::KeyDbGroundItemStore;
use tilerealm_server::map_cache::MapCacheLoader;
use tilerealm_server::map_manager::MapManager;
use tilerealm_server::network_manager::NetworkManager;
use tilerealm_server::repository::{GroundItemRepository, MemoryGroundItemStore};
use tilerealm_server::server::GameServer;
use tilerealm_server::tasks::TaskContext;
use tilerealm_server::world::{load_npc_spawns, World};

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();

    realm_core::initialize_logger(config.log_level, config.log_file.as_deref()).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {}. Exiting.", e);
            process::exit(1);
        },
    );
    config.log_warnings();

    log::info!("Starting tilerealm server v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = run(config).await {
        log::error!("Server stopped with an error: {e:#}");
        process::exit(1);
    }
    log::info!("Server shutdown");
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    // Static map data
    let loader = MapCacheLoader::new(&config.maps_dir, &config.cache_path);
    let resources = loader
        .load_or_build()
        .map_err(anyhow::Error::msg)
        .context("loading map resources")?;

    // Persistence
    let keydb = match &config.keydb_url {
        Some(url) => Some(Arc::new(KeyDb::connect(url).await.map_err(anyhow::Error::msg)?)),
        None => {
            log::warn!("KeyDB disabled: ground items are not persisted and logins are refused");
            None
        }
    };
    let repository: Arc<dyn GroundItemRepository> = match &keydb {
        Some(keydb) => {
            let store = KeyDbGroundItemStore::new(Arc::clone(keydb));
            store
                .ensure_schema()
                .await
                .context("checking ground item schema")?;
            Arc::new(store)
        }
        None => Arc::new(MemoryGroundItemStore::new()),
    };
    let mut saver = background_saver::spawn(
        Arc::clone(&repository),
        config.save_queue,
        config.collaborator_timeout,
    );

    // World
    let maps = MapManager::new(resources, config.max_items_per_tile).with_persistence(
        repository,
        saver.queue(),
        config.collaborator_timeout,
    );
    maps.log_memory_usage();
    for map_id in maps.map_ids() {
        if let Err(e) = maps.load_ground_items(map_id).await {
            log::error!("Could not load ground items for map {map_id}: {e}");
        }
    }
    let items = load_item_catalog(&config.items).map_err(anyhow::Error::msg)?;
    let world = Arc::new(World::new(maps).with_items(items));
    match load_npc_spawns(&config.npc_spawns) {
        Ok(spawns) => {
            world.spawn_npcs(&spawns);
        }
        Err(e) => log::error!("{e}"),
    }

    // Services
    let network = Arc::new(NetworkManager::new());
    let mut ctx = TaskContext::new(Arc::clone(&world), config.start, config.collaborator_timeout)
        .with_sender(network.clone())
        .with_inventory(Arc::new(MemoryInventory::new()));
    if let Some(keydb) = &keydb {
        ctx = ctx.with_authenticator(Arc::new(KeyDbSessionAuthenticator::new(Arc::clone(keydb))));
    }

    let scheduler = Arc::new(TickScheduler::new(
        Arc::clone(&world),
        network.clone(),
        default_pipeline(),
        config.tick_period,
        config.overrun_policy,
    ))
    .start();

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        if *shutdown_tx.borrow() {
            log::info!("Alright, alright, I'm already terminating!");
        } else {
            log::info!("Got signal to terminate. Shutdown initiated...");
        }
        shutdown_tx.send_replace(true);
    })
    .context("installing the Ctrl-C handler")?;

    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("binding {}", config.listen_addr()))?;
    let server = Arc::new(GameServer::new(ctx, network, config.outbound_queue));
    let served = server.serve(listener, shutdown_rx).await;

    // Teardown, in reverse
    let metrics = scheduler.stop().await;
    log::info!(
        "Ran {} ticks, skipped {}",
        metrics.tick.calls,
        metrics.skipped_ticks
    );
    if let Err(e) = saver.flush().await {
        log::error!("{e}");
    }
    saver.shutdown().await;
    if saver.failed_saves() > 0 {
        log::warn!("{} ground item saves failed this run", saver.failed_saves());
    }
    if let Some(keydb) = keydb {
        keydb.disconnect();
    }

    served.context("accept loop")
}
