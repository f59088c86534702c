use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Local};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use live_dashboard::api::{self, AppState};
use live_dashboard::config::DashboardConfig;
use live_dashboard::generator::{seed_records, DataFeed};
use live_dashboard::persistence::StateRepository;
use live_dashboard::scheduler::spawn_feed;
use live_dashboard::store::DashboardStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DASHBOARD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Restore the persisted state, or seed a fresh synthetic record set
fn initial_store(config: &DashboardConfig, repository: Option<&StateRepository>) -> DashboardStore {
    if let Some(repository) = repository {
        match repository.load_state() {
            Ok(Some(bundle)) => {
                info!(records = bundle.records.len(), "restored persisted state");
                return DashboardStore::from_bundle(config, bundle);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring unreadable persisted state"),
        }
    }

    let mut rng = StdRng::from_os_rng();
    let step = Duration::milliseconds(config.tick_interval_ms as i64);
    // Seeds beyond the record bound would be evicted straight away
    let count = config.seed_records.min(config.max_records);
    let records = seed_records(&mut rng, count, Local::now(), step);
    info!(records = records.len(), "seeded synthetic records");
    DashboardStore::with_records(config, records)
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match DashboardConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    // Persistence is optional; the dashboard still runs in memory without it
    let repository = match StateRepository::open(&config.db_path) {
        Ok(repository) => Some(repository),
        Err(e) => {
            warn!(error = %e, path = %config.db_path.display(), "persistence disabled");
            None
        }
    };

    let store = Arc::new(Mutex::new(initial_store(&config, repository.as_ref())));
    let feed = Arc::new(Mutex::new(DataFeed::new(
        StdRng::from_os_rng(),
        config.failure_rate,
        config.max_retries,
    )));
    let repository = repository.map(|r| Arc::new(Mutex::new(r)));

    let state = AppState::new(store.clone(), feed.clone(), repository, &config);
    let feed_handle = spawn_feed(store, feed, config.tick_interval());
    let app = api::router(state.clone());

    let addr: SocketAddr = config.bind_addr;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    info!("Dashboard feed running on http://{}", addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    };
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(error = %e, "server error");
    }

    feed_handle.stop();
    state.persist();
    info!("dashboard stopped, state saved");
}
