mod clock;
mod collectors;
mod config;
mod http;
mod metrics;
mod persist;
mod scheduler;
mod state;
mod store;
mod view;

use axum::serve;
use clap::Parser;
use clock::{Clock, SystemClock};
use collectors::mock::MockCollector;
use config::{Config, PersistenceKind};
use metrics::Metrics;
use persist::{JsonFilePersistence, MemoryPersistence, NullPersistence, Persistence};
use scheduler::{start_periodic_collection, RefreshScheduler};
use state::Dashboard;
use std::net::SocketAddr;
use std::sync::Arc;
use store::MetricsStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sysdash")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, conflicts_with = "auto_refresh_off")]
    auto_refresh_on: bool,
    #[arg(long, conflicts_with = "auto_refresh_on")]
    auto_refresh_off: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    if cli.auto_refresh_on {
        cfg.auto_refresh = true;
    } else if cli.auto_refresh_off {
        cfg.auto_refresh = false;
    }

    info!(
        listen = %cfg.listen,
        refresh_interval_ms = cfg.refresh_interval.as_millis() as u64,
        freshness_ms = cfg.freshness.as_millis() as u64,
        persistence = ?cfg.persistence.kind,
        "starting sysdash"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(
        MetricsStore::new(
            Arc::new(MockCollector::new()),
            build_persistence(&cfg),
            clock.clone(),
        )
        .with_freshness(cfg.freshness)
        .with_metrics(metrics.clone()),
    );
    let dashboard = Arc::new(
        Dashboard::new(store.clone(), clock, cfg.history_capacity).with_metrics(metrics.clone()),
    );
    let scheduler = Arc::new(RefreshScheduler::new(
        dashboard.clone(),
        cfg.refresh_interval,
    ));

    // Initial load; the page shows a loading state until it lands.
    {
        let dashboard = dashboard.clone();
        tokio::spawn(async move {
            dashboard.fetch(false).await;
        });
    }
    if cfg.auto_refresh {
        scheduler.enable();
    }
    let background = cfg.background_collection.map(|interval| {
        info!(
            interval_ms = interval.as_millis() as u64,
            "background collection enabled"
        );
        start_periodic_collection(store.clone(), interval)
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let dashboard = dashboard.clone();
        let scheduler = scheduler.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, dashboard, scheduler);
            let addr: SocketAddr = match cfg.listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %cfg.listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start HTTP server");
                    return;
                }
            };
            info!(addr = %addr, "dashboard available");

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("received Ctrl+C, shutting down");

    scheduler.disable();
    if let Some(background) = background {
        background.stop();
    }
    let _ = shutdown_tx.send(true);
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_persistence(cfg: &Config) -> Arc<dyn Persistence> {
    match cfg.persistence.kind {
        PersistenceKind::File => Arc::new(JsonFilePersistence::new(&cfg.persistence.path)),
        PersistenceKind::Memory => Arc::new(MemoryPersistence::default()),
        PersistenceKind::None => Arc::new(NullPersistence),
    }
}
