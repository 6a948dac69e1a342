use std::sync::Arc;
use std::time::Instant;

use atrio_core::relay::{RelayClient, RelaySettings, StaticResolver};
use atrio_core::AtrioConfig;
use atrio_sync::SubscriptionRegistry;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use atrio_server::http::{self, HttpState};
use atrio_server::router::ControlContext;
use atrio_server::server;
use atrio_server::subsystems::feed;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "atrio.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match AtrioConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to DB
    let pool = match atrio_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match atrio_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Atrio DB health check passed");
        return Ok(());
    }

    let registry = SubscriptionRegistry::new();
    let relay = Arc::new(RelayClient::new(RelaySettings::from(&config.relay))?);
    let resolver = Arc::new(StaticResolver::from_config(&config.relay.endpoints));

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Spawn the change-feed bridge (LISTEN/NOTIFY → subscription registry)
    let feed_pool = pool.clone();
    let feed_config = config.realtime.clone();
    let feed_registry = Arc::clone(&registry);
    let feed_shutdown = tx.subscribe();
    tokio::spawn(async move {
        feed::run_feed_bridge(feed_pool, feed_config, feed_registry, feed_shutdown).await;
    });

    // Spawn HTTP REST API server if enabled
    if config.http.enabled {
        let http_state = HttpState {
            pool: pool.clone(),
            config: config.clone(),
            registry: Arc::clone(&registry),
            relay: Arc::clone(&relay),
            resolver: resolver.clone(),
        };
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let ctx = ControlContext {
        pool,
        config: config.clone(),
        registry,
        relay,
        resolver,
        started_at: Instant::now(),
    };

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, ctx, tx.subscribe()).await?;

    Ok(())
}
