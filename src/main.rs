use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use adoption_functions::backend::memory::{MemoryFavorites, MemoryPetCatalog, StaticTokenVerifier};
use adoption_functions::backend::User;
use adoption_functions::config::{AppConfig, Route};
use adoption_functions::handlers::{FavoritesHandler, PetsHandler};
use adoption_functions::ratelimit::{with_rate_limit, LimiterStore, RateLimiter, Reaper};
use adoption_functions::server::FunctionServer;

/// Token accepted by the demo verifier.
const DEMO_TOKEN: &str = "demo-token";

#[derive(Debug, Parser)]
#[command(name = "adoption-functions", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting Adoption Functions");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    let limits = &config.rate_limiting;
    info!(
        bind_addr = %config.server.bind_addr,
        reset_mode = ?limits.reset_mode,
        "Configuration loaded"
    );

    // One store shared by the limiter and the reaper
    let store = Arc::new(LimiterStore::new());
    let limiter = RateLimiter::new(store.clone()).with_reset_mode(limits.reset_mode);
    let reaper = Arc::new(Reaper::new(
        store,
        limits.reaper_interval(),
        limits.eviction_grace(),
    ));
    reaper.start();

    let catalog = Arc::new(MemoryPetCatalog::with_demo_data());
    let favorites = Arc::new(MemoryFavorites::new(catalog.clone()));
    let verifier = StaticTokenVerifier::new().with_token(
        DEMO_TOKEN,
        User {
            id: "demo-user".to_string(),
            email: Some("demo@example.org".to_string()),
        },
    );

    let pets_handler = with_rate_limit(
        PetsHandler::new(catalog),
        limiter.clone(),
        Route::Pets.name(),
        limits.policy_for(Route::Pets)?,
    );
    let favorites_handler = with_rate_limit(
        FavoritesHandler::new(favorites, Arc::new(verifier)),
        limiter,
        Route::Favorites.name(),
        limits.policy_for(Route::Favorites)?,
    );

    let server = FunctionServer::new(
        config.server.bind_addr,
        Arc::new(pets_handler),
        Arc::new(favorites_handler),
    )
    .trust_proxy_headers(config.server.trust_proxy_headers);

    info!("Starting HTTP server on {}", server.addr());
    let served = server.serve_with_shutdown(shutdown_signal()).await;

    reaper.stop().await;
    served?;

    info!("Adoption Functions stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve once the process is asked to stop, logging which signal did it.
///
/// A signal that cannot be registered is logged and never fires, so the
/// other one still works.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    info!(signal = received, "Shutting down gracefully");
}
