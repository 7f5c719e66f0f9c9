//! Portgate server binary.
//!
//! Runs the portal and the gateway on two listeners over one shared state.
//! Everything except the listener flags is read from the environment (see
//! `ApiConfig::from_env`).

use clap::Parser;
use portgate_api::AppState;
use portgate_api::config::ApiConfig;
use portgate_core::auth::access_tokens::purge_expired_tokens;
use portgate_core::auth::queries::ensure_admin;
use portgate_core::gateway::SWEEP_INTERVAL;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "portgate_server", about = "Portgate portal and gateway server")]
struct Args {
    /// Portal listener address.
    #[arg(long, env = "PORTAL_BIND_ADDR")]
    portal_addr: Option<String>,

    /// Gateway listener address.
    #[arg(long, env = "GATEWAY_BIND_ADDR")]
    gateway_addr: Option<String>,

    /// SQLite connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Username of the bootstrap admin account.
    #[arg(long, env = "ADMIN_USERNAME", default_value = DEFAULT_ADMIN_USERNAME)]
    admin_username: String,

    /// Password of the bootstrap admin account (only used when it is created).
    #[arg(
        long,
        env = "ADMIN_PASSWORD",
        default_value = DEFAULT_ADMIN_PASSWORD,
        hide_env_values = true
    )]
    admin_password: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,portgate_api=debug,portgate_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(addr) = args.portal_addr {
        config.portal_bind_addr = addr;
    }
    if let Some(addr) = args.gateway_addr {
        config.gateway_bind_addr = addr;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    config.validate()?;

    info!(
        database_url = %config.database_url,
        max_connections = args.max_connections,
        "opening credential store"
    );
    let pool = portgate_core::db::connect(&config.database_url, args.max_connections).await?;

    if ensure_admin(&pool, &args.admin_username, &args.admin_password).await? {
        if args.admin_password == DEFAULT_ADMIN_PASSWORD {
            warn!(
                username = %args.admin_username,
                "created admin account with the default password; change it now"
            );
        } else {
            info!(username = %args.admin_username, "created admin account");
        }
    }

    let state = AppState::new(pool, config.clone())?;
    let sweeper = state.gateway.spawn_sweeper(SWEEP_INTERVAL);
    let purger = tokio::spawn({
        let pool = state.pool.clone();
        async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                match purge_expired_tokens(&pool).await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "expired access tokens purged"),
                    Err(e) => warn!(error = %e, "access token purge failed"),
                }
            }
        }
    });

    let portal_listener = tokio::net::TcpListener::bind(&config.portal_bind_addr).await?;
    let gateway_listener = tokio::net::TcpListener::bind(&config.gateway_bind_addr).await?;
    info!(addr = %portal_listener.local_addr()?, "portal listening");
    info!(addr = %gateway_listener.local_addr()?, "gateway listening");

    let ct = CancellationToken::new();
    tokio::spawn({
        let ct = ct.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            ct.cancel();
        }
    });

    let gateway_handle = tokio::spawn({
        let ct = ct.clone();
        let app = portgate_api::gateway_router(state.clone());
        async move {
            axum::serve(gateway_listener, app)
                .with_graceful_shutdown(async move { ct.cancelled().await })
                .await
        }
    });

    let portal_result = axum::serve(portal_listener, portgate_api::portal_router(state))
        .with_graceful_shutdown({
            let ct = ct.clone();
            async move { ct.cancelled().await }
        })
        .await;

    // When the portal exits, also stop the gateway.
    ct.cancel();
    let gateway_result = gateway_handle.await;
    sweeper.abort();
    purger.abort();

    portal_result?;
    gateway_result??;
    Ok(())
}
