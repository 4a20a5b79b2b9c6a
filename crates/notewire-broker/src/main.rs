//! Notewire Broker Server
//!
//! Self-hosted webhook delivery broker: producers POST payloads against a
//! webhook key, subscriber plugins consume them over a push stream (or
//! pull fallback) and acknowledge each one.

use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use notewire_broker::middleware::rate_limit;
use notewire_broker::routes::build_router;
use notewire_broker::state::AppState;
use notewire_broker::storage::Database;
use notewire_core::tracing_init::init_tracing;
use notewire_core::Config;
use notewire_crypto::PayloadCipher;

#[derive(Parser, Debug)]
#[command(name = "notewire-broker")]
#[command(version, about = "Notewire webhook delivery broker")]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
    }

    let config = Config::from_env()?;
    init_tracing("notewire=info", config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        "starting notewire-broker"
    );

    let db = Database::open(&config.db_path).await?;

    let cipher = PayloadCipher::from_config(&config.encryption_key)?;
    if cipher.is_enabled() {
        info!("payload encryption at rest enabled");
    } else {
        info!("payload encryption at rest disabled (NOTEWIRE_ENCRYPTION_KEY not set)");
    }

    let listen_addr = config.listen_addr.clone();
    let cors = cors_layer(&config.allowed_origins);
    let state = AppState::new(db.clone(), cipher, config.clone());
    let shutdown = state.shutdown.clone();

    // Background workers share the shutdown token with the server.
    if config.auto_cleanup {
        tokio::spawn(notewire_broker::reaper::run(
            db.clone(),
            shutdown.clone(),
        ));
    } else {
        info!("auto cleanup disabled, expired events must be pruned manually");
    }
    tokio::spawn(rate_limit::sweep_task(
        state.limiter.clone(),
        shutdown.clone(),
    ));

    let app = build_router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "broker listening");

    // Ctrl-C cancels the token; the server stops accepting and the
    // workers and push streams wind down on the same signal.
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            signal_token.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("broker stopped");
    Ok(())
}

/// Build the CORS layer from the configured origin whitelist. No
/// configured origins means no cross-origin responses.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new();
    }

    let origins: Vec<axum::http::HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
