//! Documentation of a subscription gated streaming catalog.
//!
//!
//!
//! # General Infrastructure
//! - Frontend talks to this server over `/api/*`
//! - Redis holds users, subscriptions and the show catalog
//! - Payment gateway creates orders, the server only verifies their signatures
//! - Catalog seeding goes through the `catalog` binary, not the HTTP surface
//!
//!
//!
//! # Who sees what
//!
//! **Goal**: Never hand a playback URL to someone who has not paid for it.
//!
//! - Every show read goes through [`entitlement::Entitlements::evaluate`] once
//! - Correct `x-admin-key` header always wins, no store lookup
//! - No subject means anonymous, which means redacted
//! - Subject with a subscription younger than the period gets the full record
//! - Subscription at or past the period is expired in the store on the spot
//! - Any store failure fails the request, redaction is never silently skipped
//!
//! Redacted records drop the `playbackUrl` key entirely. Clients test for the
//! key, not for an empty value.
//!
//!
//!
//! # Notes
//!
//! ## Legacy grants
//! Accounts subscribed before grant dates were recorded carry the flag with no
//! date. `LEGACY_GRANT_POLICY=allow` keeps honoring them, `deny` redacts them.
//!
//! ## Tokens
//! Tokens are HS256. Older clients put the subject under `userId`, `id` or
//! `userID` instead of `sub`, all are accepted on the way in.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run the server.
//! ```sh
//! JWT_SECRET=... ADMIN_KEY=... PAYMENT_KEY_SECRET=... RUST_LOG=info cargo run --bin streamgate
//! ```
//!
//! Seed the catalog.
//! ```sh
//! cargo run --bin catalog -- shows.json
//! ```
use std::time::Duration;

use axum::http::{
    HeaderName, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod entitlement;
pub mod error;
pub mod identity;
pub mod payment;
pub mod routes;
pub mod show;
pub mod state;
pub mod store;
pub mod user;
pub mod utils;

use config::{ADMIN_KEY_HEADER, Config};
use error::StartupError;
use state::AppState;

pub async fn start_server() -> Result<(), StartupError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load();
    let address = format!("0.0.0.0:{}", config.port);

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(ADMIN_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    let app = routes::router(state).layer(cors);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
