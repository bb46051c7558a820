//! # haven-server
//!
//! HTTP backend for the Haven wellness tracker.
//!
//! This binary provides:
//! - **Identity resolution** from bearer tokens, the legacy `x-user-id`
//!   header, or the anonymous fallback, plus email/password sign-up and
//!   sign-in
//! - **User-scoped storage** (SQLite) for mood, journal, stress, sleep,
//!   mindfulness, profile, assessment, and subscription records
//! - **Chat transcripts** per user and topic with atomic appends
//! - **Gateways** to the assistant model, the checkout-session API, and
//!   speech-to-text, rate limited per user

mod api;
mod auth;
mod config;
mod error;
mod gateways;
mod rate_limit;
mod store;
mod tracking;
mod transcripts;

use tracing::info;
use tracing_subscriber::EnvFilter;

use haven_shared::constants::APP_NAME;
use haven_store::Database;

use crate::api::AppState;
use crate::auth::identity::IdentityResolver;
use crate::auth::jwt::TokenIssuer;
use crate::config::ServerConfig;
use crate::gateways::assistant::AssistantGateway;
use crate::gateways::commerce::CommerceGateway;
use crate::gateways::transcription::TranscriptionGateway;
use crate::rate_limit::RateLimiter;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,haven_server=debug,haven_store=info")),
        )
        .init();

    info!("Starting {APP_NAME} server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        policy = ?config.identity_policy,
        assistant_enabled = config.openai_api_key.is_some(),
        checkout_enabled = config.stripe_secret_key.is_some(),
        "Identity and gateway settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Database (creates parent directory and runs migrations)
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    info!(path = ?db.path(), "Database ready");

    let identity = IdentityResolver::new(
        TokenIssuer::new(&config.jwt_secret, config.token_ttl),
        config.identity_policy,
    );

    // One HTTP client shared by every upstream gateway
    let client = gateways::http_client(config.upstream_timeout)?;

    let rate_limiter = RateLimiter::new(config.gateway_rate_per_sec, config.gateway_burst);

    let app_state = AppState {
        store: Store::new(db),
        identity,
        assistant: AssistantGateway::new(
            client.clone(),
            &config.openai_base_url,
            config.openai_api_key.clone(),
            config.assistant_model.clone(),
        ),
        commerce: CommerceGateway::new(
            client.clone(),
            &config.stripe_base_url,
            config.stripe_secret_key.clone(),
            config.checkout_success_url.clone(),
            config.checkout_cancel_url.clone(),
        ),
        transcription: TranscriptionGateway::new(
            client,
            &config.openai_base_url,
            config.openai_api_key.clone(),
            config.transcription_model.clone(),
        ),
        rate_limiter: rate_limiter.clone(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
