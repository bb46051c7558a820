//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. `.env.local` and `.env` are read
//! first when present.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rand::RngCore;

use haven_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_TOKEN_TTL_SECS};

/// What the identity resolver does with a caller that has no valid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// Fall back to the legacy header, then to the anonymous user.
    Permissive,
    /// Reject the request with `invalid_credentials`.
    Strict,
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(IdentityPolicy::Permissive),
            "strict" => Ok(IdentityPolicy::Strict),
            other => Err(format!("expected permissive or strict, got {other:?}")),
        }
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8787`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `haven.db` in the platform data directory.
    pub database_path: Option<PathBuf>,

    /// HS256 signing secret for bearer tokens.
    /// Env: `JWT_SECRET`
    /// Default: random per process (tokens do not survive a restart).
    pub jwt_secret: String,

    /// Env: `TOKEN_TTL_SECS`
    pub token_ttl: Duration,

    /// Env: `IDENTITY_POLICY` (permissive/strict)
    pub identity_policy: IdentityPolicy,

    // -- Upstream services --

    /// Env: `OPENAI_API_KEY`
    pub openai_api_key: Option<String>,

    /// Env: `OPENAI_BASE_URL`
    pub openai_base_url: String,

    /// Env: `ASSISTANT_MODEL`
    pub assistant_model: String,

    /// Env: `TRANSCRIPTION_MODEL`
    pub transcription_model: String,

    /// Env: `STRIPE_SECRET_KEY`
    pub stripe_secret_key: Option<String>,

    /// Env: `STRIPE_BASE_URL`
    pub stripe_base_url: String,

    /// Env: `CHECKOUT_SUCCESS_URL`
    pub checkout_success_url: String,

    /// Env: `CHECKOUT_CANCEL_URL`
    pub checkout_cancel_url: String,

    /// Env: `UPSTREAM_TIMEOUT_SECS`
    pub upstream_timeout: Duration,

    // -- Gateway rate limiting (per user) --

    /// Env: `GATEWAY_RATE_PER_SEC`
    pub gateway_rate_per_sec: f64,

    /// Env: `GATEWAY_BURST`
    pub gateway_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            jwt_secret: random_secret(),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            identity_policy: IdentityPolicy::Permissive,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            assistant_model: "gpt-5".to_string(),
            transcription_model: "whisper-1".to_string(),
            stripe_secret_key: None,
            stripe_base_url: "https://api.stripe.com/v1".to_string(),
            checkout_success_url: "http://localhost:3000/success".to_string(),
            checkout_cancel_url: "http://localhost:3000/cancel".to_string(),
            upstream_timeout: Duration::from_secs(60),
            gateway_rate_per_sec: 1.0,
            gateway_burst: 10.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        for file in [".env.local", ".env"] {
            if dotenvy::from_filename(file).is_ok() {
                tracing::debug!(file, "Loaded environment file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = non_empty(var("DATABASE_PATH")) {
            config.database_path = Some(PathBuf::from(path));
        }

        match non_empty(var("JWT_SECRET")) {
            Some(secret) => config.jwt_secret = secret,
            None => tracing::warn!(
                "JWT_SECRET not set, using a random secret; tokens will not survive a restart"
            ),
        }

        if let Some(val) = var("TOKEN_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.token_ttl = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid TOKEN_TTL_SECS, using default"),
            }
        }

        if let Some(val) = var("IDENTITY_POLICY") {
            match val.parse::<IdentityPolicy>() {
                Ok(policy) => config.identity_policy = policy,
                Err(e) => tracing::warn!(error = %e, "Invalid IDENTITY_POLICY, using default"),
            }
        }

        config.openai_api_key = non_empty(var("OPENAI_API_KEY"));
        if let Some(url) = non_empty(var("OPENAI_BASE_URL")) {
            config.openai_base_url = trim_base(url);
        }
        if let Some(model) = non_empty(var("ASSISTANT_MODEL")) {
            config.assistant_model = model;
        }
        if let Some(model) = non_empty(var("TRANSCRIPTION_MODEL")) {
            config.transcription_model = model;
        }

        config.stripe_secret_key = non_empty(var("STRIPE_SECRET_KEY"));
        if let Some(url) = non_empty(var("STRIPE_BASE_URL")) {
            config.stripe_base_url = trim_base(url);
        }
        if let Some(url) = non_empty(var("CHECKOUT_SUCCESS_URL")) {
            config.checkout_success_url = url;
        }
        if let Some(url) = non_empty(var("CHECKOUT_CANCEL_URL")) {
            config.checkout_cancel_url = url;
        }

        if let Some(val) = var("UPSTREAM_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.upstream_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid UPSTREAM_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = var("GATEWAY_RATE_PER_SEC") {
            match val.parse::<f64>() {
                Ok(rate) if rate > 0.0 => config.gateway_rate_per_sec = rate,
                _ => tracing::warn!(value = %val, "Invalid GATEWAY_RATE_PER_SEC, using default"),
            }
        }

        if let Some(val) = var("GATEWAY_BURST") {
            match val.parse::<f64>() {
                Ok(burst) if burst >= 1.0 => config.gateway_burst = burst,
                _ => tracing::warn!(value = %val, "Invalid GATEWAY_BURST, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("identity_policy", &self.identity_policy)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("assistant_model", &self.assistant_model)
            .field("transcription_model", &self.transcription_model)
            .field("stripe_secret_key", &redact(&self.stripe_secret_key))
            .field("stripe_base_url", &self.stripe_base_url)
            .field("checkout_success_url", &self.checkout_success_url)
            .field("checkout_cancel_url", &self.checkout_cancel_url)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("gateway_rate_per_sec", &self.gateway_rate_per_sec)
            .field("gateway_burst", &self.gateway_burst)
            .finish()
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    match secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// 32 random bytes, hex-encoded.
fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
