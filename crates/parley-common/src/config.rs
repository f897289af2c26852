//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call parley_common::config::init() first.")
}

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    let app_config = load()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

/// Build an [`AppConfig`] without touching the process-wide global.
/// Used by tests that need a config value but must not race on the `OnceLock`.
pub fn load() -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("server.gateway_port", 8081)?
        .set_default("auth.jwt_secret", "change-me")?
        .set_default("auth.access_token_ttl_secs", 900)?
        // 0 disables the outgoing-call timeout: pure fire-and-forget signaling
        .set_default("signaling.initiate_timeout_secs", 0)?
        .set_default("signaling.delivery_queue_depth", 64)?
        .set_default("limits.max_call_participants", 100)?
        .set_default("limits.default_call_participants", 10)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (PARLEY_SERVER__HOST, PARLEY_AUTH__JWT_SECRET, etc.)
        .add_source(
            config::Environment::with_prefix("PARLEY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub signaling: SignalingConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// REST API port
    pub port: u16,
    /// WebSocket signaling gateway port
    pub gateway_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret (HS256) — should be 256+ bits of entropy
    pub jwt_secret: String,
    /// Access token TTL in seconds
    pub access_token_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignalingConfig {
    /// Seconds an outgoing call waits for an answer before reverting to idle.
    /// 0 disables the timeout entirely: pure fire-and-forget signaling.
    pub initiate_timeout_secs: u64,
    /// Per-connection outbound event queue depth. Events past this are dropped
    /// (at-most-once delivery).
    pub delivery_queue_depth: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Hard ceiling on `settings.max_participants` for any call
    pub max_call_participants: u32,
    /// Default `settings.max_participants` when a call is started without settings
    pub default_call_participants: u32,
}
