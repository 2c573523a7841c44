use serde::Deserialize;
use std::env;

use saferide_payments::gateway::HostedCheckoutConfig;
use saferide_rates::RateTable;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub webhook: WebhookConfig,
    pub sweeper: SweeperConfig,
    pub gateway: GatewayConfig,
    /// Static rate table loaded at startup; the rate collaborator snapshots
    /// it per computation.
    pub rates: RateTable,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub secret: String,
    pub tolerance_seconds: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// "mock" for dev/test, "hosted" for the HTTP checkout provider.
    pub provider: String,
    pub hosted: Option<HostedCheckoutConfig>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of SAFERIDE)
            // Eg.. `SAFERIDE_DEBUG=1` would set the `debug` key
            .add_source(config::Environment::with_prefix("SAFERIDE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
