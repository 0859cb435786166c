use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub dispatch: DispatchRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// "memory" or "postgres". The in-memory store loses trips on restart
    /// and is meant for development and tests.
    pub backend: String,
    pub url: Option<String>,
}

/// Tunables for offer rounds and candidate selection.
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchRules {
    #[serde(default = "default_offer_window")]
    pub offer_window_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// "reoffer" re-broadcasts an expired job to fresh candidates,
    /// "cancel" gives up immediately.
    #[serde(default = "default_expiry_policy")]
    pub expiry_policy: String,
    #[serde(default = "default_reoffer_rounds")]
    pub reoffer_max_rounds: u32,
    #[serde(default)]
    pub candidate_radius_km: Option<f64>,
    #[serde(default = "default_staleness")]
    pub location_staleness_seconds: u64,
}

fn default_offer_window() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_expiry_policy() -> String {
    "reoffer".to_string()
}

fn default_reoffer_rounds() -> u32 {
    2
}

fn default_staleness() -> u64 {
    45
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
            // Add in settings from the environment (with a prefix of HITCH)
            // Eg. `HITCH_SERVER__PORT=9090` would set `server.port`
            .add_source(config::Environment::with_prefix("HITCH").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
