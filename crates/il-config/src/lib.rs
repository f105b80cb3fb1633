//! # il-config
//!
//! Process configuration for the Interludes server. Sources, later ones
//! overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. an optional `interludes.toml` in the working directory,
//! 3. `INTERLUDES__*` environment variables (a `.env` file is loaded first),
//!    e.g. `INTERLUDES__DATABASE_URL=sqlite:data/interludes.db`.
//!
//! The resulting [`AppConfig`] is built once in `main` and handed to
//! whatever needs it; nothing reads configuration from global state.

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "INTERLUDES";
pub const CONFIG_FILE: &str = "interludes";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Public base URL, used to build the CAS service URL
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_cas_server_url")]
    pub cas_server_url: String,
    /// Basic-auth user name expected on the admin pages.
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    /// Argon2 PHC string; the admin pages stay locked when unset.
    #[serde(default)]
    pub admin_password_hash: Option<SecretString>,
    /// Pins the registration season instead of deriving it from the clock.
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_database_url() -> String {
    "sqlite:interludes.db?mode=rwc".to_string()
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_cas_server_url() -> String {
    "https://cas.eleves.ens.fr/".to_string()
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Loads `.env`, then the config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!("ignoring unreadable .env file: {err}");
            }
        }
        let config = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parses a TOML document on its own, without file or environment lookups.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Callback URL handed to the CAS server.
    pub fn cas_service_url(&self) -> String {
        format!("{}/accounts/cas/login", self.public_url.trim_end_matches('/'))
    }
}
