//! Configuration module for the smart-average engine.
//!
//! Configuration is loaded from environment variables using the figment
//! crate. The store connection string is the only required value.

use serde::Deserialize;

/// Main application configuration
#[derive(Deserialize)]
pub struct Config {
    /// Log level for the application
    ///
    /// This value is used to set the log level for this application's target
    /// specifically, e.g. "debug" behaves like "warn,smartavg=debug".
    ///
    /// Valid values are: "trace", "debug", "info", "warn", "error"
    /// Defaults to "info" if not specified
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Database connection URL
    pub database_url: String,
}

/// Default log level of "info"
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, figment::Error> {
        use figment::{Figment, providers::Env};
        Figment::new().merge(Env::raw()).extract()
    }
}
