//! Process-level settings loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `FLEETGEN_CONFIG_PATH`: generation document (default: `./config.yaml`)
//! - `FLEETGEN_DATA_DIRECTORY`: root of every generated artifact (default: `./data`)
//! - `FLEETGEN_LISTEN_PORT`: HTTP control port (default: `8000`)

use std::path::PathBuf;

use super::ConfigError;

pub const CONFIG_PATH_VAR: &str = "FLEETGEN_CONFIG_PATH";
pub const DATA_DIRECTORY_VAR: &str = "FLEETGEN_DATA_DIRECTORY";
pub const LISTEN_PORT_VAR: &str = "FLEETGEN_LISTEN_PORT";

/// Service configuration.
///
/// # Post-conditions
///
/// - `listen_port` is a parsed `u16`
/// - paths are not checked for existence; the data directory is created on startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Path of the YAML generation document.
    pub config_path: PathBuf,
    /// Root directory for raw data, manifests and logs.
    pub data_directory: PathBuf,
    /// Port the HTTP control surface listens on.
    pub listen_port: u16,
}

impl ServiceConfig {
    pub const DEFAULT_CONFIG_PATH: &'static str = "./config.yaml";
    pub const DEFAULT_DATA_DIRECTORY: &'static str = "./data";
    pub const DEFAULT_PORT: u16 = 8000;

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `FLEETGEN_LISTEN_PORT` is set but not a valid port.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the port variable is set but not a valid port.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config_path = lookup(CONFIG_PATH_VAR)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_PATH), PathBuf::from);
        let data_directory = lookup(DATA_DIRECTORY_VAR)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DATA_DIRECTORY), PathBuf::from);
        let listen_port = match lookup(LISTEN_PORT_VAR) {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: LISTEN_PORT_VAR.to_string(),
                message: format!("'{value}' is not a valid port number (must be 0-65535)"),
            })?,
            None => Self::DEFAULT_PORT,
        };

        Ok(Self {
            config_path,
            data_directory,
            listen_port,
        })
    }
}
