//! Configuration.
//!
//! Two layers:
//!
//! - [`ServiceConfig`]: where things live (config path, data directory, port),
//!   read from `FLEETGEN_*` environment variables.
//! - [`GenerationConfig`]: what gets generated, read from a YAML document and
//!   validated once at startup. Everything downstream reads the "active"
//!   accessors instead of branching on the mode flag itself.

mod duration;
mod generation;
mod service;

use std::path::PathBuf;

pub use duration::{DurationParseError, IsoDuration};
pub use generation::{
    EmulatedModeConfig, EmulatedSummary, EventBounds, GenerationConfig, GenerationMode, QualityInjectionConfig,
};
pub use service::{CONFIG_PATH_VAR, DATA_DIRECTORY_VAR, LISTEN_PORT_VAR, ServiceConfig};

/// Error returned when loading or validating configuration fails.
///
/// Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting has an out-of-range or unparseable value.
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    /// The generation document could not be read.
    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The generation document is not valid YAML for [`GenerationConfig`].
    #[error("failed to parse configuration document: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub(crate) fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
