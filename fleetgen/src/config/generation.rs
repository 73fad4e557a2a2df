//! The generation document: volumes, cadences, quality injection and emulated mode.
//!
//! # Invariants (after `validate()`)
//!
//! - Every interval, production or emulated, is at least one second
//! - Counts and rates are strictly positive; rates are finite
//! - Every probability lies in `[0, 1]`
//! - `1 <= companies_per_batch <= 100` and `1 <= events_per_batch_min <= events_per_batch_max`

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ConfigError, IsoDuration};

const MIN_INTERVAL_SECS: u64 = 1;
/// One week. Longer intervals push boundary arithmetic out of chrono's range.
const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3600;
const MAX_COMPANIES_PER_BATCH: u32 = 100;

/// Which profile governs intervals and batch sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Production,
    Emulated,
}

impl GenerationMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Emulated => "emulated",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality-injection settings.
///
/// Per-type probabilities are relative weights for the issue-type draw made
/// after a record has been selected for corruption with `error_rate`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QualityInjectionConfig {
    pub enabled: bool,
    pub error_rate: f64,
    pub missing_field_probability: f64,
    pub null_value_probability: f64,
    pub malformed_timestamp_probability: f64,
    pub invalid_enum_probability: f64,
    pub duplicate_probability: f64,
    pub boundary_violation_probability: f64,
    pub inject_in_companies: bool,
    pub inject_in_driver_events: bool,
    pub log_injected_issues: bool,
}

impl Default for QualityInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            error_rate: 0.0,
            missing_field_probability: 0.3,
            null_value_probability: 0.3,
            malformed_timestamp_probability: 0.2,
            invalid_enum_probability: 0.1,
            duplicate_probability: 0.05,
            boundary_violation_probability: 0.05,
            inject_in_companies: true,
            inject_in_driver_events: true,
            log_injected_issues: true,
        }
    }
}

impl QualityInjectionConfig {
    fn probabilities(&self) -> [(&'static str, f64); 7] {
        [
            ("quality_injection.error_rate", self.error_rate),
            ("quality_injection.missing_field_probability", self.missing_field_probability),
            ("quality_injection.null_value_probability", self.null_value_probability),
            ("quality_injection.malformed_timestamp_probability", self.malformed_timestamp_probability),
            ("quality_injection.invalid_enum_probability", self.invalid_enum_probability),
            ("quality_injection.duplicate_probability", self.duplicate_probability),
            ("quality_injection.boundary_violation_probability", self.boundary_violation_probability),
        ]
    }
}

/// Emulated-mode overrides for fast local feedback.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmulatedModeConfig {
    pub enabled: bool,
    pub company_batch_interval: IsoDuration,
    pub driver_batch_interval: IsoDuration,
    pub companies_per_batch: u32,
    pub events_per_batch_min: u32,
    pub events_per_batch_max: u32,
}

impl Default for EmulatedModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            company_batch_interval: IsoDuration::from_secs(10),
            driver_batch_interval: IsoDuration::from_secs(10),
            companies_per_batch: 10,
            events_per_batch_min: 5,
            events_per_batch_max: 20,
        }
    }
}

/// Inclusive event-count bounds for one emulated driver batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBounds {
    pub min: u32,
    pub max: u32,
}

impl EventBounds {
    /// Midpoint of the range, used as the target batch size.
    #[must_use]
    pub fn target(self) -> f64 {
        (f64::from(self.min) + f64::from(self.max)) / 2.0
    }
}

/// The emulated parameters reported on `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmulatedSummary {
    pub company_interval_seconds: u64,
    pub driver_interval_seconds: u64,
    pub companies_per_batch: u32,
    pub events_per_batch_range: [u32; 2],
}

fn default_driver_event_interval() -> IsoDuration {
    IsoDuration::from_secs(15 * 60)
}

/// Typed generation document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationConfig {
    /// Base seed. When absent the seed manifest (or fresh entropy) supplies one.
    #[serde(default)]
    pub seed: Option<u64>,
    pub number_of_companies: u32,
    pub drivers_per_company: u32,
    pub event_rate_per_driver: f64,
    pub company_onboarding_interval: IsoDuration,
    #[serde(default = "default_driver_event_interval")]
    pub driver_event_interval: IsoDuration,
    #[serde(default)]
    pub quality_injection: QualityInjectionConfig,
    #[serde(default)]
    pub emulated_mode: EmulatedModeConfig,
}

impl GenerationConfig {
    /// Read, parse and validate the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML for this
    /// schema, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails validation.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every range constraint.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_companies == 0 {
            return Err(ConfigError::invalid("number_of_companies", "must be greater than 0"));
        }
        if self.drivers_per_company == 0 {
            return Err(ConfigError::invalid("drivers_per_company", "must be greater than 0"));
        }
        if !self.event_rate_per_driver.is_finite() || self.event_rate_per_driver <= 0.0 {
            return Err(ConfigError::invalid(
                "event_rate_per_driver",
                format!("must be a finite number greater than 0, got {}", self.event_rate_per_driver),
            ));
        }

        check_interval("company_onboarding_interval", self.company_onboarding_interval)?;
        check_interval("driver_event_interval", self.driver_event_interval)?;

        for (name, value) in self.quality_injection.probabilities() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(name, format!("must be between 0 and 1, got {value}")));
            }
        }

        let emulated = &self.emulated_mode;
        check_interval("emulated_mode.company_batch_interval", emulated.company_batch_interval)?;
        check_interval("emulated_mode.driver_batch_interval", emulated.driver_batch_interval)?;
        if !(1..=MAX_COMPANIES_PER_BATCH).contains(&emulated.companies_per_batch) {
            return Err(ConfigError::invalid(
                "emulated_mode.companies_per_batch",
                format!("must be between 1 and {MAX_COMPANIES_PER_BATCH}, got {}", emulated.companies_per_batch),
            ));
        }
        if emulated.events_per_batch_min == 0 {
            return Err(ConfigError::invalid("emulated_mode.events_per_batch_min", "must be at least 1"));
        }
        if emulated.events_per_batch_max < emulated.events_per_batch_min {
            return Err(ConfigError::invalid(
                "emulated_mode.events_per_batch_max",
                format!(
                    "must be greater than or equal to events_per_batch_min ({})",
                    emulated.events_per_batch_min
                ),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub const fn generation_mode(&self) -> GenerationMode {
        if self.emulated_mode.enabled {
            GenerationMode::Emulated
        } else {
            GenerationMode::Production
        }
    }

    #[must_use]
    pub const fn active_company_interval(&self) -> IsoDuration {
        if self.emulated_mode.enabled {
            self.emulated_mode.company_batch_interval
        } else {
            self.company_onboarding_interval
        }
    }

    #[must_use]
    pub const fn active_driver_interval(&self) -> IsoDuration {
        if self.emulated_mode.enabled {
            self.emulated_mode.driver_batch_interval
        } else {
            self.driver_event_interval
        }
    }

    /// Companies created per onboarding batch.
    #[must_use]
    pub const fn active_company_count(&self) -> u32 {
        if self.emulated_mode.enabled {
            self.emulated_mode.companies_per_batch
        } else {
            self.number_of_companies
        }
    }

    /// Event-count bounds per driver batch; production batches are unbounded.
    #[must_use]
    pub const fn active_event_bounds(&self) -> Option<EventBounds> {
        if self.emulated_mode.enabled {
            Some(EventBounds {
                min: self.emulated_mode.events_per_batch_min,
                max: self.emulated_mode.events_per_batch_max,
            })
        } else {
            None
        }
    }

    #[must_use]
    pub const fn emulated_summary(&self) -> Option<EmulatedSummary> {
        if !self.emulated_mode.enabled {
            return None;
        }
        let emulated = &self.emulated_mode;
        Some(EmulatedSummary {
            company_interval_seconds: emulated.company_batch_interval.as_secs(),
            driver_interval_seconds: emulated.driver_batch_interval.as_secs(),
            companies_per_batch: emulated.companies_per_batch,
            events_per_batch_range: [emulated.events_per_batch_min, emulated.events_per_batch_max],
        })
    }
}

fn check_interval(name: &str, interval: IsoDuration) -> Result<(), ConfigError> {
    if interval.as_secs() < MIN_INTERVAL_SECS {
        return Err(ConfigError::invalid(
            name,
            format!("interval {interval} is shorter than {MIN_INTERVAL_SECS} second"),
        ));
    }
    if interval.as_secs() > MAX_INTERVAL_SECS {
        return Err(ConfigError::invalid(
            name,
            format!("interval {interval} is longer than {MAX_INTERVAL_SECS} seconds"),
        ));
    }
    Ok(())
}
