//! Configuration for the locator.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $AOA_LOCATOR_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/aoa-locator/config.toml
//!   3. ~/.config/aoa-locator/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::address::BdAddr;
use crate::geometry::ArrayType;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub tags: TagsConfig,
    pub binding: BindingConfig,
    pub array: ArrayConfig,
    pub estimator: EstimatorConfig,
    pub cte: CteConfig,
    pub admission: AdmissionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsConfig {
    /// Upper bound on concurrently tracked tags.
    pub max_tags: usize,
    /// Tags allowed to be tracked, as `AA:BB:CC:DD:EE:FF`. Empty = allow all.
    pub allowlist: Vec<String>,
}

/// How tags deliver CTE to the locator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingMode {
    /// Point-to-point link; CTE enabled through a GATT characteristic.
    #[default]
    Connection,
    /// Periodic advertising sync; no link.
    Connectionless,
    /// Vendor-proprietary CTE on legacy advertisements; no handshake at all.
    Silabs,
}

impl std::str::FromStr for BindingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection" => Ok(Self::Connection),
            "connectionless" => Ok(Self::Connectionless),
            "silabs" => Ok(Self::Silabs),
            other => Err(format!("unknown binding mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub mode: BindingMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    pub array_type: ArrayType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Reference RSSI of a tag at 1.0 m (dBm).
    pub tag_tx_power: f32,
    /// Smoothing weight applied to the distance estimate, 0..=1.
    pub filtering_amount: f32,
    /// Lower bound of the excluded azimuth band. Set both bounds or neither.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth_mask_min: Option<f32>,
    /// Upper bound of the excluded azimuth band.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth_mask_max: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CteConfig {
    /// Measurement interval in connection events (connection binding).
    pub sampling_interval: u8,
    /// Minimum CTE length in 8 us units, 2..=20.
    pub min_length: u8,
    /// CTEs sampled per advertising interval. 0 = all.
    pub count: u8,
    /// Switching and sampling slot in us, 1 or 2.
    pub slot_duration: u8,
}

/// Which reports share one decimation counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionScope {
    #[default]
    PerTag,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Reports counted down before the first one is admitted.
    pub divider: u32,
    /// Counter value after each admitted report.
    pub cadence: u32,
    pub scope: AdmissionScope,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            max_tags: 8,
            allowlist: Vec::new(),
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            tag_tx_power: -45.0,
            filtering_amount: 0.6,
            azimuth_mask_min: None,
            azimuth_mask_max: None,
        }
    }
}

impl Default for CteConfig {
    fn default() -> Self {
        Self {
            sampling_interval: 3,
            min_length: 20,
            count: 0,
            slot_duration: 1,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        // First report admitted is the 11th, then every 4th.
        Self {
            divider: 11,
            cadence: 4,
            scope: AdmissionScope::PerTag,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("aoa-locator")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LocatorConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, falling back to defaults if it does not
    /// exist. No env overrides, no validation.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("AOA_LOCATOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&LocatorConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply AOA_LOCATOR_* overrides. `lookup` resolves a variable name;
    /// unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("AOA_LOCATOR_TAGS__MAX_TAGS") {
            if let Ok(n) = v.parse() {
                self.tags.max_tags = n;
            }
        }
        if let Some(v) = lookup("AOA_LOCATOR_BINDING__MODE") {
            if let Ok(mode) = v.parse() {
                self.binding.mode = mode;
            }
        }
        if let Some(v) = lookup("AOA_LOCATOR_ARRAY__ARRAY_TYPE") {
            if let Ok(t) = v.parse() {
                self.array.array_type = t;
            }
        }
        if let Some(v) = lookup("AOA_LOCATOR_ADMISSION__DIVIDER") {
            if let Ok(n) = v.parse() {
                self.admission.divider = n;
            }
        }
        if let Some(v) = lookup("AOA_LOCATOR_ADMISSION__CADENCE") {
            if let Ok(n) = v.parse() {
                self.admission.cadence = n;
            }
        }
    }

    /// Reject values the radio or the estimator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tags.max_tags == 0 {
            return Err(invalid("tags.max_tags", "must be at least 1"));
        }
        for entry in &self.tags.allowlist {
            entry
                .parse::<BdAddr>()
                .map_err(|e| invalid("tags.allowlist", e.to_string()))?;
        }
        if !(0.0..=1.0).contains(&self.estimator.filtering_amount) {
            return Err(invalid("estimator.filtering_amount", "must be within 0..=1"));
        }
        match (self.estimator.azimuth_mask_min, self.estimator.azimuth_mask_max) {
            (Some(min), Some(max)) if min > max => {
                return Err(invalid("estimator.azimuth_mask_min", "greater than azimuth_mask_max"));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(invalid("estimator.azimuth_mask", "set both bounds or neither"));
            }
            _ => {}
        }
        if !(2..=20).contains(&self.cte.min_length) {
            return Err(invalid("cte.min_length", "must be within 2..=20"));
        }
        if !matches!(self.cte.slot_duration, 1 | 2) {
            return Err(invalid("cte.slot_duration", "must be 1 or 2"));
        }
        if self.admission.divider == 0 || self.admission.cadence == 0 {
            return Err(invalid("admission", "divider and cadence must be at least 1"));
        }
        Ok(())
    }
}
