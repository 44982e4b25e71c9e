//! Configuration for the built-in checks
//!
//! ```toml
//! [environment]
//! edition = "community"
//! interface = "packet_capture"
//! mode = "standard"
//!
//! [scan_detection]
//! num_incomplete_flows_threshold = 32
//! as_client_threshold = 0   # 0 disables the sub-condition
//!
//! [category_names]
//! "12" = "Remote Access"
//! ```

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::checks::ScanThresholds;
use crate::error::{CheckError, Result};
use crate::types::{Environment, StaticTaxonomy};

/// Counter threshold; 0 means disabled
///
/// A disabled threshold is never crossed, whatever the counter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct Threshold(Option<NonZeroU64>);

impl Threshold {
    pub const DISABLED: Threshold = Threshold(None);

    pub fn new(value: u64) -> Self {
        Self(NonZeroU64::new(value))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Configured value, 0 when disabled
    pub fn value(&self) -> u64 {
        self.0.map_or(0, NonZeroU64::get)
    }

    pub fn value_u32(&self) -> u32 {
        u32::try_from(self.value()).unwrap_or(u32::MAX)
    }

    /// Boundary-inclusive comparison
    pub fn is_crossed(&self, counter: u64) -> bool {
        match self.0 {
            Some(limit) => counter >= limit.get(),
            None => false,
        }
    }
}

impl From<u64> for Threshold {
    fn from(value: u64) -> Self {
        Threshold::new(value)
    }
}

impl From<Threshold> for u64 {
    fn from(threshold: Threshold) -> u64 {
        threshold.value()
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "disabled"),
        }
    }
}

/// Top-level check configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub tcp_flow_reset: ToggleConfig,

    #[serde(default)]
    pub remote_to_local_insecure_proto: ToggleConfig,

    #[serde(default)]
    pub scan_detection: ScanDetectionConfig,

    /// Category code -> display name, layered over the built-in table
    #[serde(default)]
    pub category_names: HashMap<String, String>,
}

impl ChecksConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        info!("Loaded check configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ChecksConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.scan_detection.validate()?;
        self.category_overrides()?;
        Ok(())
    }

    fn category_overrides(&self) -> Result<HashMap<u16, String>> {
        self.category_names
            .iter()
            .map(|(id, name)| {
                id.parse::<u16>()
                    .map(|id| (id, name.clone()))
                    .map_err(|_| CheckError::ConfigError(format!("invalid category id: {:?}", id)))
            })
            .collect()
    }

    /// Built-in taxonomy with the configured category names applied
    pub fn taxonomy(&self) -> Result<StaticTaxonomy> {
        Ok(StaticTaxonomy::with_overrides(&self.category_overrides()?))
    }
}

/// On/off switch for checks without tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Scan detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDetectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_incomplete_flows_threshold")]
    pub num_incomplete_flows_threshold: Threshold,

    #[serde(default = "default_server_ports_threshold")]
    pub num_server_ports_threshold: Threshold,

    #[serde(default)]
    pub as_client_threshold: Threshold,

    #[serde(default)]
    pub as_server_threshold: Threshold,

    /// Share of the score attributed to the scanning host (0-100)
    #[serde(default = "default_client_risk_pct")]
    pub client_risk_pct: u8,
}

fn default_true() -> bool { true }
fn default_incomplete_flows_threshold() -> Threshold { Threshold::new(32) }
fn default_server_ports_threshold() -> Threshold { Threshold::new(64) }
fn default_client_risk_pct() -> u8 { 100 }

impl Default for ScanDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_incomplete_flows_threshold: default_incomplete_flows_threshold(),
            num_server_ports_threshold: default_server_ports_threshold(),
            as_client_threshold: Threshold::DISABLED,
            as_server_threshold: Threshold::DISABLED,
            client_risk_pct: default_client_risk_pct(),
        }
    }
}

impl ScanDetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_risk_pct > 100 {
            return Err(CheckError::InvalidRiskPercentage(self.client_risk_pct));
        }
        self.thresholds().validate()?;
        Ok(())
    }

    pub fn thresholds(&self) -> ScanThresholds {
        ScanThresholds {
            num_incomplete_flows: self.num_incomplete_flows_threshold,
            num_server_ports: self.num_server_ports_threshold,
            as_client: self.as_client_threshold,
            as_server: self.as_server_threshold,
        }
    }

    /// At least one sub-condition can fire
    pub fn has_enabled_threshold(&self) -> bool {
        self.thresholds().any_enabled()
    }
}
