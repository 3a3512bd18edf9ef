//! Declarative sanitizer configuration (YAML).
//!
//! ```yaml
//! default_option:
//!   l2norm_bound: 1.0
//!   clip: true
//! overrides:
//!   layer1/weights:
//!     l2norm_bound: 4.0
//!     clip: true
//! clip_scope: per_example
//! seed: 42
//! accountant:
//!   kind: amortized
//!   total_examples: 60000
//!   budget:
//!     epsilon: 8.0
//!     delta: 1.0e-5
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::accountant::{AccountantConfig, PrivacyAccountant};
use crate::clip::{ClipOption, ClipScope};
use crate::error::{DpError, Result};
use crate::sanitizer::Sanitizer;

/// Sanitizer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Clip option used when neither the call nor an override supplies a bound
    #[serde(default)]
    pub default_option: ClipOption,
    /// Per-tensor clip options keyed by tensor name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, ClipOption>,
    /// Which slices the norm bound applies to
    #[serde(default)]
    pub clip_scope: ClipScope,
    /// Seed for reproducible noise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Accountant to build with [`SanitizerConfig::build`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accountant: Option<AccountantConfig>,
}

impl SanitizerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set default clip option
    pub fn with_default_option(mut self, option: ClipOption) -> Self {
        self.default_option = option;
        self
    }

    /// Add a per-tensor override
    pub fn with_override(mut self, tensor_name: impl Into<String>, option: ClipOption) -> Self {
        self.overrides.insert(tensor_name.into(), option);
        self
    }

    /// Set clip scope
    pub fn with_clip_scope(mut self, scope: ClipScope) -> Self {
        self.clip_scope = scope;
        self
    }

    /// Set noise seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set accountant configuration
    pub fn with_accountant(mut self, accountant: AccountantConfig) -> Self {
        self.accountant = Some(accountant);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_option("default_option", &self.default_option)?;
        for (name, option) in &self.overrides {
            validate_option(name, option)?;
        }
        if let Some(accountant) = &self.accountant {
            accountant.validate()?;
        }
        Ok(())
    }

    /// Parse configuration from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| DpError::InvalidConfig(format!("Failed to parse YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = fs::read_to_string(path.as_ref()).map_err(|e| {
            DpError::InvalidConfig(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| DpError::InvalidConfig(format!("Failed to serialize config: {e}")))
    }

    /// Build a sanitizer together with the configured accountant
    pub fn build(&self) -> Result<Sanitizer> {
        let accountant_config = self
            .accountant
            .as_ref()
            .ok_or_else(|| DpError::InvalidConfig("missing accountant section".to_string()))?;
        let accountant: Arc<dyn PrivacyAccountant> = Arc::from(accountant_config.build()?);
        Sanitizer::from_config(self, accountant)
    }
}

fn validate_option(name: &str, option: &ClipOption) -> Result<()> {
    match option.l2norm_bound {
        Some(bound) if !bound.is_finite() || bound <= 0.0 => Err(DpError::InvalidConfig(format!(
            "l2norm_bound for {name} must be positive, got {bound}"
        ))),
        None if option.clip => Err(DpError::InvalidConfig(format!(
            "{name} enables clipping without an l2norm_bound"
        ))),
        _ => Ok(()),
    }
}
