use crate::error::Result;
use crate::health::HealthConfig;
use crate::io;
use crate::paths;
use crate::strategy::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Contents of `.idehealth/config.yaml`. Every field has a default, so an
/// absent or partial file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    pub fn exists(root: &Path) -> bool {
        paths::config_path(root).exists()
    }

    /// Load the config for `root`, falling back to defaults when the file is
    /// missing.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        match io::read_if_exists(&path)? {
            Some(data) => Ok(serde_yaml::from_str(&data)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if self.health.max_failures == 0 {
            warn(
                WarnLevel::Error,
                "health.max_failures is 0: every failed probe would open the circuit".into(),
            );
        }
        if self.health.cache_ttl_ms == 0 {
            warn(
                WarnLevel::Warning,
                "health.cache_ttl_ms is 0: probe results are never reused".into(),
            );
        }
        if self.health.circuit_reset_ms == 0 {
            warn(
                WarnLevel::Warning,
                "health.circuit_reset_ms is 0: open circuits close immediately".into(),
            );
        }

        let snapshot = Path::new(&self.health.snapshot_path);
        if self.health.snapshot_path.is_empty()
            || snapshot.is_absolute()
            || snapshot.components().any(|c| c == Component::ParentDir)
        {
            warn(
                WarnLevel::Error,
                format!(
                    "health.snapshot_path '{}' must be a relative path inside the project",
                    self.health.snapshot_path
                ),
            );
        }

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            warn(
                WarnLevel::Warning,
                format!(
                    "retry.backoff_multiplier {} is below 1 and will be treated as 1",
                    self.retry.backoff_multiplier
                ),
            );
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            warn(
                WarnLevel::Warning,
                format!(
                    "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({}); every delay is capped",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            );
        }
        if self.retry.max_retries > 10 {
            warn(
                WarnLevel::Warning,
                format!(
                    "retry.max_retries is {}: failing operations will stall for a long time",
                    self.retry.max_retries
                ),
            );
        }

        warnings
    }
}
