//! Configuration for the downsampler
//!
//! Serde-backed configuration with per-field defaults, validated once at
//! startup. Resolutions and TTLs are parallel lists: `ttls_secs[i]` is the
//! TTL applied to rows written at `resolutions_ms[i]`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::downsample::DownsamplerSettings;
use crate::error::{Error, Result};
use crate::memory::ArenaConfig;
use crate::types::DsResolution;

/// Downsampler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownsamplerConfig {
    /// Raw dataset the downsample datasets are derived from
    #[serde(default = "default_raw_dataset")]
    pub raw_dataset: String,

    /// Raw schema names expected in the input
    #[serde(default)]
    pub raw_schema_names: Vec<String>,

    /// Downsample resolutions as period lengths in milliseconds
    #[serde(default = "default_resolutions_ms")]
    pub resolutions_ms: Vec<i64>,

    /// Per-resolution TTLs in seconds, parallel to `resolutions_ms`
    #[serde(default = "default_ttls_secs")]
    pub ttls_secs: Vec<u64>,

    /// Store write timeout in milliseconds
    #[serde(default = "default_store_write_timeout_ms")]
    pub store_write_timeout_ms: u64,

    /// Optional class name providing store session credentials
    #[serde(default)]
    pub session_provider: Option<String>,

    /// Rows per write buffer before it is encoded into a chunk
    #[serde(default = "default_write_buffer_rows")]
    pub write_buffer_rows: usize,

    /// Write buffer sets each schema pool may have outstanding at once
    #[serde(default = "default_buffer_pool_capacity")]
    pub buffer_pool_capacity: usize,
}

// Default value functions
fn default_raw_dataset() -> String {
    "prometheus".to_string()
}
fn default_resolutions_ms() -> Vec<i64> {
    vec![300_000, 3_600_000] // 5 minutes, 1 hour
}
fn default_ttls_secs() -> Vec<u64> {
    vec![30 * 86_400, 365 * 86_400]
}
fn default_store_write_timeout_ms() -> u64 {
    30_000
}
fn default_write_buffer_rows() -> usize {
    1_000
}
fn default_buffer_pool_capacity() -> usize {
    256
}

impl Default for DownsamplerConfig {
    fn default() -> Self {
        Self {
            raw_dataset: default_raw_dataset(),
            raw_schema_names: Vec::new(),
            resolutions_ms: default_resolutions_ms(),
            ttls_secs: default_ttls_secs(),
            store_write_timeout_ms: default_store_write_timeout_ms(),
            session_provider: None,
            write_buffer_rows: default_write_buffer_rows(),
            buffer_pool_capacity: default_buffer_pool_capacity(),
        }
    }
}

impl DownsamplerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.settings()?.validate()
    }

    /// Build the driver settings this configuration describes
    pub fn settings(&self) -> Result<DownsamplerSettings> {
        if self.resolutions_ms.len() != self.ttls_secs.len() {
            return Err(Error::Configuration(format!(
                "{} resolutions but {} TTLs",
                self.resolutions_ms.len(),
                self.ttls_secs.len()
            )));
        }
        let mut resolutions = Vec::with_capacity(self.resolutions_ms.len());
        for (ms, ttl) in self.resolutions_ms.iter().zip(&self.ttls_secs) {
            let res = DsResolution::from_millis(*ms).ok_or_else(|| {
                Error::Configuration(format!("resolution {} ms is not positive", ms))
            })?;
            resolutions.push((res, *ttl));
        }
        Ok(DownsamplerSettings {
            raw_dataset: self.raw_dataset.clone(),
            resolutions,
            store_write_timeout: Duration::from_millis(self.store_write_timeout_ms),
        })
    }

    /// Arena sizing knobs this configuration describes
    pub fn arena_config(&self) -> ArenaConfig {
        ArenaConfig {
            write_buffer_rows: self.write_buffer_rows,
            pool_capacity: self.buffer_pool_capacity,
            ..ArenaConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DownsamplerConfig::default();
        config.validate().unwrap();

        let settings = config.settings().unwrap();
        assert_eq!(settings.raw_dataset, "prometheus");
        assert_eq!(settings.resolutions.len(), 2);
        assert_eq!(settings.resolutions[0].0.to_minutes(), 5);
        assert_eq!(settings.resolutions[1].0.to_minutes(), 60);
        assert_eq!(settings.store_write_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_mismatched_ttl_list() {
        let config = DownsamplerConfig {
            ttls_secs: vec![86_400],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_resolution() {
        let config = DownsamplerConfig {
            resolutions_ms: vec![0, 3_600_000],
            ..Default::default()
        };
        assert!(config.settings().is_err());
    }
}
