//! Receiver configuration file
//!
//! TOML by default, YAML when the file ends in `.yml` or `.yaml`. Every field
//! has a default so a partial file (or none at all) is valid.

use anyhow::{anyhow, Context, Result};
use common::types::SubcarrierSpacing;
use nr_phy::config::DEFAULT_HALFBAND_LENGTH;
use nr_phy::resampler::design_halfband;
use nr_phy::SsbDetectorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RxConfig {
    /// Detector parameters
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Detector parameters as written in the file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectorConfig {
    /// Subcarrier spacing in kHz (15 or 30)
    #[serde(default = "default_scs_khz")]
    pub scs_khz: u32,
    /// FFT size at the correlator rate
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// SSB cyclic prefix length
    #[serde(default = "default_cp_length")]
    pub cp_length: usize,
    /// Peak picker window, odd
    #[serde(default = "default_window_length")]
    pub window_length: usize,
    /// Detection threshold relative to window energy
    #[serde(default = "default_threshold_db")]
    pub threshold_db: f32,
    /// Threshold floor
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f32,
    /// Halfband decimator length, 4k+3 (15 kHz only)
    #[serde(default = "default_halfband_taps")]
    pub halfband_taps: usize,
}

fn default_scs_khz() -> u32 {
    30
}

fn default_fft_size() -> usize {
    256
}

fn default_cp_length() -> usize {
    18
}

fn default_window_length() -> usize {
    11
}

fn default_threshold_db() -> f32 {
    -6.0
}

fn default_min_threshold() -> f32 {
    1e-9
}

fn default_halfband_taps() -> usize {
    DEFAULT_HALFBAND_LENGTH
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scs_khz: default_scs_khz(),
            fft_size: default_fft_size(),
            cp_length: default_cp_length(),
            window_length: default_window_length(),
            threshold_db: default_threshold_db(),
            min_threshold: default_min_threshold(),
            halfband_taps: default_halfband_taps(),
        }
    }
}

impl DetectorConfig {
    /// Build and validate the detector configuration
    pub fn to_detector_config(&self) -> Result<SsbDetectorConfig> {
        let scs = SubcarrierSpacing::from_khz(self.scs_khz)
            .ok_or_else(|| anyhow!("Invalid subcarrier spacing: {} kHz", self.scs_khz))?;

        let config = SsbDetectorConfig {
            scs,
            fft_size: self.fft_size,
            cp_length: self.cp_length,
            window_length: self.window_length,
            threshold_db: self.threshold_db,
            min_threshold: self.min_threshold,
            halfband_taps: design_halfband(self.halfband_taps),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "nr_phy=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl RxConfig {
    /// Load from a TOML or YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml") | Some("yaml")
        );

        if is_yaml {
            Self::from_yaml_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
    }

    /// Parse TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid TOML configuration")
    }

    /// Parse YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Invalid YAML configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = RxConfig::from_toml_str("").unwrap();
        assert_eq!(config, RxConfig::default());

        let detector = config.detector.to_detector_config().unwrap();
        assert_eq!(detector, SsbDetectorConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = RxConfig::from_toml_str(
            r#"
            [detector]
            scs_khz = 15
            threshold_db = -9.0

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.detector.scs_khz, 15);
        assert_eq!(config.detector.threshold_db, -9.0);
        assert_eq!(config.detector.window_length, 11);
        assert_eq!(config.log.level, "debug");

        let detector = config.detector.to_detector_config().unwrap();
        assert_eq!(detector.scs, SubcarrierSpacing::Scs15);
        assert_eq!(detector.halfband_taps.len(), 47);
    }

    #[test]
    fn test_yaml() {
        let config = RxConfig::from_yaml_str(
            "detector:\n  window_length: 7\n  min_threshold: 0.001\n",
        )
        .unwrap();
        assert_eq!(config.detector.window_length, 7);
        assert_eq!(config.detector.min_threshold, 0.001);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let detector = DetectorConfig { scs_khz: 60, ..DetectorConfig::default() };
        assert!(detector.to_detector_config().is_err());

        let detector = DetectorConfig { window_length: 12, ..DetectorConfig::default() };
        assert!(detector.to_detector_config().is_err());

        // 45 taps is not 4k+3
        let detector = DetectorConfig { scs_khz: 15, halfband_taps: 45, ..DetectorConfig::default() };
        assert!(detector.to_detector_config().is_err());
    }
}
