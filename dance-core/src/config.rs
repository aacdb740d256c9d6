//! # Configuration Module
//!
//! Settings for note extraction and for live stream processing.
//! Every struct validates itself before use so that bad values are rejected
//! before a file is decoded or a device is opened.
//!
//! The whole configuration can be saved to and loaded from a JSON file.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extract::ExtractionMode;

/// Chroma hop length used by default, in samples.
pub const DEFAULT_HOP_LENGTH: usize = 512;

/// Settings shared by both extractors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Chroma energy threshold for considering a note as active, in (0, 1].
    pub threshold: f32,
    /// Hop length of the chromagram in samples.
    pub hop_length: usize,
    /// Number of times a clip is cloned into separate sheets.
    pub n_clones: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            hop_length: DEFAULT_HOP_LENGTH,
            n_clones: 1,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.threshold)?;
        if self.hop_length == 0 {
            return Err(ConfigError::HopLength);
        }
        if self.n_clones == 0 {
            return Err(ConfigError::Clones);
        }
        Ok(())
    }
}

/// Checks that a threshold lies in (0, 1].
pub fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
    // NaN fails both comparisons
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Threshold(threshold))
    }
}

/// Windowing and queueing settings of a live stream.
///
/// The stream reader waits for `chunk_size * replenish_multiplier` new samples
/// before each extraction, and keeps the last `chunk_size * carryover_multiplier`
/// samples as context for the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    /// Number of frames read from the device per call.
    pub chunk_size: usize,
    pub replenish_multiplier: usize,
    pub carryover_multiplier: usize,
    /// Maximum number of notes waiting for the consumer.
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            chunk_size: 1024,
            replenish_multiplier: 1,
            carryover_multiplier: 20,
            queue_capacity: 4096,
        }
    }
}

impl StreamConfig {
    /// Windowing preset suited to the given extraction mode.
    ///
    /// Onset detection is cheap per call and wants low latency, so it
    /// processes every chunk. Duration detection waits for a longer window
    /// to capture full note spans before thresholding.
    pub fn for_mode(mode: ExtractionMode) -> Self {
        let replenish_multiplier = match mode {
            ExtractionMode::Onsets => 1,
            ExtractionMode::Durations => 5,
        };
        Self {
            replenish_multiplier,
            carryover_multiplier: 20,
            ..Self::default()
        }
    }

    /// Number of new samples required before a window is processed.
    pub fn replenish_samples(&self) -> usize {
        self.chunk_size * self.replenish_multiplier
    }

    /// Number of samples carried over into the next window.
    pub fn carryover_samples(&self) -> usize {
        self.chunk_size * self.carryover_multiplier
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::SampleRate);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ChunkSize);
        }
        if self.replenish_multiplier == 0 {
            return Err(ConfigError::Multiplier { name: "replenish" });
        }
        if self.carryover_multiplier == 0 {
            return Err(ConfigError::Multiplier { name: "carryover" });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        Ok(())
    }
}

/// Complete application configuration as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub extraction: ExtractionConfig,
    /// Stream settings; when absent the preset for the chosen mode is used.
    pub stream: Option<StreamConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.extraction.validate()?;
        if let Some(stream) = &self.stream {
            stream.validate()?;
        }
        Ok(())
    }
}

/// Saves the configuration to a pretty-printed JSON file.
pub fn save_config(config: &AppConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json_string = serde_json::to_string_pretty(config)?;
    let mut file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(json_string.as_bytes())?;
    Ok(())
}

/// Loads and validates a configuration from a JSON file.
///
/// Missing fields fall back to their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let config: AppConfig = serde_json::from_str(&data)
        .with_context(|| format!("parsing {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds() {
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(0.01).is_ok());
        assert_eq!(validate_threshold(0.0), Err(ConfigError::Threshold(0.0)));
        assert!(validate_threshold(1.5).is_err());
        assert!(validate_threshold(f32::NAN).is_err());
    }

    #[test]
    fn rejects_zero_clones() {
        let config = ExtractionConfig {
            n_clones: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Clones));
    }

    #[test]
    fn presets_follow_mode() {
        let onsets = StreamConfig::for_mode(ExtractionMode::Onsets);
        let durations = StreamConfig::for_mode(ExtractionMode::Durations);
        assert_eq!(onsets.replenish_samples(), 1024);
        assert_eq!(durations.replenish_samples(), 5 * 1024);
        assert_eq!(durations.carryover_samples(), 20 * 1024);
        assert!(onsets.validate().is_ok());
    }

    #[test]
    fn rejects_zero_queue() {
        let config = StreamConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::QueueCapacity));
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dance.json");
        let config = AppConfig {
            extraction: ExtractionConfig {
                threshold: 0.9,
                ..Default::default()
            },
            stream: Some(StreamConfig::for_mode(ExtractionMode::Durations)),
        };
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "extraction": { "threshold": 0.5 } }"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.extraction.threshold, 0.5);
        assert_eq!(config.extraction.hop_length, DEFAULT_HOP_LENGTH);
        assert!(config.stream.is_none());
    }

    #[test]
    fn invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "extraction": { "threshold": 2.0 } }"#).unwrap();
        assert!(load_config(&path).is_err());
    }
}
