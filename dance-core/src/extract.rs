//! # Extraction Module
//!
//! The common interface of the two note extractors.
//!
//! Both batch analysis and the streaming adapter only talk to a
//! [`NoteExtractor`]; [`Extractor`] dispatches to the duration or the onset
//! algorithm depending on its [`ExtractionMode`].

use serde::{Deserialize, Serialize};

use crate::NoteEvent;
use crate::chroma::ChromaParams;
use crate::config::{DEFAULT_HOP_LENGTH, ExtractionConfig, validate_threshold};
use crate::durations::extract_note_durations;
use crate::error::ConfigError;
use crate::onset::onset_context_samples;
use crate::onsets::{anchored_note_onsets, extract_note_onsets_with_hop};

/// Which kind of notes an extractor produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Runs of sustained chroma energy, with onset and conclusion.
    Durations,
    /// Attack points only; events have no conclusion.
    Onsets,
}

/// A note together with the time that decides which stream window reports it.
///
/// For onsets the anchor is the envelope peak the onset was found at, which
/// can lie a few frames after the backtracked onset time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchoredNote {
    pub event: NoteEvent,
    pub anchor: f64,
}

impl From<NoteEvent> for AnchoredNote {
    fn from(event: NoteEvent) -> Self {
        Self {
            anchor: event.onset,
            event,
        }
    }
}

/// Anything that turns a block of samples into note events.
///
/// Event times are relative to the first sample of the block.
pub trait NoteExtractor: Send {
    fn mode(&self) -> ExtractionMode;

    fn extract(&self, samples: &[f32], sample_rate: u32) -> Vec<NoteEvent>;

    /// Like [`extract`](Self::extract), with the time each note is anchored at.
    fn extract_anchored(&self, samples: &[f32], sample_rate: u32) -> Vec<AnchoredNote> {
        self.extract(samples, sample_rate)
            .into_iter()
            .map(AnchoredNote::from)
            .collect()
    }

    /// Number of trailing samples of a block whose notes may still change once
    /// more audio follows. A frame also needs this much audio before it to be
    /// analysed as it would be in a whole clip.
    fn lookahead_samples(&self, _sample_rate: u32) -> usize {
        0
    }
}

/// The chroma based extractor, in either mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Extractor {
    mode: ExtractionMode,
    threshold: f32,
    hop_length: usize,
}

impl Extractor {
    /// Creates an extractor, rejecting thresholds outside (0, 1].
    pub fn new(mode: ExtractionMode, threshold: f32) -> Result<Self, ConfigError> {
        validate_threshold(threshold)?;
        Ok(Self {
            mode,
            threshold,
            hop_length: DEFAULT_HOP_LENGTH,
        })
    }

    pub fn durations(threshold: f32) -> Result<Self, ConfigError> {
        Self::new(ExtractionMode::Durations, threshold)
    }

    pub fn onsets(threshold: f32) -> Result<Self, ConfigError> {
        Self::new(ExtractionMode::Onsets, threshold)
    }

    /// Creates an extractor from a validated configuration.
    pub fn from_config(mode: ExtractionMode, config: &ExtractionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            mode,
            threshold: config.threshold,
            hop_length: config.hop_length,
        })
    }
}

impl NoteExtractor for Extractor {
    fn mode(&self) -> ExtractionMode {
        self.mode
    }

    fn extract(&self, samples: &[f32], sample_rate: u32) -> Vec<NoteEvent> {
        match self.mode {
            ExtractionMode::Durations => {
                extract_note_durations(samples, sample_rate, self.threshold, self.hop_length)
            }
            ExtractionMode::Onsets => {
                extract_note_onsets_with_hop(samples, sample_rate, self.threshold, self.hop_length)
            }
        }
    }

    fn extract_anchored(&self, samples: &[f32], sample_rate: u32) -> Vec<AnchoredNote> {
        match self.mode {
            ExtractionMode::Durations => self
                .extract(samples, sample_rate)
                .into_iter()
                .map(AnchoredNote::from)
                .collect(),
            ExtractionMode::Onsets => {
                anchored_note_onsets(samples, sample_rate, self.threshold, self.hop_length)
            }
        }
    }

    fn lookahead_samples(&self, sample_rate: u32) -> usize {
        let chroma = ChromaParams::with_hop_length(self.hop_length).context_samples();
        match self.mode {
            ExtractionMode::Durations => chroma,
            ExtractionMode::Onsets => chroma.max(onset_context_samples(sample_rate, self.hop_length)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_threshold() {
        assert_eq!(Extractor::durations(0.0), Err(ConfigError::Threshold(0.0)));
        assert!(Extractor::onsets(1.01).is_err());
        assert!(Extractor::onsets(1.0).is_ok());
    }

    #[test]
    fn from_config_checks_everything() {
        let config = ExtractionConfig {
            hop_length: 0,
            ..Default::default()
        };
        assert_eq!(
            Extractor::from_config(ExtractionMode::Onsets, &config),
            Err(ConfigError::HopLength)
        );
    }

    #[test]
    fn duration_mode_sets_conclusions() {
        let sample_rate = 22050;
        let samples: Vec<f32> = (0..sample_rate as usize / 2)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 261.63 * i as f32 / sample_rate as f32).sin())
            .collect();
        let extractor = Extractor::durations(0.5).unwrap();
        let events = extractor.extract(&samples, sample_rate);

        assert_eq!(extractor.mode(), ExtractionMode::Durations);
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.conclusion.is_some()));
        assert!(events.iter().any(|e| e.note == 0));
    }

    #[test]
    fn lookahead_covers_the_analysis_frames() {
        let durations = Extractor::durations(0.5).unwrap();
        let onsets = Extractor::onsets(0.5).unwrap();
        assert_eq!(durations.lookahead_samples(22050), 4096);
        assert_eq!(onsets.lookahead_samples(22050), 4096);
        assert!(onsets.lookahead_samples(44100) > 4096);
        assert_eq!(onsets.lookahead_samples(44100) % DEFAULT_HOP_LENGTH, 0);
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ExtractionMode::Onsets).unwrap(), "\"onsets\"");
    }
}
