// dance-core/src/lib.rs

//! The core logic for the circular note sheet.
//! This crate is responsible for audio capture, chroma analysis and
//! note extraction, both for whole clips and for live input streams.
//! It is completely headless and contains no drawing code.

pub mod audio;
pub mod buffer;
pub mod chroma;
pub mod clip;
pub mod config;
pub mod decode;
pub mod durations;
pub mod error;
pub mod extract;
pub mod fft;
pub mod morphology;
pub mod onset;
pub mod onsets;
pub mod queue;
pub mod stream;
pub mod window;

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, DecodeError};
pub use extract::{ExtractionMode, Extractor, NoteExtractor};

/// A single note extracted from audio.
///
/// Times are in seconds. For clip analysis they are relative to the start of
/// the clip, for streams they are expressed on the stream clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Chroma class of the note, 0 (C) to 11 (B).
    pub note: u8,
    /// Time at which the note becomes active.
    pub onset: f64,
    /// Time at which the note stops being active.
    /// `None` for onset-only events, which carry no duration information.
    pub conclusion: Option<f64>,
    /// Chroma energy of the note: the mean over the active span for
    /// durations, the instantaneous magnitude for onsets.
    pub energy: f32,
}

impl NoteEvent {
    /// Length of the note in seconds, if it has a conclusion.
    pub fn duration(&self) -> Option<f64> {
        self.conclusion.map(|c| c - self.onset)
    }

    /// Shifts all times of the event by `offset` seconds.
    pub fn shifted(mut self, offset: f64) -> Self {
        self.onset += offset;
        self.conclusion = self.conclusion.map(|c| c + offset);
        self
    }
}
