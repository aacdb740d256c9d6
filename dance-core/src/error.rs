//! Typed errors raised by the core before or around note extraction.

use thiserror::Error;

/// Invalid settings, detected at construction time before any audio is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be in (0, 1], got {0}")]
    Threshold(f32),

    #[error("number of clones must be greater than 0")]
    Clones,

    #[error("hop length must be greater than 0")]
    HopLength,

    #[error("sample rate must be greater than 0")]
    SampleRate,

    #[error("chunk size must be greater than 0")]
    ChunkSize,

    #[error("{name} multiplier must be greater than 0")]
    Multiplier { name: &'static str },

    #[error("queue capacity must be greater than 0")]
    QueueCapacity,

    #[error("carryover of {carryover} samples is too short, the extractor needs {required}")]
    Carryover { carryover: usize, required: usize },
}

/// Failures while turning an audio file into samples.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not read audio file: {0}")]
    Read(#[from] hound::Error),

    #[error("unsupported audio container .{extension}, only WAV files can be decoded")]
    UnsupportedContainer { extension: String },

    #[error("unsupported sample format: {bits}-bit {format}")]
    UnsupportedFormat { bits: u16, format: &'static str },

    #[error("audio file contains no samples")]
    Empty,
}
