//! Audio file decoding.
//!
//! WAV files of any common sample format are read at their native sample rate
//! and downmixed to mono floats in [-1, 1]. Compressed containers (MP3, OGG,
//! FLAC) are rejected up front with a typed error.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use log::info;

use crate::error::DecodeError;

/// A decoded mono clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Loads a WAV file as a mono clip.
pub fn load(path: impl AsRef<Path>) -> Result<Clip, DecodeError> {
    let path = path.as_ref();
    check_container(path)?;
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, bits) => {
            return Err(DecodeError::UnsupportedFormat {
                bits,
                format: "float",
            });
        }
        (SampleFormat::Int, bits) => {
            return Err(DecodeError::UnsupportedFormat { bits, format: "int" });
        }
    };

    let samples: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    info!(
        "[DECODE] Loaded {}: {} samples at {} Hz",
        path.display(),
        samples.len(),
        spec.sample_rate
    );
    Ok(Clip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Rejects files whose extension names another container. Files without an
/// extension are left to the WAV reader.
fn check_container(path: &Path) -> Result<(), DecodeError> {
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        return Ok(());
    };
    if extension.eq_ignore_ascii_case("wav") || extension.eq_ignore_ascii_case("wave") {
        Ok(())
    } else {
        Err(DecodeError::UnsupportedContainer {
            extension: extension.to_ascii_lowercase(),
        })
    }
}
