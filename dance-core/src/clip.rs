//! # Clip Analysis Module
//!
//! Batch note extraction for a whole audio file.
//!
//! A clip can be cloned into several sheets, standing in for separate stems
//! until real stem separation exists. Every sheet carries its own note list.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::NoteEvent;
use crate::config::ExtractionConfig;
use crate::decode::{self, Clip};
use crate::error::ConfigError;
use crate::extract::{ExtractionMode, Extractor, NoteExtractor};

/// Notes of one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub index: usize,
    pub notes: Vec<NoteEvent>,
}

/// Extracts the notes of `clip` once per clone.
///
/// # Arguments
/// * `clip` - Decoded mono audio
/// * `extractor` - Duration or onset extractor
/// * `n_clones` - Number of sheets to produce, at least 1
///
/// # Returns
/// * `Ok(sheets)` - One sheet per clone, indexed from 0
/// * `Err(ConfigError::Clones)` - `n_clones` is zero
pub fn analyze_clip<E>(clip: &Clip, extractor: &E, n_clones: usize) -> Result<Vec<Sheet>, ConfigError>
where
    E: NoteExtractor + ?Sized,
{
    if n_clones == 0 {
        return Err(ConfigError::Clones);
    }

    // clones share the same audio, so one extraction serves all of them
    let notes = extractor.extract(&clip.samples, clip.sample_rate);
    info!(
        "[EXTRACT] {} notes in {:.2}s of audio ({:?})",
        notes.len(),
        clip.duration(),
        extractor.mode()
    );

    Ok((0..n_clones)
        .map(|index| Sheet {
            index,
            notes: notes.clone(),
        })
        .collect())
}

/// Decodes `path` and extracts its notes with the given settings.
pub fn analyze_file(
    path: impl AsRef<Path>,
    mode: ExtractionMode,
    config: &ExtractionConfig,
) -> Result<Vec<Sheet>> {
    let path = path.as_ref();
    let extractor = Extractor::from_config(mode, config)?;
    let clip = decode::load(path).with_context(|| format!("decoding {}", path.display()))?;
    Ok(analyze_clip(&clip, &extractor, config.n_clones)?)
}
