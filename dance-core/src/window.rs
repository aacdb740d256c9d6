//! # Streaming Window Module
//!
//! Runs an extractor on one window of a live stream and moves the resulting
//! notes onto the stream clock.
//!
//! A window is the carried-over tail of the previous window followed by new
//! samples. Each window reports the notes of its reporting region only:
//!
//! ```text
//! |------------ carryover ------------|-------------- new ---------------|
//!                      (------------ reported ------------]
//!                      region_start            region_end |-- lookahead -|
//! ```
//!
//! The last `lookahead` samples are provisional: their frames lack the audio
//! that follows, so the next window reports them instead. The region start
//! moves back by the same amount, so consecutive regions tile the stream.

use crate::NoteEvent;
use crate::extract::{AnchoredNote, ExtractionMode, NoteExtractor};

/// Where a window sits on the stream clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowClock {
    /// Stream time of the first new sample, in seconds.
    pub stream_clock: f64,
    /// Number of carried-over samples at the start of the window.
    pub carryover_samples: usize,
    /// Duration of the carried-over samples, in seconds.
    pub carryover_time: f64,
    /// Exclusive start of the reporting region, in window samples.
    pub region_start: usize,
    /// Inclusive end of the reporting region, in window samples.
    pub region_end: usize,
    pub sample_rate: u32,
}

impl WindowClock {
    /// # Arguments
    /// * `stream_clock` - Stream time of the first new sample
    /// * `carryover_samples` - Samples carried over from the previous window
    /// * `new_samples` - Samples read for this window
    /// * `lookahead_samples` - Trailing samples left to the next window
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(
        stream_clock: f64,
        carryover_samples: usize,
        new_samples: usize,
        lookahead_samples: usize,
        sample_rate: u32,
    ) -> Self {
        Self {
            stream_clock,
            carryover_samples,
            carryover_time: carryover_samples as f64 / sample_rate as f64,
            region_start: carryover_samples.saturating_sub(lookahead_samples),
            region_end: (carryover_samples + new_samples).saturating_sub(lookahead_samples),
            sample_rate,
        }
    }
}

/// Extracts the notes of one window, expressed in stream time.
///
/// # Arguments
/// * `extractor` - Duration or onset extractor
/// * `buffer` - Carried-over samples followed by new samples
/// * `sample_rate` - Sample rate in Hz
/// * `clock` - Position of the window on the stream clock
///
/// # Returns
/// * `Vec<NoteEvent>` - Notes of the reporting region, in stream time
pub fn process_window<E>(
    extractor: &E,
    buffer: &[f32],
    sample_rate: u32,
    clock: &WindowClock,
) -> Vec<NoteEvent>
where
    E: NoteExtractor + ?Sized,
{
    let notes = extractor.extract_anchored(buffer, sample_rate);
    align_to_stream(extractor.mode(), notes, clock)
}

/// Converts window-relative notes to stream time, keeping those of the
/// reporting region.
///
/// Onsets are kept when their anchor lies in the region; the onset time itself
/// may fall before it. Durations are kept when they overlap the region and are
/// clipped to it. Region membership is decided on whole samples, so two
/// windows never both claim a note on their shared boundary.
pub fn align_to_stream(
    mode: ExtractionMode,
    notes: Vec<AnchoredNote>,
    clock: &WindowClock,
) -> Vec<NoteEvent> {
    let rate = clock.sample_rate as f64;
    let to_sample = |time: f64| (time * rate).round();
    let start = clock.region_start as f64;
    let end = clock.region_end as f64;

    notes
        .into_iter()
        .filter_map(|note| {
            let mut event = note.event;
            match mode {
                ExtractionMode::Onsets => {
                    let anchor = to_sample(note.anchor);
                    if anchor <= start || anchor > end {
                        return None;
                    }
                }
                ExtractionMode::Durations => {
                    let conclusion = event.conclusion?;
                    if to_sample(conclusion) <= start || to_sample(event.onset) >= end {
                        return None;
                    }
                    event.onset = event.onset.max(start / rate);
                    event.conclusion = Some(conclusion.min(end / rate));
                }
            }
            Some(
                event
                    .shifted(-clock.carryover_time)
                    .shifted(clock.stream_clock),
            )
        })
        .collect()
}
