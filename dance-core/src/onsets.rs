//! # Note Onset Module
//!
//! Extracts the pitch classes sounding at each detected attack point of a clip.
//! Onset events carry no conclusion.

use log::debug;

use crate::NoteEvent;
use crate::chroma::{ChromaNorm, ChromaParams, Chromagram, compute_chromagram};
use crate::config::DEFAULT_HOP_LENGTH;
use crate::extract::AnchoredNote;
use crate::onset::{OnsetFrame, detect_onset_frames, onset_strength};

/// Extracts note onsets using the default hop length.
///
/// # Arguments
/// * `samples` - Mono audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `threshold` - Chroma energy in (0, 1] above which a pitch class counts as sounding
///
/// # Returns
/// * `Vec<NoteEvent>` - At least one event per detected onset, in time order
pub fn extract_note_onsets(samples: &[f32], sample_rate: u32, threshold: f32) -> Vec<NoteEvent> {
    extract_note_onsets_with_hop(samples, sample_rate, threshold, DEFAULT_HOP_LENGTH)
}

/// Extracts note onsets with an explicit chroma and envelope hop length.
pub fn extract_note_onsets_with_hop(
    samples: &[f32],
    sample_rate: u32,
    threshold: f32,
    hop_length: usize,
) -> Vec<NoteEvent> {
    anchored_note_onsets(samples, sample_rate, threshold, hop_length)
        .into_iter()
        .map(|note| note.event)
        .collect()
}

/// Extracts note onsets, anchoring each one at the envelope peak it was
/// detected from.
///
/// The event onset is the backtracked frame; the anchor is never earlier.
pub fn anchored_note_onsets(
    samples: &[f32],
    sample_rate: u32,
    threshold: f32,
    hop_length: usize,
) -> Vec<AnchoredNote> {
    let chroma = compute_chromagram(
        samples,
        sample_rate,
        &ChromaParams::with_hop_length(hop_length),
        ChromaNorm::Max,
    );
    let envelope = onset_strength(samples, sample_rate, hop_length);
    let onsets = detect_onset_frames(&envelope, sample_rate, hop_length, true);
    sample_onsets(&chroma, &onsets, threshold)
}

/// Samples the chromagram at each onset frame.
///
/// Every pitch class above `threshold` yields an event, so chords produce
/// several simultaneous events. When nothing exceeds the threshold the
/// dominant pitch class is reported anyway.
pub fn note_onsets(chroma: &Chromagram, onset_frames: &[usize], threshold: f32) -> Vec<NoteEvent> {
    let onsets: Vec<OnsetFrame> = onset_frames
        .iter()
        .map(|&frame| OnsetFrame { frame, peak: frame })
        .collect();
    sample_onsets(chroma, &onsets, threshold)
        .into_iter()
        .map(|note| note.event)
        .collect()
}

fn sample_onsets(chroma: &Chromagram, onsets: &[OnsetFrame], threshold: f32) -> Vec<AnchoredNote> {
    let mut notes = Vec::new();
    for onset in onsets {
        if onset.frame >= chroma.n_frames() {
            continue;
        }
        let time = chroma.frame_time(onset.frame);
        let anchor = chroma.frame_time(onset.peak);
        let column = chroma.column(onset.frame);
        let note = |row: usize, energy: f32| AnchoredNote {
            event: NoteEvent {
                note: (row % 12) as u8,
                onset: time,
                conclusion: None,
                energy,
            },
            anchor,
        };

        let before = notes.len();
        notes.extend(
            column
                .iter()
                .enumerate()
                .filter(|(_, magnitude)| **magnitude > threshold)
                .map(|(row, &magnitude)| note(row, magnitude)),
        );

        if notes.len() == before {
            let (row, &magnitude) = column
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .unwrap_or((0, &0.0));
            notes.push(note(row, magnitude));
        }
    }

    debug!(
        "[EXTRACT] {} onset notes from {} onsets",
        notes.len(),
        onsets.len()
    );
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn chromagram(energy: Array2<f32>) -> Chromagram {
        Chromagram::from_energy(energy, 22050, 512)
    }

    #[test]
    fn chords_give_simultaneous_notes() {
        let mut energy = Array2::zeros((12, 10));
        energy[[0, 4]] = 1.0;
        energy[[4, 4]] = 0.95;
        energy[[7, 4]] = 0.5;
        let chroma = chromagram(energy);
        let events = note_onsets(&chroma, &[4], 0.9);

        let notes: Vec<u8> = events.iter().map(|e| e.note).collect();
        assert_eq!(notes, vec![0, 4]);
        assert!(events.iter().all(|e| e.conclusion.is_none()));
        assert!(events.iter().all(|e| e.onset == chroma.frame_time(4)));
    }

    #[test]
    fn weak_onset_falls_back_to_dominant_class() {
        let mut energy = Array2::zeros((12, 10));
        energy[[2, 6]] = 0.3;
        energy[[9, 6]] = 0.6;
        let events = note_onsets(&chromagram(energy), &[6], 0.9);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].note, 9);
        assert_relative_eq!(events[0].energy, 0.6);
    }

    #[test]
    fn every_onset_produces_a_note() {
        let energy = Array2::from_shape_fn((12, 50), |(r, c)| ((r * 7 + c * 3) % 11) as f32 / 10.0);
        let frames: Vec<usize> = (0..50).step_by(5).collect();
        let events = note_onsets(&chromagram(energy), &frames, 0.95);

        for frame in frames {
            let time = 512.0 * frame as f64 / 22050.0;
            assert!(events.iter().any(|e| e.onset == time));
        }
    }

    #[test]
    fn silent_frame_still_reports() {
        let events = note_onsets(&chromagram(Array2::zeros((12, 3))), &[1], 0.5);
        assert_eq!(events.len(), 1);
        assert_relative_eq!(events[0].energy, 0.0);
    }

    #[test]
    fn tone_after_silence_is_detected() {
        let sample_rate = 22050u32;
        let mut samples = vec![0.0f32; sample_rate as usize / 2];
        samples.extend((0..sample_rate as usize / 2).map(|i| {
            0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin()
        }));
        let events = extract_note_onsets(&samples, sample_rate, 0.9);

        assert!(!events.is_empty());
        assert!(
            events
                .iter()
                .any(|e| e.note == 9 && (e.onset - 0.5).abs() < 0.2),
            "{events:?}"
        );
    }

    #[test]
    fn anchors_never_precede_onsets() {
        let sample_rate = 22050u32;
        let mut samples = vec![0.0f32; sample_rate as usize / 2];
        samples.extend((0..sample_rate as usize).map(|i| {
            0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin()
        }));
        let anchored = anchored_note_onsets(&samples, sample_rate, 0.9, DEFAULT_HOP_LENGTH);
        let plain = extract_note_onsets(&samples, sample_rate, 0.9);

        assert!(!anchored.is_empty());
        assert_eq!(anchored.iter().map(|n| n.event).collect::<Vec<_>>(), plain);
        assert!(anchored.iter().all(|n| n.anchor >= n.event.onset));
    }
}
