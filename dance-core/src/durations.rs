//! # Note Duration Module
//!
//! Extracts notes together with their duration from a clip.
//!
//! This does not detect note onsets. A note is a run of consecutive frames
//! in which one chroma row stays above the energy threshold; its onset is the
//! start of the run's first frame and its conclusion the end of the last one.
//!
//! For a fixed pitch class the returned time ranges never overlap, as runs on
//! one chroma row are disjoint by construction.

use log::debug;
use ndarray::Array2;

use crate::NoteEvent;
use crate::chroma::{ChromaNorm, ChromaParams, Chromagram, compute_chromagram};
use crate::morphology::{label_rows, run_boundaries};

/// Extracts every note whose chroma energy stays above `threshold`.
///
/// # Arguments
/// * `samples` - Mono audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `threshold` - Chroma energy share in (0, 1] above which a pitch class is active
/// * `hop_length` - Chroma hop length in samples
///
/// # Returns
/// * `Vec<NoteEvent>` - One event per run, ordered by pitch class then time
pub fn extract_note_durations(
    samples: &[f32],
    sample_rate: u32,
    threshold: f32,
    hop_length: usize,
) -> Vec<NoteEvent> {
    // per-frame L1 norm makes the threshold a share of the frame's energy
    let chroma = compute_chromagram(
        samples,
        sample_rate,
        &ChromaParams::with_hop_length(hop_length),
        ChromaNorm::L1,
    );
    note_durations(&chroma, threshold)
}

/// Extracts duration notes from an already computed chromagram.
pub fn note_durations(chroma: &Chromagram, threshold: f32) -> Vec<NoteEvent> {
    let energy = chroma.energy();
    let active = energy.mapv(|v| v > threshold);
    let (labels, label_count) = label_rows(&active);
    if label_count == 0 {
        return Vec::new();
    }

    let boundary = run_boundaries(&active);
    let spans = pair_boundaries(&boundary, &labels);
    let (rows, energies) = label_statistics(energy, &labels, label_count);

    let events: Vec<NoteEvent> = spans
        .into_iter()
        .map(|(label, first, last)| NoteEvent {
            note: rows[label - 1] as u8,
            onset: chroma.frame_time(first),
            // a frame's time is its start, so the note ends one frame after `last`
            conclusion: Some(chroma.frame_time(last + 1)),
            energy: energies[label - 1],
        })
        .collect();

    debug!(
        "[EXTRACT] {} duration notes from {} frames",
        events.len(),
        chroma.n_frames()
    );
    events
}

/// Pairs boundary pixels into `(label, first_frame, last_frame)` spans.
///
/// Boundary pixels are visited in row-major order. Two consecutive pixels
/// sharing a label are the two ends of one run; a pixel whose successor has
/// another label (or that is the last one) is a single-frame run.
fn pair_boundaries(boundary: &Array2<bool>, labels: &Array2<usize>) -> Vec<(usize, usize, usize)> {
    let marks: Vec<(usize, usize)> = boundary
        .indexed_iter()
        .filter(|(_, on)| **on)
        .map(|((r, c), _)| (labels[[r, c]], c))
        .collect();

    let mut spans = Vec::with_capacity(marks.len());
    let mut i = 0;
    while i < marks.len() {
        let (label, first) = marks[i];
        match marks.get(i + 1) {
            Some(&(next_label, last)) if next_label == label => {
                spans.push((label, first, last));
                i += 2;
            }
            _ => {
                spans.push((label, first, first));
                i += 1;
            }
        }
    }
    spans
}

/// Chroma row and mean energy of every label.
fn label_statistics(
    energy: &Array2<f32>,
    labels: &Array2<usize>,
    label_count: usize,
) -> (Vec<usize>, Vec<f32>) {
    let mut rows = vec![0usize; label_count];
    let mut sums = vec![0.0f32; label_count];
    let mut counts = vec![0usize; label_count];

    for ((r, c), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        rows[label - 1] = r;
        sums[label - 1] += energy[[r, c]];
        counts[label - 1] += 1;
    }

    let means = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &count)| sum / count as f32)
        .collect();
    (rows, means)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE_RATE: u32 = 22050;
    const HOP: usize = 512;

    fn chromagram(energy: Array2<f32>) -> Chromagram {
        Chromagram::from_energy(energy, SAMPLE_RATE, HOP)
    }

    #[test]
    fn single_run_becomes_one_note() {
        let mut energy = Array2::zeros((12, 30));
        for frame in 10..15 {
            energy[[4, frame]] = 1.0;
        }
        let chroma = chromagram(energy);
        let events = note_durations(&chroma, 0.9);

        assert_eq!(events.len(), 1);
        let event = events[0];
        assert_eq!(event.note, 4);
        assert_relative_eq!(event.onset, 10.0 * chroma.frame_period(), epsilon = 1e-12);
        assert_relative_eq!(event.conclusion.unwrap(), 15.0 * chroma.frame_period(), epsilon = 1e-12);
        assert_relative_eq!(event.energy, 1.0);
    }

    #[test]
    fn silence_has_no_notes() {
        let chroma = chromagram(Array2::zeros((12, 40)));
        assert!(note_durations(&chroma, 0.1).is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        let chroma = chromagram(Array2::from_elem((12, 5), 0.5));
        assert!(note_durations(&chroma, 0.5).is_empty());
    }

    #[test]
    fn single_frame_run_lasts_one_period() {
        let mut energy = Array2::zeros((12, 8));
        energy[[7, 3]] = 0.8;
        let chroma = chromagram(energy);
        let events = note_durations(&chroma, 0.5);

        assert_eq!(events.len(), 1);
        assert_relative_eq!(events[0].duration().unwrap(), chroma.frame_period(), epsilon = 1e-12);
        assert_relative_eq!(events[0].energy, 0.8);
    }

    #[test]
    fn runs_touching_edges_are_kept() {
        let mut energy = Array2::zeros((12, 6));
        energy[[0, 0]] = 1.0;
        energy[[0, 1]] = 1.0;
        energy[[2, 5]] = 1.0;
        let chroma = chromagram(energy);
        let events = note_durations(&chroma, 0.5);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].note, 0);
        assert_relative_eq!(events[0].onset, 0.0);
        assert_relative_eq!(events[0].conclusion.unwrap(), chroma.frame_time(2));
        assert_eq!(events[1].note, 2);
        assert_relative_eq!(events[1].conclusion.unwrap(), chroma.frame_time(6));
    }

    #[test]
    fn energy_is_mean_over_whole_run() {
        let mut energy = Array2::zeros((12, 6));
        energy[[3, 1]] = 0.6;
        energy[[3, 2]] = 1.0;
        energy[[3, 3]] = 0.8;
        let events = note_durations(&chromagram(energy), 0.5);
        assert_eq!(events.len(), 1);
        assert_relative_eq!(events[0].energy, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn same_note_spans_never_overlap() {
        // deterministic pseudo-random mask
        let mut state = 0x2545_f491_u32;
        let energy = Array2::from_shape_fn((12, 200), |_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 1000) as f32 / 1000.0
        });
        let chroma = chromagram(energy);
        let events = note_durations(&chroma, 0.4);
        assert!(!events.is_empty());

        for note in 0..12u8 {
            let mut spans: Vec<(f64, f64)> = events
                .iter()
                .filter(|e| e.note == note)
                .map(|e| (e.onset, e.conclusion.unwrap()))
                .collect();
            spans.sort_by(|a, b| a.0.total_cmp(&b.0));
            for pair in spans.windows(2) {
                assert!(pair[0].1 <= pair[1].0);
            }
        }
        for event in &events {
            let duration = event.duration().unwrap();
            assert!(duration > 0.0);
            assert!(duration >= chroma.frame_period() - 1e-12);
        }
    }

    #[test]
    fn sustained_tone_is_one_note() {
        let samples: Vec<f32> = (0..SAMPLE_RATE as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        let events = extract_note_durations(&samples, SAMPLE_RATE, 0.5, HOP);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].note, 9);
        assert_relative_eq!(events[0].onset, 0.0);
        assert!(events[0].conclusion.unwrap() > 0.9);
    }
}
