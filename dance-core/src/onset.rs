//! # Onset Detection Module
//!
//! Finds attack points in a clip from its spectral flux.
//!
//! Algorithm:
//! 1. Centred STFT (2048 points, same hop as the chromagram)
//! 2. Log-power spectrum in dB, clipped to 80 dB below the clip's peak
//! 3. Positive difference from the previous frame, averaged over bins
//! 4. Min-max normalisation of the envelope
//! 5. Peak picking against a local maximum and a local mean
//! 6. Optional backtracking of each peak to the preceding envelope minimum

use crate::fft::Stft;

/// FFT size of the onset strength envelope.
pub const ONSET_N_FFT: usize = 2048;

const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;
const LOWEST_HZ: f32 = 20.0;

/// Computes the onset strength envelope of `samples`, one value per frame.
///
/// The envelope has the same number of frames as a chromagram computed with
/// the same hop length. The first frame has no predecessor and is zero.
pub fn onset_strength(samples: &[f32], sample_rate: u32, hop_length: usize) -> Vec<f32> {
    let stft = Stft::new(ONSET_N_FFT, hop_length);
    let band: Vec<usize> = (0..stft.n_bins())
        .filter(|&bin| stft.bin_frequency(bin, sample_rate) >= LOWEST_HZ)
        .collect();
    if band.is_empty() {
        return vec![0.0; stft.n_frames(samples.len())];
    }

    // first pass: reference level for the dB floor
    let mut peak_power = 0.0f32;
    stft.for_each_frame(samples, |_, magnitudes| {
        for &bin in &band {
            peak_power = peak_power.max(magnitudes[bin] * magnitudes[bin]);
        }
    });
    let floor_db = power_to_db(peak_power) - TOP_DB;

    let mut envelope = Vec::with_capacity(stft.n_frames(samples.len()));
    let mut previous = vec![0.0f32; band.len()];
    let mut current = vec![0.0f32; band.len()];
    stft.for_each_frame(samples, |frame, magnitudes| {
        for (slot, &bin) in current.iter_mut().zip(&band) {
            *slot = power_to_db(magnitudes[bin] * magnitudes[bin]).max(floor_db);
        }
        let flux = if frame == 0 {
            0.0
        } else {
            current
                .iter()
                .zip(&previous)
                .map(|(now, before)| (now - before).max(0.0))
                .sum::<f32>()
                / band.len() as f32
        };
        envelope.push(flux);
        std::mem::swap(&mut previous, &mut current);
    });
    envelope
}

fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(AMIN).log10()
}

/// Peak picking windows, in frames.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakPicker {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub wait: usize,
    pub delta: f32,
}

impl PeakPicker {
    /// Default windows: 30 ms before for the maximum, 100 ms around for the
    /// mean, 30 ms minimum spacing, and a 0.07 margin over the mean.
    pub fn new(sample_rate: u32, hop_length: usize) -> Self {
        let frames = |seconds: f64| (seconds * sample_rate as f64) as usize / hop_length;
        Self {
            pre_max: frames(0.03),
            post_max: 1,
            pre_avg: frames(0.10),
            post_avg: frames(0.10) + 1,
            wait: frames(0.03),
            delta: 0.07,
        }
    }

    /// Indices of the peaks of `x`.
    ///
    /// A frame is a peak when it is the maximum of its local window, exceeds
    /// the local mean by `delta`, and lies more than `wait` frames after the
    /// previous peak.
    pub fn pick(&self, x: &[f32]) -> Vec<usize> {
        let len = x.len();
        let mut peaks = Vec::new();
        let mut last: Option<usize> = None;

        for n in 0..len {
            let max_window = &x[n.saturating_sub(self.pre_max)..(n + self.post_max).min(len)];
            let local_max = max_window.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if x[n] != local_max {
                continue;
            }

            let avg_window = &x[n.saturating_sub(self.pre_avg)..(n + self.post_avg).min(len)];
            let local_mean = avg_window.iter().sum::<f32>() / avg_window.len() as f32;
            if x[n] < local_mean + self.delta {
                continue;
            }

            if last.is_none_or(|previous| n > previous + self.wait) {
                peaks.push(n);
                last = Some(n);
            }
        }
        peaks
    }
}

/// An onset frame together with the envelope peak it was detected at.
///
/// Without backtracking both are the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnsetFrame {
    pub frame: usize,
    pub peak: usize,
}

/// Detects onset frames from an onset strength envelope.
///
/// # Arguments
/// * `envelope` - Onset strength, one value per frame
/// * `sample_rate` - Sample rate in Hz
/// * `hop_length` - Hop length of the envelope in samples
/// * `backtrack` - Move each onset back to the preceding envelope minimum
///
/// # Returns
/// * `Vec<usize>` - Ascending onset frame indices, empty for a flat envelope
pub fn detect_onsets(
    envelope: &[f32],
    sample_rate: u32,
    hop_length: usize,
    backtrack: bool,
) -> Vec<usize> {
    detect_onset_frames(envelope, sample_rate, hop_length, backtrack)
        .into_iter()
        .map(|onset| onset.frame)
        .collect()
}

/// Same as [`detect_onsets`], keeping the peak behind every onset.
///
/// When several peaks backtrack to the same minimum, the first one is kept.
pub fn detect_onset_frames(
    envelope: &[f32],
    sample_rate: u32,
    hop_length: usize,
    backtrack: bool,
) -> Vec<OnsetFrame> {
    let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
    let max = envelope.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if envelope.is_empty() || max - min <= f32::EPSILON {
        return Vec::new();
    }

    let normalized: Vec<f32> = envelope.iter().map(|v| (v - min) / (max - min)).collect();
    let peaks = PeakPicker::new(sample_rate, hop_length).pick(&normalized);
    if !backtrack {
        return peaks
            .into_iter()
            .map(|peak| OnsetFrame { frame: peak, peak })
            .collect();
    }

    let mut onsets: Vec<OnsetFrame> = backtrack_to_minima(&peaks, &normalized)
        .into_iter()
        .zip(peaks)
        .map(|(frame, peak)| OnsetFrame { frame, peak })
        .collect();
    onsets.dedup_by_key(|onset| onset.frame);
    onsets
}

/// Samples after a peak that its detection depends on.
///
/// Covers the half FFT frame of the envelope plus the widest peak picking
/// window, rounded up to whole hops.
pub fn onset_context_samples(sample_rate: u32, hop_length: usize) -> usize {
    let picker = PeakPicker::new(sample_rate, hop_length);
    let reach = [picker.pre_max, picker.post_max, picker.pre_avg, picker.post_avg, picker.wait]
        .into_iter()
        .max()
        .unwrap_or(0);
    let context = ONSET_N_FFT / 2 + hop_length * (reach + 1);
    context.div_ceil(hop_length) * hop_length
}

/// Moves every event back to the closest local minimum of `energy` at or before it.
fn backtrack_to_minima(events: &[usize], energy: &[f32]) -> Vec<usize> {
    let mut minima = vec![0];
    for i in 1..energy.len().saturating_sub(1) {
        if energy[i] <= energy[i - 1] && energy[i] < energy[i + 1] {
            minima.push(i);
        }
    }

    events
        .iter()
        .map(|&event| {
            let idx = minima.partition_point(|&m| m <= event);
            minima[idx.saturating_sub(1)]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 22050;
    const HOP: usize = 512;

    /// Silence with short decaying noise bursts starting at `starts` (seconds).
    fn bursts(starts: &[f32], seconds: f32) -> Vec<f32> {
        let mut signal = vec![0.0f32; (SAMPLE_RATE as f32 * seconds) as usize];
        let mut state = 12345u32;
        for &start in starts {
            let pos = (start * SAMPLE_RATE as f32) as usize;
            for j in 0..4000 {
                if pos + j >= signal.len() {
                    break;
                }
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let noise = (state >> 16) as f32 / 32768.0 - 1.0;
                signal[pos + j] = 0.8 * noise * (-(j as f32) / 800.0).exp();
            }
        }
        signal
    }

    #[test]
    fn envelope_matches_frame_count() {
        let samples = bursts(&[0.5], 1.0);
        let envelope = onset_strength(&samples, SAMPLE_RATE, HOP);
        assert_eq!(envelope.len(), 1 + samples.len() / HOP);
        assert_eq!(envelope[0], 0.0);
        assert!(envelope.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn silence_has_no_onsets() {
        let envelope = onset_strength(&vec![0.0; 22050], SAMPLE_RATE, HOP);
        assert!(detect_onsets(&envelope, SAMPLE_RATE, HOP, true).is_empty());
    }

    #[test]
    fn bursts_are_detected() {
        let starts = [0.5f32, 1.5, 2.5];
        let samples = bursts(&starts, 3.2);
        let envelope = onset_strength(&samples, SAMPLE_RATE, HOP);
        let onsets = detect_onsets(&envelope, SAMPLE_RATE, HOP, false);

        for start in starts {
            let expected = start as f64 * SAMPLE_RATE as f64 / HOP as f64;
            assert!(
                onsets.iter().any(|&f| (f as f64 - expected).abs() <= 3.0),
                "no onset near {start}s in {onsets:?}"
            );
        }
    }

    #[test]
    fn backtracking_never_moves_forward() {
        let samples = bursts(&[0.5, 1.5], 2.0);
        let envelope = onset_strength(&samples, SAMPLE_RATE, HOP);
        let peaks = detect_onsets(&envelope, SAMPLE_RATE, HOP, false);
        let backtracked = detect_onsets(&envelope, SAMPLE_RATE, HOP, true);

        assert!(!backtracked.is_empty());
        assert!(backtracked.len() <= peaks.len());
        for onset in &backtracked {
            assert!(peaks.iter().any(|p| p >= onset));
        }
    }

    #[test]
    fn peak_picker_respects_wait() {
        let picker = PeakPicker {
            pre_max: 1,
            post_max: 1,
            pre_avg: 2,
            post_avg: 3,
            wait: 3,
            delta: 0.1,
        };
        let x = [0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        assert_eq!(picker.pick(&x), vec![1, 7]);
    }

    #[test]
    fn backtrack_uses_previous_minimum() {
        let energy = [0.5, 0.2, 0.4, 1.0, 0.3, 0.1, 0.6, 0.9];
        assert_eq!(backtrack_to_minima(&[3, 7], &energy), vec![1, 5]);
        assert_eq!(backtrack_to_minima(&[0], &energy), vec![0]);
    }

    #[test]
    fn onset_frames_keep_their_peaks() {
        let samples = bursts(&[0.5, 1.5], 2.0);
        let envelope = onset_strength(&samples, SAMPLE_RATE, HOP);
        let onsets = detect_onset_frames(&envelope, SAMPLE_RATE, HOP, true);
        let peaks = detect_onsets(&envelope, SAMPLE_RATE, HOP, false);

        assert!(!onsets.is_empty());
        assert_eq!(
            onsets.iter().map(|o| o.frame).collect::<Vec<_>>(),
            detect_onsets(&envelope, SAMPLE_RATE, HOP, true)
        );
        for onset in &onsets {
            assert!(onset.frame <= onset.peak);
            assert!(peaks.contains(&onset.peak));
        }
    }

    #[test]
    fn context_covers_fft_and_picking_windows() {
        let context = onset_context_samples(SAMPLE_RATE, HOP);
        let picker = PeakPicker::new(SAMPLE_RATE, HOP);
        assert_eq!(context % HOP, 0);
        assert!(context >= ONSET_N_FFT / 2 + picker.post_avg * HOP);
        assert_eq!(context, 4096);
    }
}
