//! # Chromagram Module
//!
//! Turns a waveform into a 12-row chroma energy matrix (pitch class x time frame).
//!
//! The spectrum of each centred STFT frame is mapped onto the equal-tempered
//! semitones between C1 and the top of the analysed range, and the semitone
//! energies are folded across octaves into 12 pitch classes. Row 0 is C.
//!
//! Frame `i` starts at `i * hop_length / sample_rate` seconds.

use ndarray::{Array2, ArrayView1, Axis};

use crate::fft::Stft;

/// Number of pitch classes per octave.
pub const CHROMA_BINS: usize = 12;

/// Frequency of C1 in Hz, the lower edge of the analysed range.
pub const C1_HZ: f32 = 32.703_197;

const PITCH_CLASSES: [&str; CHROMA_BINS] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Name of a chroma class, e.g. `9 -> "A"`.
pub fn pitch_class_name(note: u8) -> &'static str {
    PITCH_CLASSES[note as usize % CHROMA_BINS]
}

/// Converts a frame index to its start time in seconds.
pub fn frame_to_time(frame: usize, sample_rate: u32, hop_length: usize) -> f64 {
    frame as f64 * hop_length as f64 / sample_rate as f64
}

/// Per-frame normalisation applied to the chroma columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaNorm {
    /// Raw folded magnitudes.
    None,
    /// Each column sums to one, so a value is the share of the frame's energy.
    L1,
    /// Each column's largest value is one.
    #[default]
    Max,
}

/// Parameters of the chroma transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromaParams {
    pub hop_length: usize,
    pub n_fft: usize,
    /// Lowest analysed frequency; maps to chroma row 0.
    pub low_freq: f32,
    pub n_octaves: usize,
}

impl Default for ChromaParams {
    fn default() -> Self {
        Self {
            hop_length: crate::config::DEFAULT_HOP_LENGTH,
            n_fft: 8192,
            low_freq: C1_HZ,
            n_octaves: 7,
        }
    }
}

impl ChromaParams {
    pub fn with_hop_length(hop_length: usize) -> Self {
        Self {
            hop_length,
            ..Self::default()
        }
    }

    /// Samples after a frame's start that its energy depends on, rounded up
    /// to whole hops.
    pub fn context_samples(&self) -> usize {
        (self.n_fft / 2).div_ceil(self.hop_length) * self.hop_length
    }
}

/// Chroma energy matrix with its time base.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromagram {
    energy: Array2<f32>,
    sample_rate: u32,
    hop_length: usize,
}

impl Chromagram {
    /// Wraps an existing `12 x n_frames` energy matrix.
    pub fn from_energy(energy: Array2<f32>, sample_rate: u32, hop_length: usize) -> Self {
        debug_assert_eq!(energy.nrows(), CHROMA_BINS);
        Self {
            energy,
            sample_rate,
            hop_length,
        }
    }

    pub fn energy(&self) -> &Array2<f32> {
        &self.energy
    }

    pub fn n_frames(&self) -> usize {
        self.energy.ncols()
    }

    /// Duration of one frame in seconds.
    pub fn frame_period(&self) -> f64 {
        self.hop_length as f64 / self.sample_rate as f64
    }

    /// Start time of frame `frame` in seconds.
    pub fn frame_time(&self, frame: usize) -> f64 {
        frame_to_time(frame, self.sample_rate, self.hop_length)
    }

    /// Energies of all pitch classes at one frame.
    pub fn column(&self, frame: usize) -> ArrayView1<'_, f32> {
        self.energy.column(frame)
    }
}

/// Computes the chromagram of `samples`.
///
/// # Arguments
/// * `samples` - Mono audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `params` - Transform parameters (hop length, FFT size, range)
/// * `norm` - Per-frame normalisation
///
/// # Returns
/// * `Chromagram` - `12 x (1 + len / hop_length)` matrix, empty for an empty signal
pub fn compute_chromagram(
    samples: &[f32],
    sample_rate: u32,
    params: &ChromaParams,
    norm: ChromaNorm,
) -> Chromagram {
    let stft = Stft::new(params.n_fft, params.hop_length);
    let bin_classes = semitone_classes(&stft, sample_rate, params);
    let mut energy = Array2::<f32>::zeros((CHROMA_BINS, stft.n_frames(samples.len())));

    stft.for_each_frame(samples, |frame, magnitudes| {
        let mut column = energy.column_mut(frame);
        for (mag, class) in magnitudes.iter().zip(&bin_classes) {
            if let Some(class) = class {
                column[*class] += mag;
            }
        }
    });

    normalize(&mut energy, norm);
    Chromagram::from_energy(energy, sample_rate, params.hop_length)
}

/// Maps every FFT bin to the chroma class of its nearest semitone, or `None`
/// if the bin lies outside the analysed range.
fn semitone_classes(stft: &Stft, sample_rate: u32, params: &ChromaParams) -> Vec<Option<usize>> {
    let n_semitones = (CHROMA_BINS * params.n_octaves) as f32;
    (0..stft.n_bins())
        .map(|bin| {
            let freq = stft.bin_frequency(bin, sample_rate);
            if freq <= 0.0 {
                return None;
            }
            let semitone = (CHROMA_BINS as f32 * (freq / params.low_freq).log2()).round();
            if semitone < 0.0 || semitone >= n_semitones {
                None
            } else {
                Some(semitone as usize % CHROMA_BINS)
            }
        })
        .collect()
}

fn normalize(energy: &mut Array2<f32>, norm: ChromaNorm) {
    const FLOOR: f32 = 1e-10;
    for mut column in energy.axis_iter_mut(Axis(1)) {
        let scale = match norm {
            ChromaNorm::None => continue,
            ChromaNorm::L1 => column.iter().map(|v| v.abs()).sum::<f32>(),
            ChromaNorm::Max => column.iter().fold(0.0f32, |m, v| m.max(v.abs())),
        };
        if scale > FLOOR {
            column.mapv_inplace(|v| v / scale);
        } else {
            column.fill(0.0);
        }
    }
}
