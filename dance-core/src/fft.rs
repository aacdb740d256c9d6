//! # Fast Fourier Transform (FFT) Module
//!
//! This module provides the short-time Fourier transform shared by the
//! chromagram and the onset envelope. It handles framing, windowing and
//! spectrum magnitude calculations.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per transform
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate analysis
//! - Centred frames with zero padding, so frame `i` is centred on sample `i * hop`

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
///
/// # Arguments
/// * `signal` - Audio signal to process (modified in-place)
fn remove_dc_offset(signal: &mut [Complex<f32>]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().map(|c| c.re).sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            sample.re -= avg;
        }
    }
}

/// Builds a Hann window of length `n`.
///
/// The Hann window tapers the frame to zero at the edges, which keeps the
/// energy of a tone concentrated in the bins around its frequency.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// A short-time Fourier transform with fixed frame and hop sizes.
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Stft {
    /// Plans a transform of `n_fft` points advancing `hop_length` samples per frame.
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            fft,
        }
    }

    /// Number of magnitude bins per frame, up to and including Nyquist.
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of centred frames covering `n_samples` samples.
    pub fn n_frames(&self, n_samples: usize) -> usize {
        if n_samples == 0 {
            0
        } else {
            1 + n_samples / self.hop_length
        }
    }

    /// Frequency in Hz of magnitude bin `bin`.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.n_fft as f32
    }

    /// Runs the transform over `samples`, handing each frame's magnitude
    /// spectrum to `visit` in time order.
    ///
    /// Samples outside the signal are treated as zeros.
    pub fn for_each_frame<F>(&self, samples: &[f32], mut visit: F)
    where
        F: FnMut(usize, &[f32]),
    {
        let n_frames = self.n_frames(samples.len());
        let half = (self.n_fft / 2) as isize;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.fft.get_inplace_scratch_len()];
        let mut magnitudes = vec![0.0f32; self.n_bins()];

        for frame in 0..n_frames {
            let start = (frame * self.hop_length) as isize - half;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
                *slot = Complex::new(sample, 0.0);
            }

            remove_dc_offset(&mut buffer);
            for (slot, w) in buffer.iter_mut().zip(&self.window) {
                slot.re *= w;
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);
            for (mag, c) in magnitudes.iter_mut().zip(&buffer) {
                *mag = c.norm(); // .norm() is sqrt(re^2 + im^2)
            }
            visit(frame, &magnitudes);
        }
    }
}
