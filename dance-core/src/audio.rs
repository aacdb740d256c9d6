//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! It opens the default input device and exposes it as a blocking source of
//! mono sample blocks for the stream reader.
//!
//! ## Features
//! - Automatic audio device selection
//! - Nearest supported sample rate to the requested one
//! - Any channel count, downmixed to mono
//! - Stream stopped and released whenever the source is dropped
//! - Bounded capture backlog; blocks beyond it are dropped and reported

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

/// Longest wait for the device to deliver audio before a read fails.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Capture blocks waiting for the reader before new ones are dropped.
/// At typical callback sizes this is a few seconds of audio.
const MAX_PENDING_BLOCKS: usize = 256;

/// A blocking supplier of mono audio.
pub trait AudioSource {
    /// Sample rate of the delivered audio in Hz.
    fn sample_rate(&self) -> u32;

    /// Blocks until exactly `n_frames` mono samples are available and returns them.
    fn read(&mut self, n_frames: usize) -> Result<Vec<f32>>;
}

/// Live input from the default capture device.
///
/// The underlying stream is paused and released when the source is dropped,
/// on every exit path of its owner.
pub struct MicrophoneSource {
    stream: cpal::Stream,
    blocks: Receiver<Vec<f32>>,
    dropped_blocks: Arc<AtomicUsize>,
    pending: Vec<f32>,
    sample_rate: u32,
}

/// Capture callback side of the block channel. Never blocks.
struct BlockSender {
    tx: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
}

impl BlockSender {
    fn push(&self, block: Vec<f32>) {
        match self.tx.try_send(block) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // the reader is gone once the source is dropped
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl MicrophoneSource {
    /// Opens the default input device.
    ///
    /// # Arguments
    /// * `target_rate` - Desired sample rate in Hz; the closest supported rate is used
    ///
    /// # Returns
    /// * `Ok(source)` - Running capture stream
    /// * `Err(e)` - No device, no f32 format, or the stream failed to start
    pub fn open(target_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        info!("[AUDIO] Using audio input device: {}", device.name()?);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, target_rate)
            .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

        let rate = target_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
        let channels = config.channels() as usize;
        let config: cpal::StreamConfig = config.into();

        info!("[AUDIO] Selected sample rate: {rate} Hz, {channels} channel(s)");

        let (tx, block_rx) = crossbeam_channel::bounded::<Vec<f32>>(MAX_PENDING_BLOCKS);
        let dropped_blocks = Arc::new(AtomicUsize::new(0));
        let sender = BlockSender {
            tx,
            dropped: dropped_blocks.clone(),
        };
        let err_fn = |err| error!("[AUDIO] An error occurred on the audio stream: {err}");

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sender.push(downmix(data, channels));
            },
            err_fn,
            None,
        )?;

        stream.play()?;

        Ok(Self {
            stream,
            blocks: block_rx,
            dropped_blocks,
            pending: Vec::new(),
            sample_rate: rate,
        })
    }
}

impl AudioSource for MicrophoneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, n_frames: usize) -> Result<Vec<f32>> {
        let dropped = self.dropped_blocks.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!("[AUDIO] Extraction is falling behind, dropped {dropped} input blocks");
        }
        while self.pending.len() < n_frames {
            match self.blocks.recv_timeout(READ_TIMEOUT) {
                Ok(block) => self.pending.extend_from_slice(&block),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(anyhow!("input device delivered no audio for {READ_TIMEOUT:?}"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("input stream closed"));
                }
            }
        }
        Ok(self.pending.drain(..n_frames).collect())
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        debug!("[AUDIO] Stopping input stream");
        if let Err(e) = self.stream.pause() {
            error!("[AUDIO] Error pausing stream: {e}");
        }
    }
}

/// Averages interleaved frames down to one channel.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float formats qualify. Mono is preferred, then the
/// configuration whose rate range lies closest to the target.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let (min, max) = (c.min_sample_rate().0, c.max_sample_rate().0);
            let rate_diff = if (min..=max).contains(&target_rate) {
                0
            } else {
                (min as i64 - target_rate as i64).abs().min((max as i64 - target_rate as i64).abs())
            };
            (c.channels() != 1, rate_diff)
        })
}
