//! # Stream Reader Module
//!
//! Turns a live audio source into a stream of note events.
//!
//! ## Architecture
//! - **Producer thread**: owns the audio source, the sliding buffer and the
//!   stream clock; reads audio, runs the extractor per window, publishes notes
//! - **Consumers**: poll the bounded note queue without blocking
//! - **Shutdown**: cooperative, checked once per window, never mid-extraction
//!
//! Each window holds the carried-over tail of the previous window plus at
//! least `chunk_size * replenish_multiplier` new samples. After extraction the
//! stream clock advances by the duration of the new samples and the buffer is
//! cut back to its last `chunk_size * carryover_multiplier` samples.
//!
//! The extractor's lookahead is left to the next window, so the carryover
//! must hold at least twice the lookahead: once for the provisional tail and
//! once for the audio in front of it.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};

use crate::audio::{AudioSource, MicrophoneSource};
use crate::buffer::SlidingBuffer;
use crate::config::StreamConfig;
use crate::error::ConfigError;
use crate::extract::NoteExtractor;
use crate::queue::{NotePublisher, NoteSubscriber, note_queue};
use crate::window::{WindowClock, process_window};

/// Maximum time `ListenSession::stop` waits for the producer to finish.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// What happened during one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub clock: WindowClock,
    /// Samples handed to the extractor, carry-over included.
    pub window_samples: usize,
    pub new_samples: usize,
    pub published: usize,
    pub dropped: usize,
}

/// Windowing state of one streaming session.
pub struct StreamReader<E> {
    config: StreamConfig,
    extractor: E,
    buffer: SlidingBuffer,
    stream_clock: f64,
}

impl<E: NoteExtractor> StreamReader<E> {
    pub fn new(config: StreamConfig, extractor: E) -> Result<Self, ConfigError> {
        config.validate()?;
        let required = 2 * extractor.lookahead_samples(config.sample_rate);
        if config.carryover_samples() < required {
            return Err(ConfigError::Carryover {
                carryover: config.carryover_samples(),
                required,
            });
        }
        let capacity = config.carryover_samples() + config.replenish_samples() + config.chunk_size;
        Ok(Self {
            config,
            extractor,
            buffer: SlidingBuffer::with_capacity(capacity),
            stream_clock: 0.0,
        })
    }

    /// Stream time of the first sample not yet processed, in seconds.
    pub fn stream_clock(&self) -> f64 {
        self.stream_clock
    }

    /// Samples currently carried over to the next window.
    pub fn carryover_len(&self) -> usize {
        self.buffer.len()
    }

    /// Reads one window from `source`, extracts its notes and publishes them.
    pub fn step<S>(&mut self, source: &mut S, publisher: &NotePublisher) -> Result<WindowReport>
    where
        S: AudioSource + ?Sized,
    {
        let sample_rate = source.sample_rate();
        let carryover_samples = self.buffer.len();

        while self.buffer.len() - carryover_samples < self.config.replenish_samples() {
            let chunk = source.read(self.config.chunk_size)?;
            if chunk.is_empty() {
                bail!("audio source returned no samples");
            }
            self.buffer.extend_from_slice(&chunk);
        }

        let window_samples = self.buffer.len();
        let new_samples = window_samples - carryover_samples;
        let clock = WindowClock::new(
            self.stream_clock,
            carryover_samples,
            new_samples,
            self.extractor.lookahead_samples(sample_rate),
            sample_rate,
        );
        let notes = process_window(&self.extractor, self.buffer.as_slice(), sample_rate, &clock);
        let published = notes.len();
        let dropped = publisher.publish_all(notes);

        self.stream_clock += new_samples as f64 / sample_rate as f64;
        self.buffer.retain_tail(self.config.carryover_samples());

        debug!(
            "[STREAM] window at {:.3}s: {} samples ({} new), {} notes, {} dropped",
            clock.stream_clock, window_samples, new_samples, published, dropped
        );
        Ok(WindowReport {
            clock,
            window_samples,
            new_samples,
            published,
            dropped,
        })
    }

    /// Processes windows until a shutdown signal arrives or the source fails.
    ///
    /// The shutdown channel is checked before every window; a closed channel
    /// counts as a shutdown request.
    pub fn run<S>(
        &mut self,
        source: &mut S,
        publisher: &NotePublisher,
        shutdown: &Receiver<()>,
    ) -> Result<()>
    where
        S: AudioSource + ?Sized,
    {
        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    info!("[STREAM] Received shutdown signal");
                    return Ok(());
                }
                Err(TryRecvError::Empty) => {}
            }
            self.step(source, publisher)?;
        }
    }
}

/// A running producer thread and the means to stop it.
#[derive(Debug)]
pub struct ListenSession {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<Result<()>>>,
}

impl ListenSession {
    /// Starts listening on the default input device.
    pub fn spawn<E>(config: StreamConfig, extractor: E) -> Result<(Self, NoteSubscriber)>
    where
        E: NoteExtractor + 'static,
    {
        Self::spawn_with(config, extractor, MicrophoneSource::open)
    }

    /// Starts a producer thread reading from the source built by `open`.
    ///
    /// The source is created and dropped on the producer thread, so it does
    /// not need to be `Send`. Configuration errors are reported before the
    /// thread starts.
    pub fn spawn_with<E, S, F>(
        config: StreamConfig,
        extractor: E,
        open: F,
    ) -> Result<(Self, NoteSubscriber)>
    where
        E: NoteExtractor + 'static,
        S: AudioSource,
        F: FnOnce(u32) -> Result<S> + Send + 'static,
    {
        let (publisher, subscriber) = note_queue(config.queue_capacity)?;
        let sample_rate = config.sample_rate;
        let mut reader = StreamReader::new(config, extractor)?;
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        let thread_handle = thread::Builder::new()
            .name("note-producer".into())
            .spawn(move || -> Result<()> {
                info!("[STREAM] Starting note producer...");
                let mut source = open(sample_rate).context("opening audio input")?;
                let result = reader.run(&mut source, &publisher, &shutdown_rx);
                if let Err(e) = &result {
                    error!("[STREAM] Note producer failed: {e:#}");
                }
                info!("[STREAM] Note producer finished at {:.3}s", reader.stream_clock());
                result
            })?;

        Ok((
            Self {
                shutdown_tx,
                thread_handle: Some(thread_handle),
            },
            subscriber,
        ))
    }

    /// Whether the producer thread is still running.
    pub fn is_alive(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the producer to stop and waits for it to finish.
    ///
    /// # Returns
    /// * `Ok(())` - The producer ended cleanly, or did not finish in time and was detached
    /// * `Err(e)` - The producer failed or panicked
    pub fn stop(mut self) -> Result<()> {
        let _ = self.shutdown_tx.try_send(());
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("[STREAM] Producer did not stop within {STOP_TIMEOUT:?}, detaching");
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        handle
            .join()
            .map_err(|_| anyhow!("note producer panicked"))?
    }
}

impl Drop for ListenSession {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            let _ = self.shutdown_tx.try_send(());
        }
    }
}
