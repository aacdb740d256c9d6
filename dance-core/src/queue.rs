//! # Note Queue Module
//!
//! Bounded hand-off of note events from the stream producer to consumers.
//!
//! The producer never blocks. When the queue is full it evicts the oldest
//! queued note to make room; if the queue is full again by the time it
//! pushes, the new note is dropped with a warning.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use log::warn;

use crate::NoteEvent;
use crate::error::ConfigError;

/// Result of publishing one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after discarding the oldest waiting note.
    EvictedOldest,
    /// The queue stayed full and the note was dropped.
    Dropped,
}

/// Producer side of the note queue.
#[derive(Debug, Clone)]
pub struct NotePublisher {
    sender: Sender<NoteEvent>,
    // used only to evict the oldest note on overflow
    evictor: Receiver<NoteEvent>,
}

/// Consumer side of the note queue.
#[derive(Debug, Clone)]
pub struct NoteSubscriber {
    receiver: Receiver<NoteEvent>,
}

/// Creates a note queue holding at most `capacity` notes.
pub fn note_queue(capacity: usize) -> Result<(NotePublisher, NoteSubscriber), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::QueueCapacity);
    }
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    Ok((
        NotePublisher {
            sender,
            evictor: receiver.clone(),
        },
        NoteSubscriber { receiver },
    ))
}

impl NotePublisher {
    /// Publishes a note without blocking.
    pub fn publish(&self, note: NoteEvent) -> PushOutcome {
        let mut evicted = false;
        if self.sender.is_full() {
            warn!("[QUEUE] queue full, trying to discard oldest note");
            // a consumer may have emptied the slot in the meantime
            evicted = self.evictor.try_recv().is_ok();
        }

        match self.sender.try_send(note) {
            Ok(()) if evicted => PushOutcome::EvictedOldest,
            Ok(()) => PushOutcome::Queued,
            // the evictor keeps the channel connected, so only Full is expected
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                warn!("[QUEUE] discarded note due to full queue");
                PushOutcome::Dropped
            }
        }
    }

    /// Publishes all notes, returning how many were dropped.
    pub fn publish_all(&self, notes: impl IntoIterator<Item = NoteEvent>) -> usize {
        notes
            .into_iter()
            .filter(|note| self.publish(*note) == PushOutcome::Dropped)
            .count()
    }
}

impl NoteSubscriber {
    /// Takes the oldest waiting note, if any, without blocking.
    pub fn try_get(&self) -> Option<NoteEvent> {
        match self.receiver.try_recv() {
            Ok(note) => Some(note),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Takes every note currently waiting.
    pub fn drain(&self) -> Vec<NoteEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
