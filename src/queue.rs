//! Bounded ingestion queue between the producer and the session worker.
//!
//! Video and audio share one queue so the worker sees them in commit order.
//! The queue's `closed` flag, flipped under the same lock that guards the
//! items, decides the commit/finish race: a commit either lands before the
//! close or is rejected after it.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::config::{Backpressure, QueueConfig};
use crate::sample::{MediaKind, SampleBuffer};
use crate::status::RecorderError;

/// Completion handler, invoked exactly once on the worker thread.
pub type CompletionHandler = Box<dyn FnOnce(Option<PathBuf>) + Send + 'static>;

pub(crate) enum QueueItem {
    Sample(SampleBuffer),
    Finish(CompletionHandler),
}

/// Counters shared between the producer side and the worker.
#[derive(Debug, Default)]
pub struct QueueCounters {
    pub committed: AtomicU64,
    pub dropped: AtomicU64,
}

struct State {
    items: VecDeque<QueueItem>,
    samples: usize,
    closed: bool,
}

pub(crate) struct IngestQueue {
    config: QueueConfig,
    state: Mutex<State>,
    available: Condvar,
    space: Condvar,
    counters: QueueCounters,
}

impl IngestQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                items: VecDeque::new(),
                samples: 0,
                closed: false,
            }),
            available: Condvar::new(),
            space: Condvar::new(),
            counters: QueueCounters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a sample, applying the kind's backpressure policy when full.
    pub fn push(&self, sample: SampleBuffer) -> Result<(), RecorderError> {
        let kind = sample.kind();
        let policy = match kind {
            MediaKind::Video => self.config.video,
            MediaKind::Audio => self.config.audio,
        };

        let mut state = self.lock();
        if state.closed {
            return Err(RecorderError::invalid_operation("recording is finishing"));
        }

        if state.samples >= self.config.capacity {
            match policy {
                Backpressure::DropOldest => {
                    let oldest = state.items.iter().position(
                        |item| matches!(item, QueueItem::Sample(s) if s.kind() == kind),
                    );
                    if let Some(index) = oldest {
                        state.items.remove(index);
                        state.samples -= 1;
                        let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::warn!(
                            "Ingestion queue full ({} items), dropped oldest {:?} sample ({} total)",
                            self.config.capacity,
                            kind,
                            dropped
                        );
                    }
                }
                Backpressure::Block { timeout } => {
                    let deadline = Instant::now() + timeout;
                    while state.samples >= self.config.capacity && !state.closed {
                        let now = Instant::now();
                        if now >= deadline {
                            tracing::debug!(
                                "Ingestion queue still full after {:?}, enqueueing {:?} past capacity",
                                timeout,
                                kind
                            );
                            break;
                        }
                        state = self
                            .space
                            .wait_timeout(state, deadline - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                    if state.closed {
                        return Err(RecorderError::invalid_operation("recording is finishing"));
                    }
                }
            }
        }

        state.items.push_back(QueueItem::Sample(sample));
        state.samples += 1;
        self.counters.committed.fetch_add(1, Ordering::Relaxed);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Close the queue and append the finish marker behind all queued samples.
    ///
    /// Returns the handler back if the queue was already closed.
    pub fn close(&self, handler: CompletionHandler) -> Result<(), CompletionHandler> {
        let mut state = self.lock();
        if state.closed {
            return Err(handler);
        }
        state.closed = true;
        state.items.push_back(QueueItem::Finish(handler));
        drop(state);
        self.available.notify_one();
        self.space.notify_all();
        Ok(())
    }

    /// Block until an item is available.
    pub fn pop(&self) -> QueueItem {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                if matches!(item, QueueItem::Sample(_)) {
                    state.samples -= 1;
                    drop(state);
                    self.space.notify_one();
                }
                return item;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of samples waiting for the worker.
    pub fn depth(&self) -> usize {
        self.lock().samples
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn counters(&self) -> &QueueCounters {
        &self.counters
    }
}
