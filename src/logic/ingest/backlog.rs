//! Retry Backlog
//!
//! Observations that failed on a transient store error wait here, oldest
//! first, until the store is back. The queue is bounded: when full, the
//! oldest observation is evicted.
//!
//! Flow:
//! 1. Ingest fails with a transient error -> `push`
//! 2. Before the next observation -> `retry` (stops at the first transient failure)
//! 3. A conflict stops the retry and is handed back to the caller

use std::collections::VecDeque;

use super::types::{IngestError, IngestOutcome, Observation};

struct Pending {
    observation: Observation,
    attempts: u32,
}

/// What one `retry` pass did
#[derive(Debug, Default)]
pub struct RetryReport {
    pub ingested: Vec<IngestOutcome>,
    /// Rejected for good (invalid or unreadable)
    pub dropped: usize,
    /// Still waiting after this pass
    pub remaining: usize,
}

pub struct RetryBacklog {
    pending: VecDeque<Pending>,
    capacity: usize,
    evicted: u64,
}

impl RetryBacklog {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Observations lost to a full queue so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Queue an observation that already failed once.
    /// Returns the observation evicted to make room, if any.
    pub fn push(&mut self, observation: Observation) -> Option<Observation> {
        let evicted = if self.pending.len() >= self.capacity {
            self.pending.pop_front().map(|old| {
                self.evicted += 1;
                log::warn!(
                    "Retry backlog full ({}), dropping observation for '{}' after {} attempt(s)",
                    self.capacity,
                    old.observation.device_id,
                    old.attempts
                );
                old.observation
            })
        } else {
            None
        };

        self.pending.push_back(Pending {
            observation,
            attempts: 1,
        });
        log::trace!("Queued observation for retry (backlog size: {})", self.pending.len());
        evicted
    }

    /// Re-run queued observations in arrival order through `ingest`.
    ///
    /// Stops at the first transient failure and keeps that observation at
    /// the front. A conflict is returned as an error; the conflicting
    /// observation is not requeued.
    pub fn retry<F>(&mut self, mut ingest: F) -> Result<RetryReport, IngestError>
    where
        F: FnMut(&Observation) -> Result<IngestOutcome, IngestError>,
    {
        let mut report = RetryReport::default();

        while let Some(mut item) = self.pending.pop_front() {
            item.attempts += 1;
            match ingest(&item.observation) {
                Ok(outcome) => report.ingested.push(outcome),
                Err(e @ IngestError::ConcurrencyConflict(_)) => return Err(e),
                Err(e) if e.is_transient() => {
                    log::debug!(
                        "Store still unavailable for '{}' (attempt {}): {}",
                        item.observation.device_id,
                        item.attempts,
                        e
                    );
                    self.pending.push_front(item);
                    break;
                }
                Err(e) => {
                    log::warn!("Dropping queued observation for '{}': {}", item.observation.device_id, e);
                    report.dropped += 1;
                }
            }
        }

        report.remaining = self.pending.len();
        if !report.ingested.is_empty() {
            log::info!(
                "Retry backlog: {} ingested, {} still waiting",
                report.ingested.len(),
                report.remaining
            );
        }
        Ok(report)
    }
}
