use std::sync::atomic::{AtomicU64, Ordering};

use crate::{CommentOutcome, FailureKind};

/// Point-in-time copy of [`RuntimeCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeCountersSnapshot {
    pub events_received: u64,
    pub events_ignored: u64,
    pub duplicate_events: u64,
    pub decode_failures: u64,
    pub replies_posted: u64,
    pub comments_skipped: u64,
    pub substitution_failures: u64,
    pub api_failures: u64,
    pub archive_failures: u64,
    pub worker_panics: u64,
}

/// Lock-free counters shared by workers and the heartbeat.
#[derive(Debug, Default)]
pub struct RuntimeCounters {
    events_received: AtomicU64,
    events_ignored: AtomicU64,
    duplicate_events: AtomicU64,
    decode_failures: AtomicU64,
    replies_posted: AtomicU64,
    comments_skipped: AtomicU64,
    substitution_failures: AtomicU64,
    api_failures: AtomicU64,
    archive_failures: AtomicU64,
    worker_panics: AtomicU64,
}

impl RuntimeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_event(&self) {
        self.duplicate_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_panic(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &CommentOutcome) {
        match outcome {
            CommentOutcome::Replied { archived, .. } => {
                self.replies_posted.fetch_add(1, Ordering::Relaxed);
                if !archived {
                    self.archive_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            CommentOutcome::Skipped(_) => {
                self.comments_skipped.fetch_add(1, Ordering::Relaxed);
            }
            CommentOutcome::Failed(FailureKind::Substitution) => {
                self.substitution_failures.fetch_add(1, Ordering::Relaxed);
            }
            CommentOutcome::Failed(FailureKind::ParentFetch | FailureKind::Post) => {
                self.api_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Total comment events handed to workers.
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            replies_posted: self.replies_posted.load(Ordering::Relaxed),
            comments_skipped: self.comments_skipped.load(Ordering::Relaxed),
            substitution_failures: self.substitution_failures.load(Ordering::Relaxed),
            api_failures: self.api_failures.load(Ordering::Relaxed),
            archive_failures: self.archive_failures.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
        }
    }
}
