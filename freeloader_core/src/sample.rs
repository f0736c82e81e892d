//! Samples and the shared run log.

use chrono::{DateTime, Local};
use std::sync::{Arc, PoisonError, RwLock};

/// One successful poll: wall-clock time, encoder position and force.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub position: i32,
    pub weight: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Local>, position: i32, weight: f64) -> Self {
        Self {
            timestamp,
            position,
            weight,
        }
    }
}

/// Append-only sample sequence for the current run.
///
/// Clones share the same storage. Only the acquisition loop appends;
/// readers take snapshots.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    inner: Arc<RwLock<Vec<Sample>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, sample: Sample) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }

    pub(crate) fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Copy of every sample recorded so far.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of the samples from index `from` onwards.
    pub fn snapshot_from(&self, from: usize) -> Vec<Sample> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(from..).map(<[Sample]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<Sample> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}
