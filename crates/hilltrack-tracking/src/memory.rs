//! Bounded per-frame feature memory.

use crate::classifier::stack_rows;
use hilltrack_core::TrackResult;
use ndarray::Array2;
use std::collections::VecDeque;

/// FIFO of feature batches, one per admitted frame, holding at most
/// `capacity` batches.
#[derive(Debug, Clone)]
pub struct FeatureMemory {
    capacity: usize,
    batches: VecDeque<Array2<f32>>,
}

impl FeatureMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            batches: VecDeque::with_capacity(capacity.saturating_add(1)),
        }
    }

    /// Append a batch, evicting the oldest ones past capacity.
    ///
    /// Returns the number of evicted batches.
    pub fn push(&mut self, batch: Array2<f32>) -> usize {
        self.batches.push_back(batch);
        let mut evicted = 0;
        while self.batches.len() > self.capacity {
            self.batches.pop_front();
            evicted += 1;
        }
        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total feature rows across all batches.
    pub fn rows(&self) -> usize {
        self.batches.iter().map(|b| b.nrows()).sum()
    }

    /// Batches from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Array2<f32>> {
        self.batches.iter()
    }

    /// All retained batches stacked row-wise, oldest first.
    pub fn concat_all(&self) -> TrackResult<Array2<f32>> {
        self.concat_recent(self.batches.len())
    }

    /// The newest `min(n, len)` batches stacked row-wise, oldest first.
    pub fn concat_recent(&self, n: usize) -> TrackResult<Array2<f32>> {
        self.concat_recent_with(None, n)
    }

    /// Like [`concat_recent`](Self::concat_recent), read as if `pending` had
    /// already been pushed. The memory itself is left untouched.
    pub fn concat_recent_with(
        &self,
        pending: Option<&Array2<f32>>,
        n: usize,
    ) -> TrackResult<Array2<f32>> {
        let total = self.batches.len() + usize::from(pending.is_some());
        let keep = total.min(self.capacity).min(n);
        let recent: Vec<Array2<f32>> = self
            .batches
            .iter()
            .chain(pending)
            .skip(total - keep)
            .cloned()
            .collect();
        stack_rows(&recent)
    }
}
