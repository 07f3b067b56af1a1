//! Per-partition settlement bookkeeping.
//!
//! Deliveries are handed out ahead of settlement and may be settled out of
//! order, so a partition's commit position is the lowest offset that has not
//! been acknowledged yet. A `nack` rewinds the partition: every delivery at
//! or after the rejected offset is invalidated, and messages read ahead of
//! the seek are dropped until the rejected offset comes back.
//!
//! Each admitted delivery carries the partition's generation. Rewinds bump
//! the generation, so settling an invalidated delivery is a no-op.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Result of acknowledging one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    /// Commit this offset (the next one to read) for the partition.
    Commit(i64),
    /// An earlier offset is still unsettled.
    Pending,
    /// The delivery was invalidated by a rewind; it will be redelivered.
    Stale,
}

/// Result of rejecting one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NackOutcome {
    /// Seek the partition back to the rejected offset.
    ///
    /// `attempt` counts consecutive rewinds without an acknowledgement in
    /// between.
    Rewind {
        /// Rewinds since the partition last made progress
        attempt: u32,
    },
    /// The delivery was already invalidated by an earlier rewind.
    Stale,
}

#[derive(Debug)]
struct PartitionOffsets {
    /// Admitted, unsettled offsets and the generation they were admitted in.
    outstanding: BTreeMap<i64, u64>,
    /// One past the last admitted offset.
    high: i64,
    /// Last committed position.
    committed: Option<i64>,
    /// Seek target while a rewind is in progress.
    rewind: Option<i64>,
    generation: u64,
    redeliveries: u32,
}

impl PartitionOffsets {
    const fn starting_at(offset: i64) -> Self {
        Self {
            outstanding: BTreeMap::new(),
            high: offset,
            committed: None,
            rewind: None,
            generation: 0,
            redeliveries: 0,
        }
    }

    fn is_current(&self, offset: i64, generation: u64) -> bool {
        self.outstanding.get(&offset) == Some(&generation)
    }

    fn invalidate_from(&mut self, offset: i64) {
        drop(self.outstanding.split_off(&offset));
        self.generation += 1;
    }
}

/// Settlement state for every partition a consumer has read from.
#[derive(Debug, Default)]
pub(crate) struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionOffsets>,
}

impl OffsetTracker {
    /// Register a message read from the broker.
    ///
    /// Returns the generation to settle it with, or `None` when the message
    /// was read ahead of a pending rewind and must be dropped.
    pub(crate) fn admit(&mut self, topic: &str, partition: i32, offset: i64) -> Option<u64> {
        let state = self
            .partitions
            .entry((topic.to_string(), partition))
            .or_insert_with(|| PartitionOffsets::starting_at(offset));

        if let Some(target) = state.rewind {
            if offset > target {
                return None;
            }
            state.rewind = None;
        }

        // Reading an offset again without a rewind (rebalance, restart of the
        // fetch position) supersedes everything handed out from there on.
        if offset < state.high {
            state.invalidate_from(offset);
        }

        state.outstanding.insert(offset, state.generation);
        state.high = offset + 1;
        Some(state.generation)
    }

    /// Whether a delivery can still be settled.
    pub(crate) fn is_current(&self, topic: &str, partition: i32, offset: i64, generation: u64) -> bool {
        self.partitions
            .get(&(topic.to_string(), partition))
            .is_some_and(|state| state.is_current(offset, generation))
    }

    pub(crate) fn ack(&mut self, topic: &str, partition: i32, offset: i64, generation: u64) -> AckOutcome {
        let Some(state) = self.partitions.get_mut(&(topic.to_string(), partition)) else {
            return AckOutcome::Stale;
        };
        if !state.is_current(offset, generation) {
            return AckOutcome::Stale;
        }

        state.outstanding.remove(&offset);
        state.redeliveries = 0;

        let watermark = state
            .outstanding
            .keys()
            .next()
            .copied()
            .unwrap_or(state.high);
        if state.committed.is_some_and(|committed| watermark <= committed) {
            return AckOutcome::Pending;
        }
        state.committed = Some(watermark);
        AckOutcome::Commit(watermark)
    }

    pub(crate) fn nack(&mut self, topic: &str, partition: i32, offset: i64, generation: u64) -> NackOutcome {
        let Some(state) = self.partitions.get_mut(&(topic.to_string(), partition)) else {
            return NackOutcome::Stale;
        };
        if !state.is_current(offset, generation) {
            return NackOutcome::Stale;
        }

        state.invalidate_from(offset);
        state.high = offset;
        state.rewind = Some(state.rewind.map_or(offset, |target| target.min(offset)));
        state.redeliveries = state.redeliveries.saturating_add(1);
        NackOutcome::Rewind {
            attempt: state.redeliveries,
        }
    }
}

/// Delay before the `attempt`-th consecutive redelivery of a partition.
///
/// Doubles from `base` and saturates at `max`.
pub(crate) fn redelivery_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1 << exponent).min(max)
}
