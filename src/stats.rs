//! Read-only snapshots of ring geometry and progress.

use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::config::{BatchingMode, CapacityTier};

/// Fixed geometry of a ring, as returned by [`RingBuffer::info`](crate::RingBuffer::info).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Info {
    /// Capacity tier
    pub tier: CapacityTier,
    /// Slot count
    pub capacity: usize,
    /// `capacity - 1`
    pub slot_mask: u64,
    /// Batch records in the registry
    pub batch_capacity: usize,
    /// `batch_capacity - 1`
    pub batch_mask: u64,
    /// Usable bytes per slot
    pub payload_size: usize,
    /// In-band header bytes per slot
    pub header_size: usize,
    /// Header plus payload
    pub slot_size: usize,
    /// Bytes across all slots
    pub total_size: usize,
    /// Consumer groups
    pub groups: usize,
    /// Batching mode
    pub batching: BatchingMode,
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}slots_{}] {} entry={}+{} batches={} groups={}",
            self.capacity,
            self.total_size,
            self.tier,
            self.header_size,
            self.payload_size,
            self.batch_capacity,
            self.groups
        )
    }
}

/// Progress of one consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GroupStats {
    /// First sequence not yet released
    pub barrier_seq: u64,
    /// Batches released
    pub barrier_batch: u64,
    /// Next batch a poll will hand out
    pub read_batch: u64,
}

/// Point-in-time counters, as returned by [`RingBuffer::stats`](crate::RingBuffer::stats).
///
/// Fields are loaded one by one, so under concurrent use they may come from
/// slightly different instants. Barriers are always loaded before
/// `write_seq`, so `barrier_seq <= write_seq` holds for every group.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Stats {
    /// Slot count
    pub capacity: u64,
    /// Next sequence a claim will receive
    pub write_seq: u64,
    /// Sequences below this belong to published or canceled batches
    pub visible_seq: u64,
    /// Next batch number a claim will receive
    pub batch_num: u64,
    /// Batches below this are published or canceled
    pub visible_batch: u64,
    /// Batch records held by claims that are not fully released
    pub leased_batches: u64,
    /// One entry per consumer group
    pub groups: Vec<GroupStats>,
}

impl Stats {
    /// Barrier of the slowest group
    pub fn min_barrier(&self) -> u64 {
        self.groups
            .iter()
            .map(|g| g.barrier_seq)
            .min()
            .unwrap_or(0)
    }

    /// Barrier of `group`, if it exists
    pub fn barrier_seq(&self, group: usize) -> Option<u64> {
        self.groups.get(group).map(|g| g.barrier_seq)
    }

    /// `capacity - (write_seq - min_barrier)`
    pub fn free_slots(&self) -> u64 {
        self.capacity
            .saturating_sub(self.write_seq.saturating_sub(self.min_barrier()))
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "W[{} | {}] V[{} | {}] {{ {} }}",
            self.write_seq, self.batch_num, self.visible_seq, self.visible_batch, self.leased_batches
        )?;
        for (group, stats) in self.groups.iter().enumerate() {
            write!(
                f,
                " R{}[{} | {} | {}]",
                group, stats.barrier_seq, stats.barrier_batch, stats.read_batch
            )?;
        }
        Ok(())
    }
}
