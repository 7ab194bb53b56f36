//! Producer sequence, per-group barriers and sequence-to-slot arithmetic.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Release progress of one consumer group.
#[derive(Debug, Default)]
pub(crate) struct GroupCursor {
    /// First sequence not yet released by this group
    pub(crate) barrier_seq: AtomicU64,
    /// Number of batches released by this group
    pub(crate) barrier_batch: AtomicU64,
    /// Next batch this group's pollers will be handed
    pub(crate) read_batch: AtomicU64,
}

pub(crate) struct SequenceSpace {
    capacity: u64,
    mask: u64,
    write_seq: CachePadded<AtomicU64>,
    groups: Box<[CachePadded<GroupCursor>]>,
}

impl SequenceSpace {
    pub(crate) fn new(capacity: usize, groups: usize) -> Self {
        assert!(capacity.is_power_of_two(), "capacity must be a power of two");
        Self {
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            write_seq: CachePadded::new(AtomicU64::new(0)),
            groups: (0..groups).map(|_| CachePadded::default()).collect(),
        }
    }

    #[inline(always)]
    pub(crate) fn index(&self, seq: u64) -> usize {
        (seq & self.mask) as usize
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) fn mask(&self) -> u64 {
        self.mask
    }

    pub(crate) fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn group(&self, group: usize) -> &GroupCursor {
        &self.groups[group]
    }

    pub(crate) fn groups(&self) -> impl Iterator<Item = &GroupCursor> {
        self.groups.iter().map(|g| &**g)
    }

    pub(crate) fn write_seq(&self) -> u64 {
        self.write_seq.load(Ordering::Acquire)
    }

    /// Barrier of the slowest group; gates admission.
    pub(crate) fn min_barrier(&self) -> u64 {
        self.groups
            .iter()
            .map(|g| g.barrier_seq.load(Ordering::Acquire))
            .min()
            .unwrap_or(0)
    }

    /// Slots that can be claimed right now.
    pub(crate) fn free_slots(&self) -> u64 {
        // Barrier first: a stale barrier only under-reports free space.
        let barrier = self.min_barrier();
        let write = self.write_seq();
        self.capacity.saturating_sub(Self::in_flight(write, barrier))
    }

    /// Reserve `count` sequences if the slowest group leaves room for them.
    ///
    /// Returns the first reserved sequence.
    pub(crate) fn try_reserve(&self, count: u64) -> Option<u64> {
        loop {
            // Barrier before write, so barrier <= write always holds.
            let barrier = self.min_barrier();
            let write = self.write_seq.load(Ordering::Acquire);
            if Self::in_flight(write, barrier).saturating_add(count) > self.capacity {
                return None;
            }
            if self
                .write_seq
                .compare_exchange_weak(write, write + count, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(write);
            }
        }
    }

    /// Sequences handed out but not yet released by the slowest group.
    ///
    /// A barrier snapshot older than `write` can report more than `capacity`.
    fn in_flight(write: u64, barrier: u64) -> u64 {
        assert!(
            barrier <= write,
            "barrier sequence {barrier} overtook write sequence {write}"
        );
        write - barrier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_masks_sequence() {
        let space = SequenceSpace::new(64, 1);
        assert_eq!(space.index(0), 0);
        assert_eq!(space.index(63), 63);
        assert_eq!(space.index(64), 0);
        assert_eq!(space.index(130), 2);
        assert_eq!(space.mask(), 63);
    }

    #[test]
    fn test_reserve_until_full() {
        let space = SequenceSpace::new(8, 1);
        assert_eq!(space.try_reserve(3), Some(0));
        assert_eq!(space.try_reserve(5), Some(3));
        assert_eq!(space.try_reserve(1), None);
        assert_eq!(space.free_slots(), 0);

        space.group(0).barrier_seq.store(2, Ordering::Release);
        assert_eq!(space.free_slots(), 2);
        assert_eq!(space.try_reserve(3), None);
        assert_eq!(space.try_reserve(2), Some(8));
        assert_eq!(space.write_seq(), 10);
    }

    #[test]
    fn test_slowest_group_gates_admission() {
        let space = SequenceSpace::new(4, 3);
        assert_eq!(space.try_reserve(4), Some(0));

        space.group(0).barrier_seq.store(4, Ordering::Release);
        space.group(2).barrier_seq.store(3, Ordering::Release);
        assert_eq!(space.min_barrier(), 0);
        assert_eq!(space.try_reserve(1), None);

        space.group(1).barrier_seq.store(2, Ordering::Release);
        assert_eq!(space.min_barrier(), 2);
        assert_eq!(space.free_slots(), 2);
    }

    #[test]
    #[should_panic(expected = "overtook")]
    fn test_barrier_past_write_is_fatal() {
        let space = SequenceSpace::new(4, 1);
        space.group(0).barrier_seq.store(1, Ordering::Release);
        space.free_slots();
    }
}
