//! Batch records and their lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

/// Sequence value of a record that has no slot range assigned.
pub const UNFULFILLED: u64 = u64::MAX;

/// Lifecycle of a batch record.
///
/// ```text
/// AVAILABLE --claim--> WRITING --publish--> PUBLISHED --release--> AVAILABLE
///                         \
///                          --cancel--> CANCELED --release--> AVAILABLE
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    /// Free for the next claim
    Available = 1,
    /// Claimed; the producer is filling the slots
    Writing = 2,
    /// Withdrawn by the producer, still awaiting release
    Canceled = 3,
    /// Readable by every consumer group
    Published = 4,
}

impl BatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BatchState::Available,
            2 => BatchState::Writing,
            3 => BatchState::Canceled,
            4 => BatchState::Published,
            other => panic!("corrupt batch state {other}"),
        }
    }

    /// Writing is over; the batch waits for release.
    pub fn is_settled(self) -> bool {
        matches!(self, BatchState::Published | BatchState::Canceled)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Available => "AVAILABLE",
            BatchState::Writing => "WRITING",
            BatchState::Canceled => "CANCELED",
            BatchState::Published => "PUBLISHED",
        };
        f.write_str(name)
    }
}

const STATE_BITS: u32 = 3;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

/// Batch number of a record that was never claimed.
const NO_BATCH: u64 = u64::MAX >> STATE_BITS;

#[inline]
fn pack(batch_num: u64, state: BatchState) -> u64 {
    (batch_num << STATE_BITS) | state as u64
}

#[inline]
fn unpack(tag: u64) -> (u64, BatchState) {
    (tag >> STATE_BITS, BatchState::from_u8((tag & STATE_MASK) as u8))
}

/// Metadata for one in-flight batch.
///
/// Batch number and state share one word, so every transition is a CAS
/// against a specific batch and a stale handle can never move a reused
/// record.
#[derive(Debug)]
pub(crate) struct BatchRecord {
    tag: AtomicU64,
    pub(crate) seq_num: AtomicU64,
    pub(crate) size: AtomicU32,
    /// Groups that still have to release this batch
    pub(crate) group_flags: AtomicU16,
    /// Groups that were handed this batch by a poll
    pub(crate) reader_flags: AtomicU16,
}

impl BatchRecord {
    fn new() -> Self {
        Self {
            tag: AtomicU64::new(pack(NO_BATCH, BatchState::Available)),
            seq_num: AtomicU64::new(UNFULFILLED),
            size: AtomicU32::new(0),
            group_flags: AtomicU16::new(0),
            reader_flags: AtomicU16::new(0),
        }
    }

    /// Current `(batch_num, state)`.
    pub(crate) fn load(&self, order: Ordering) -> (u64, BatchState) {
        unpack(self.tag.load(order))
    }

    /// State as seen by the holder of `batch_num`; a record that moved on to
    /// another batch reads as AVAILABLE.
    pub(crate) fn state_of(&self, batch_num: u64) -> BatchState {
        match self.load(Ordering::Acquire) {
            (num, state) if num == batch_num => state,
            _ => BatchState::Available,
        }
    }

    /// CAS `from -> to` for `batch_num`, returning the state that batch is
    /// actually in on failure.
    pub(crate) fn transition(
        &self,
        batch_num: u64,
        from: BatchState,
        to: BatchState,
    ) -> Result<(), BatchState> {
        self.tag
            .compare_exchange(
                pack(batch_num, from),
                pack(batch_num, to),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| self.state_of(batch_num))
    }

    fn reset(&self, batch_num: u64) {
        self.seq_num.store(UNFULFILLED, Ordering::Release);
        self.reader_flags.store(0, Ordering::Release);
        self.tag
            .store(pack(batch_num, BatchState::Available), Ordering::Release);
    }
}

/// Fixed table of batch records indexed by `batch_num & mask`.
///
/// Records are leased before a claim reserves sequences and handed back by
/// the final release, so a lease holder's record is AVAILABLE, or about to
/// be, once every earlier batch has taken its number.
pub(crate) struct BatchRegistry {
    records: Box<[CachePadded<BatchRecord>]>,
    mask: u64,
    leased: CachePadded<AtomicU64>,
    next_batch: CachePadded<AtomicU64>,
}

impl BatchRegistry {
    pub(crate) fn new(batch_capacity: usize) -> Self {
        assert!(batch_capacity.is_power_of_two());
        Self {
            records: (0..batch_capacity)
                .map(|_| CachePadded::new(BatchRecord::new()))
                .collect(),
            mask: batch_capacity as u64 - 1,
            leased: CachePadded::new(AtomicU64::new(0)),
            next_batch: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn mask(&self) -> u64 {
        self.mask
    }

    #[inline]
    pub(crate) fn record(&self, batch_num: u64) -> &BatchRecord {
        &self.records[(batch_num & self.mask) as usize]
    }

    /// Batch number the next claim will receive
    pub(crate) fn next_batch(&self) -> u64 {
        self.next_batch.load(Ordering::Acquire)
    }

    pub(crate) fn leased(&self) -> u64 {
        self.leased.load(Ordering::Acquire)
    }

    pub(crate) fn try_lease(&self) -> bool {
        let limit = self.records.len() as u64;
        let mut current = self.leased.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return false;
            }
            match self.leased.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn return_lease(&self) {
        let previous = self.leased.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "batch record lease returned twice");
    }

    /// Bind the next batch number to `[seq_num, seq_num + size)`.
    ///
    /// Callers serialize through the claim handoff, so `next_batch` has a
    /// single writer at a time.
    pub(crate) fn assign(&self, seq_num: u64, size: u16, group_mask: u16) -> u64 {
        let batch_num = self.next_batch.load(Ordering::Relaxed);
        let record = self.record(batch_num);
        // A lease guarantees every group moved its barrier past the record's
        // previous batch; only the final `free` may still be in progress.
        let backoff = Backoff::new();
        let tag = loop {
            let tag = record.tag.load(Ordering::Acquire);
            if unpack(tag).1 == BatchState::Available {
                break tag;
            }
            backoff.snooze();
        };

        record.seq_num.store(seq_num, Ordering::Release);
        record.size.store(size as u32, Ordering::Release);
        record.group_flags.store(group_mask, Ordering::Release);
        record.reader_flags.store(0, Ordering::Release);
        if record
            .tag
            .compare_exchange(
                tag,
                pack(batch_num, BatchState::Writing),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            panic!("batch record {} changed while being claimed", batch_num & self.mask);
        }

        self.next_batch.store(batch_num + 1, Ordering::Release);
        batch_num
    }

    /// Drop `group` from the record's pending releases.
    ///
    /// Returns `None` when the group had already released it, otherwise
    /// whether this was the last group.
    pub(crate) fn clear_group(&self, record: &BatchRecord, group: usize) -> Option<bool> {
        let bit = 1u16 << group;
        let previous = record.group_flags.fetch_and(!bit, Ordering::AcqRel);
        if previous & bit == 0 {
            return None;
        }
        Some(previous == bit)
    }

    /// Return a fully released record to the pool.
    pub(crate) fn free(&self, record: &BatchRecord, batch_num: u64) {
        record.reset(batch_num);
        self.return_lease();
    }
}
