use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::{Backoff, CachePadded};
use tracing::{debug, trace};

use crate::config::{BatchingMode, CapacityTier, RingBufferConfig};
use crate::error::{Error, Result};
use crate::registry::{BatchRegistry, BatchState};
use crate::sequence::SequenceSpace;
use crate::stats::{GroupStats, Info, Stats};
use crate::store::{HeapSlots, SlotHeader, SlotStore};
use crate::wait::{Deadline, PendingClaim, WaitChannel};

/// Producer handle for a claimed run of contiguous slots.
///
/// The handle is the only way to write the slots. [`publish`](Self::publish)
/// and [`cancel`](Self::cancel) consume it, so no write view outlives the
/// WRITING state:
///
/// ```compile_fail
/// # use std::time::Duration;
/// # use batchring::{CapacityTier, RingBuffer};
/// let rb = RingBuffer::open(CapacityTier::L0, 0, 6).unwrap();
/// let mut batch = rb.claim(1, Duration::ZERO).unwrap();
/// batch.publish().unwrap();
/// batch.entry_at(0).unwrap()[0] = 1;
/// ```
pub struct Batch<'a, S: SlotStore = HeapSlots> {
    ring: &'a RingBuffer<S>,
    batch_num: u64,
    seq_num: u64,
    size: u16,
}

impl<'a, S: SlotStore> Batch<'a, S> {
    /// Claim-order number, independent of slot count
    pub fn batch_num(&self) -> u64 {
        self.batch_num
    }

    /// First sequence of the batch
    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    /// Number of slots
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Physical slot holding entry `index`.
    pub fn slot_index(&self, index: u16) -> Option<usize> {
        (index < self.size).then(|| self.ring.sequence.index(self.seq_num + index as u64))
    }

    /// Writable payload of entry `index`.
    pub fn entry_at(&mut self, index: u16) -> Result<&mut [u8]> {
        check_index(index, self.size)?;
        let header = self.ring.header_size();
        // SAFETY: a WRITING batch owns its slots exclusively and `&mut self`
        // keeps this the only view through the handle.
        let slot = unsafe { self.ring.slot_mut(self.seq_num + index as u64) };
        Ok(&mut slot[header..])
    }

    /// Copy `data` to the start of entry `index`.
    ///
    /// # Arguments
    /// * `index` - Entry within the batch
    /// * `data` - Bytes to copy; at most `payload_size` long
    pub fn copy_to(&mut self, index: u16, data: &[u8]) -> Result<()> {
        if data.len() > self.ring.payload_size() {
            return Err(Error::InvalidArgument("data is larger than the entry payload"));
        }
        self.entry_at(index)?[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// In-band header of entry `index`; `None` in single-entry mode.
    pub fn header(&self, index: u16) -> Result<Option<SlotHeader>> {
        check_index(index, self.size)?;
        Ok(self.ring.header_at(self.seq_num + index as u64))
    }

    /// Make the entries visible to every consumer group.
    pub fn publish(self) -> Result<()> {
        self.ring.settle(&self, BatchState::Published, "publish")
    }

    /// Withdraw the entries. Consumers still receive the batch and must
    /// release it, but cannot read it.
    pub fn cancel(self) -> Result<()> {
        self.ring.settle(&self, BatchState::Canceled, "cancel")
    }
}

impl<S: SlotStore> fmt::Debug for Batch<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("batch_num", &self.batch_num)
            .field("seq_num", &self.seq_num)
            .field("size", &self.size)
            .finish()
    }
}

impl<S: SlotStore> fmt::Display for Batch<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Batch# {} - Seq# [{} + {}] - {}",
            self.batch_num,
            self.seq_num,
            self.size,
            BatchState::Writing
        )
    }
}

/// Consumer handle for a published or canceled batch, handed to one group.
///
/// Each group receives at most one handle per batch. Releasing consumes it,
/// so no read view outlives the release:
///
/// ```compile_fail
/// # use std::time::Duration;
/// # use batchring::{CapacityTier, RingBuffer};
/// let rb = RingBuffer::open(CapacityTier::L0, 0, 6).unwrap();
/// rb.claim(1, Duration::ZERO).unwrap().publish().unwrap();
/// let read = rb.next_published(0).unwrap().unwrap();
/// let entry = read.entry(0).unwrap();
/// read.release().unwrap();
/// assert_eq!(entry[0], 0);
/// ```
pub struct ReadBatch<'a, S: SlotStore = HeapSlots> {
    ring: &'a RingBuffer<S>,
    group: usize,
    batch_num: u64,
    seq_num: u64,
    size: u16,
    state: BatchState,
}

impl<'a, S: SlotStore> ReadBatch<'a, S> {
    /// Claim-order number, independent of slot count
    pub fn batch_num(&self) -> u64 {
        self.batch_num
    }

    /// First sequence of the batch
    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    /// Number of slots
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Consumer group this handle was handed to
    pub fn group(&self) -> usize {
        self.group
    }

    /// PUBLISHED or CANCELED; fixed until the batch is released.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Physical slot holding entry `index`.
    pub fn slot_index(&self, index: u16) -> Option<usize> {
        (index < self.size).then(|| self.ring.sequence.index(self.seq_num + index as u64))
    }

    /// Payload of entry `index`; canceled batches have none.
    pub fn entry(&self, index: u16) -> Result<&[u8]> {
        check_index(index, self.size)?;
        if self.state != BatchState::Published {
            return Err(Error::InvalidState {
                operation: "read",
                batch_num: self.batch_num,
                state: self.state,
            });
        }
        let header = self.ring.header_size();
        // SAFETY: published slots are read-only while any group still holds
        // an unreleased handle, and the view borrows this handle.
        let slot = unsafe { self.ring.slot(self.seq_num + index as u64) };
        Ok(&slot[header..])
    }

    /// In-band header of entry `index`; `None` in single-entry mode.
    pub fn header(&self, index: u16) -> Result<Option<SlotHeader>> {
        check_index(index, self.size)?;
        Ok(self.ring.header_at(self.seq_num + index as u64))
    }

    /// Release the batch for this handle's group.
    pub fn release(self) -> Result<(), ReleaseError<'a, S>> {
        let ring = self.ring;
        ring.release_for(self.group, self)
    }
}

impl<S: SlotStore> fmt::Debug for ReadBatch<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBatch")
            .field("group", &self.group)
            .field("batch_num", &self.batch_num)
            .field("seq_num", &self.seq_num)
            .field("size", &self.size)
            .field("state", &self.state)
            .finish()
    }
}

impl<S: SlotStore> fmt::Display for ReadBatch<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Batch# {} - Seq# [{} + {}] - {}",
            self.batch_num, self.seq_num, self.size, self.state
        )
    }
}

/// A rejected release. Carries the handle back so the release can be retried.
#[derive(thiserror::Error)]
#[error("{error}")]
pub struct ReleaseError<'a, S: SlotStore = HeapSlots> {
    error: Error,
    batch: ReadBatch<'a, S>,
}

impl<'a, S: SlotStore> ReleaseError<'a, S> {
    /// Why the release was rejected
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Take the handle back.
    pub fn into_batch(self) -> ReadBatch<'a, S> {
        self.batch
    }
}

impl<S: SlotStore> fmt::Debug for ReleaseError<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseError")
            .field("error", &self.error)
            .field("batch", &self.batch)
            .finish()
    }
}

impl<S: SlotStore> From<ReleaseError<'_, S>> for Error {
    fn from(err: ReleaseError<'_, S>) -> Self {
        err.error
    }
}

fn rejected<'a, S: SlotStore>(
    error: Error,
    batch: ReadBatch<'a, S>,
) -> Result<(), ReleaseError<'a, S>> {
    Err(ReleaseError { error, batch })
}

fn check_index(index: u16, size: u16) -> Result<()> {
    if index >= size {
        return Err(Error::InvalidArgument("entry index is outside the batch"));
    }
    Ok(())
}

/// Fixed-capacity ring of equally sized slots, shared by any number of
/// producers and up to 16 consumer groups.
///
/// - Producers: `claim` → write entries → `publish` or `cancel`
/// - Consumers: `next_published` → read entries → `release`, in order
/// - A slot is reused only after every group released the batch holding it
pub struct RingBuffer<S: SlotStore = HeapSlots> {
    store: S,
    sequence: SequenceSpace,
    registry: BatchRegistry,
    /// Sequences below this have a batch number bound to them
    assigned_seq: CachePadded<AtomicU64>,
    /// Batches below this are published or canceled
    visible_batch: CachePadded<AtomicU64>,
    visible_seq: CachePadded<AtomicU64>,
    wait: Arc<WaitChannel>,
    closed: AtomicBool,
    tier: CapacityTier,
    batching: BatchingMode,
    payload_size: usize,
    slot_size: usize,
    group_mask: u16,
}

impl RingBuffer<HeapSlots> {
    /// Open a heap-backed ring with one consumer group
    ///
    /// # Arguments
    /// * `tier` - Slot count
    /// * `batch_capacity` - Size of the batch table; 0 means one record per slot
    /// * `payload_size` - Usable bytes per slot
    ///
    /// # Returns
    /// * `Ok(RingBuffer)` on success
    /// * `Err(Error::InvalidArgument)` if the geometry is invalid
    pub fn open(tier: CapacityTier, batch_capacity: usize, payload_size: usize) -> Result<Self> {
        Self::with_config(RingBufferConfig::new(tier, payload_size).batch_capacity(batch_capacity))
    }

    /// Open a heap-backed ring from a full configuration
    ///
    /// # Arguments
    /// * `config` - Geometry, consumer groups and batching mode
    ///
    /// # Returns
    /// * `Ok(RingBuffer)` on success
    /// * `Err(Error::InvalidArgument)` if `config` fails validation
    pub fn with_config(config: RingBufferConfig) -> Result<Self> {
        config.validate()?;
        let store = HeapSlots::new(config.tier.slots(), config.slot_size())?;
        Self::with_store(config, store)
    }
}

impl<S: SlotStore> RingBuffer<S> {
    /// Build a ring over caller-provided storage
    ///
    /// # Arguments
    /// * `config` - Geometry, consumer groups and batching mode
    /// * `store` - Exactly `tier.slots()` slots of at least `config.slot_size()` bytes
    ///
    /// # Returns
    /// * `Ok(RingBuffer)` on success
    /// * `Err(Error::InvalidArgument)` if `config` is invalid or `store` does not fit it
    pub fn with_store(config: RingBufferConfig, store: S) -> Result<Self> {
        config.validate()?;
        if store.capacity() != config.tier.slots() {
            return Err(Error::InvalidArgument(
                "slot store capacity does not match the capacity tier",
            ));
        }
        if store.slot_size() < config.slot_size() {
            return Err(Error::InvalidArgument(
                "slot store slots are smaller than header plus payload",
            ));
        }

        let capacity = config.tier.slots();
        let batch_capacity = config.effective_batch_capacity();
        let ring = Self {
            store,
            sequence: SequenceSpace::new(capacity, config.groups),
            registry: BatchRegistry::new(batch_capacity),
            assigned_seq: CachePadded::new(AtomicU64::new(0)),
            visible_batch: CachePadded::new(AtomicU64::new(0)),
            visible_seq: CachePadded::new(AtomicU64::new(0)),
            wait: Arc::new(WaitChannel::default()),
            closed: AtomicBool::new(false),
            tier: config.tier,
            batching: config.batching,
            payload_size: config.payload_size,
            slot_size: config.slot_size(),
            group_mask: ((1u32 << config.groups) - 1) as u16,
        };

        debug!(
            tier = %config.tier,
            capacity,
            batch_capacity,
            slot_size = ring.slot_size,
            groups = config.groups,
            batching = ?config.batching,
            "opened ring buffer"
        );
        Ok(ring)
    }

    /// Stop admitting claims and wake every parked claimant with
    /// [`Error::Closed`]. Publish, cancel and release keep working so
    /// in-flight batches can drain. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(
            write_seq = self.sequence.write_seq(),
            waiters = self.wait.waiters(),
            "closed ring buffer"
        );
        self.wait.notify();
        Ok(())
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Claim `count` contiguous slots, waiting for room
    ///
    /// # Arguments
    /// * `count` - Number of slots, `1..=capacity`
    /// * `timeout` - How long to wait for room; zero waits indefinitely
    ///
    /// # Returns
    /// * `Ok(Batch)` in the WRITING state
    /// * `Err(Error::Timeout)` if no room appeared in time; nothing was consumed
    /// * `Err(Error::InvalidArgument | Error::CapacityExceeded | Error::Closed)`
    pub fn claim(&self, count: u16, timeout: Duration) -> Result<Batch<'_, S>> {
        self.validate_claim(count)?;
        self.claim_until(count, &Deadline::after(timeout), None)
    }

    /// Claim without waiting; fails with [`Error::Full`] when there is no room.
    pub fn try_claim(&self, count: u16) -> Result<Batch<'_, S>> {
        self.validate_claim(count)?;
        let full = || Error::Full {
            requested: count as usize,
            available: self.sequence.free_slots() as usize,
        };
        if !self.registry.try_lease() {
            return Err(full());
        }
        match self.sequence.try_reserve(count as u64) {
            Some(seq) => Ok(self.bind(seq, count)),
            None => {
                self.registry.return_lease();
                self.wait.notify();
                Err(full())
            }
        }
    }

    /// Validate a claim now and admit it later through the returned handle.
    pub fn claim_pending(&self, count: u16) -> Result<PendingClaim<'_, S>> {
        self.validate_claim(count)?;
        Ok(PendingClaim::new(self, count))
    }

    fn validate_claim(&self, count: u16) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidArgument("claim count must be non-zero"));
        }
        if count as u64 > self.sequence.capacity() {
            return Err(Error::CapacityExceeded {
                requested: count as usize,
                capacity: self.capacity(),
            });
        }
        if count > 1 && self.batching == BatchingMode::Single {
            return Err(Error::InvalidArgument(
                "single-entry batching claims one slot at a time",
            ));
        }
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    pub(crate) fn claim_until(
        &self,
        count: u16,
        deadline: &Deadline,
        canceled: Option<&AtomicBool>,
    ) -> Result<Batch<'_, S>> {
        let interrupted = || {
            if self.is_closed() {
                Some(Error::Closed)
            } else if canceled.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                Some(Error::Canceled)
            } else {
                None
            }
        };

        // A record lease first, so an abandoned claim never holds sequences.
        let reserved = self
            .wait
            .wait_for(deadline, &interrupted, || self.registry.try_lease().then_some(()))
            .and_then(|()| {
                self.wait
                    .wait_for(deadline, &interrupted, || {
                        self.sequence.try_reserve(count as u64)
                    })
                    .inspect_err(|_| {
                        self.registry.return_lease();
                        self.wait.notify();
                    })
            });

        match reserved {
            Ok(seq) => Ok(self.bind(seq, count)),
            Err(err) => {
                debug!(count, error = %err, "claim abandoned");
                Err(err)
            }
        }
    }

    /// Give the reserved range its batch number.
    ///
    /// Numbers are handed out in sequence order: each claimant waits for the
    /// claimant of the preceding range, which is already past admission and
    /// only has a few stores left to do.
    fn bind(&self, seq_num: u64, size: u16) -> Batch<'_, S> {
        let backoff = Backoff::new();
        while self.assigned_seq.load(Ordering::Acquire) != seq_num {
            backoff.snooze();
        }
        let batch_num = self.registry.assign(seq_num, size, self.group_mask);
        self.assigned_seq
            .store(seq_num + size as u64, Ordering::Release);

        if self.batching == BatchingMode::Multi {
            for index in 0..size {
                // SAFETY: the range was just reserved and is not visible yet.
                let slot = unsafe { self.slot_mut(seq_num + index as u64) };
                SlotHeader::new(batch_num, index).encode(slot);
            }
        }

        trace!(batch_num, seq_num, size, "claimed");
        Batch {
            ring: self,
            batch_num,
            seq_num,
            size,
        }
    }

    fn settle(&self, batch: &Batch<'_, S>, to: BatchState, operation: &'static str) -> Result<()> {
        self.registry
            .record(batch.batch_num)
            .transition(batch.batch_num, BatchState::Writing, to)
            .map_err(|state| Error::InvalidState {
                operation,
                batch_num: batch.batch_num,
                state,
            })?;
        trace!(batch_num = batch.batch_num, state = %to, "settled");
        self.advance_visible();
        Ok(())
    }

    /// Move the visible point over every settled batch directly after it.
    ///
    /// Settling CASes the record state and then runs this; both sides use
    /// SeqCst, so of two racing settlers at least one sees the other's batch.
    fn advance_visible(&self) {
        loop {
            let next = self.visible_batch.load(Ordering::SeqCst);
            let record = self.registry.record(next);
            match record.load(Ordering::SeqCst) {
                (batch_num, state) if batch_num == next && state.is_settled() => {
                    let size = record.size.load(Ordering::Acquire) as u64;
                    if self
                        .visible_batch
                        .compare_exchange(next, next + 1, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        self.visible_seq.fetch_add(size, Ordering::AcqRel);
                    }
                }
                _ => return,
            }
        }
    }

    /// Release `batch` for the group it was handed to.
    pub fn release<'a>(&'a self, batch: ReadBatch<'a, S>) -> Result<(), ReleaseError<'a, S>> {
        self.release_for(batch.group, batch)
    }

    /// Release `batch` for `group`
    ///
    /// Each group releases batches in claim order. The group's barrier moves
    /// past the batch, and the last group to release returns the record.
    ///
    /// # Arguments
    /// * `group` - Consumer group; must be the group the handle was handed to
    /// * `batch` - Handle from [`next_published`](Self::next_published)
    ///
    /// # Returns
    /// * `Ok(())` once the group's barrier moved past the batch
    /// * `Err(ReleaseError)` with the handle if an earlier batch is still
    ///   unreleased (`OutOfOrder`) or the handle belongs elsewhere
    ///   (`InvalidArgument`)
    pub fn release_for<'a>(
        &'a self,
        group: usize,
        batch: ReadBatch<'a, S>,
    ) -> Result<(), ReleaseError<'a, S>> {
        if !std::ptr::eq(batch.ring, self) {
            return rejected(
                Error::InvalidArgument("batch belongs to another ring buffer"),
                batch,
            );
        }
        if group != batch.group {
            return rejected(
                Error::InvalidArgument("batch was handed to another consumer group"),
                batch,
            );
        }

        let batch_num = batch.batch_num;
        let cursor = self.sequence.group(group);
        let barrier = cursor.barrier_seq.load(Ordering::Acquire);
        if batch.seq_num > barrier {
            let seq_num = batch.seq_num;
            return rejected(
                Error::OutOfOrder {
                    batch_num,
                    group,
                    barrier,
                    seq_num,
                },
                batch,
            );
        }

        // Only the handle of the batch at the barrier can move it.
        let end = batch.seq_num + batch.size as u64;
        if batch.seq_num < barrier
            || cursor
                .barrier_seq
                .compare_exchange(barrier, end, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return rejected(Error::AlreadyReleased { batch_num, group }, batch);
        }
        cursor.barrier_batch.fetch_add(1, Ordering::AcqRel);

        let record = self.registry.record(batch_num);
        match self.registry.clear_group(record, group) {
            Some(true) => self.registry.free(record, batch_num),
            Some(false) => {}
            None => panic!("group {group} released batch {batch_num} without holding it"),
        }

        trace!(batch_num, group, barrier = end, "released");
        self.wait.notify();
        Ok(())
    }

    /// Hand `group` the next visible batch it has not been given yet
    ///
    /// Canceled batches are handed out too; they must be released like any
    /// other, but their entries cannot be read.
    ///
    /// # Returns
    /// * `Ok(Some(ReadBatch))` with the group's next batch in claim order
    /// * `Ok(None)` if the next batch is not published or canceled yet
    /// * `Err(Error::InvalidArgument)` if `group` is out of range
    pub fn next_published(&self, group: usize) -> Result<Option<ReadBatch<'_, S>>> {
        if group >= self.sequence.group_count() {
            return Err(Error::InvalidArgument("consumer group out of range"));
        }
        let cursor = self.sequence.group(group);
        let mut next = cursor.read_batch.load(Ordering::Acquire);
        loop {
            if next >= self.visible_batch.load(Ordering::Acquire) {
                return Ok(None);
            }
            match cursor.read_batch.compare_exchange_weak(
                next,
                next + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => next = actual,
            }
        }

        // Visible and not yet released by this group, so the record still
        // holds `next` and cannot be reused under this handle.
        let record = self.registry.record(next);
        let (batch_num, state) = record.load(Ordering::Acquire);
        assert_eq!(batch_num, next, "visible batch record was reused");
        record
            .reader_flags
            .fetch_or(1 << group, Ordering::AcqRel);

        Ok(Some(ReadBatch {
            ring: self,
            group,
            batch_num: next,
            seq_num: record.seq_num.load(Ordering::Acquire),
            size: record.size.load(Ordering::Acquire) as u16,
            state,
        }))
    }

    /// Snapshot of the ring geometry
    pub fn info(&self) -> Info {
        let capacity = self.capacity();
        Info {
            tier: self.tier,
            capacity,
            slot_mask: self.sequence.mask(),
            batch_capacity: self.registry.capacity(),
            batch_mask: self.registry.mask(),
            payload_size: self.payload_size,
            header_size: self.header_size(),
            slot_size: self.slot_size,
            total_size: capacity * self.slot_size,
            groups: self.sequence.group_count(),
            batching: self.batching,
        }
    }

    /// Snapshot of the sequence counters
    ///
    /// # Panics
    /// Panics if a group barrier overtook the write sequence
    pub fn stats(&self) -> Stats {
        // Barriers before write_seq keep the snapshot ordered.
        let groups: Vec<GroupStats> = self
            .sequence
            .groups()
            .map(|cursor| GroupStats {
                barrier_seq: cursor.barrier_seq.load(Ordering::Acquire),
                barrier_batch: cursor.barrier_batch.load(Ordering::Acquire),
                read_batch: cursor.read_batch.load(Ordering::Acquire),
            })
            .collect();
        let visible_seq = self.visible_seq.load(Ordering::Acquire);
        let visible_batch = self.visible_batch.load(Ordering::Acquire);
        let stats = Stats {
            capacity: self.sequence.capacity(),
            write_seq: self.sequence.write_seq(),
            visible_seq,
            batch_num: self.registry.next_batch(),
            visible_batch,
            leased_batches: self.registry.leased(),
            groups,
        };
        for group in &stats.groups {
            assert!(
                group.barrier_seq <= stats.write_seq,
                "barrier sequence {} overtook write sequence {}",
                group.barrier_seq,
                stats.write_seq
            );
        }
        stats
    }

    /// Get the capacity in slots
    pub fn capacity(&self) -> usize {
        self.sequence.capacity() as usize
    }

    /// Get the usable bytes per slot
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Get the bytes per slot, header included
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Slots a claim could take right now.
    pub fn free_slots(&self) -> usize {
        self.sequence.free_slots() as usize
    }

    pub(crate) fn wait_channel(&self) -> Arc<WaitChannel> {
        Arc::clone(&self.wait)
    }

    fn header_size(&self) -> usize {
        self.batching.header_size()
    }

    fn header_at(&self, seq: u64) -> Option<SlotHeader> {
        if self.batching == BatchingMode::Single {
            return None;
        }
        // SAFETY: callers hold a live handle for `seq`. Headers are written
        // once while binding, and entry views never cover them.
        let slot = unsafe { self.slot(seq) };
        SlotHeader::decode(slot)
    }

    /// # Safety
    ///
    /// The caller must own the slot of `seq` for the lifetime of the borrow.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, seq: u64) -> &mut [u8] {
        let ptr = self.store.slot_ptr(self.sequence.index(seq));
        // SAFETY: the store guarantees `slot_size` valid bytes per slot and
        // `self.slot_size` never exceeds it.
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.slot_size) }
    }

    /// # Safety
    ///
    /// No writer may hold the slot of `seq` for the lifetime of the borrow.
    unsafe fn slot(&self, seq: u64) -> &[u8] {
        let ptr = self.store.slot_ptr(self.sequence.index(seq));
        // SAFETY: see `slot_mut`.
        unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.slot_size) }
    }
}

impl<S: SlotStore> fmt::Debug for RingBuffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("info", &self.info())
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}
