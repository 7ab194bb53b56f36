//! Raw slot storage and the in-band slot header.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// Slot alignment, one cache line
pub const SLOT_ALIGN: usize = 64;

/// Bytes in front of every payload in [`BatchingMode::Multi`](crate::BatchingMode::Multi)
pub const HEADER_SIZE: usize = 6;

/// Backing memory for the ring: `capacity` slots of `slot_size` bytes.
///
/// # Safety
///
/// Implementors guarantee that for every `index < capacity()` the pointer
/// returned by `slot_ptr(index)` is valid for reads and writes of
/// `slot_size()` bytes for as long as the store lives, and that distinct
/// indices never overlap. The ring synchronizes all access to the bytes.
pub unsafe trait SlotStore: Send + Sync {
    /// Number of slots
    fn capacity(&self) -> usize;

    /// Bytes per slot
    fn slot_size(&self) -> usize;

    /// Start of slot `index`
    ///
    /// # Panics
    /// May panic if `index >= capacity()`
    fn slot_ptr(&self, index: usize) -> NonNull<u8>;
}

/// Zeroed, cache-line aligned heap allocation holding every slot contiguously.
pub struct HeapSlots {
    data: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    slot_size: usize,
}

// SAFETY: the allocation is owned and the ring synchronizes slot access.
unsafe impl Send for HeapSlots {}
unsafe impl Sync for HeapSlots {}

impl HeapSlots {
    /// Allocate zeroed storage
    ///
    /// # Arguments
    /// * `capacity` - Number of slots
    /// * `slot_size` - Bytes per slot
    ///
    /// # Returns
    /// * `Ok(HeapSlots)` on success
    /// * `Err(Error::InvalidArgument)` if either is zero or the total overflows
    pub fn new(capacity: usize, slot_size: usize) -> Result<Self> {
        if capacity == 0 || slot_size == 0 {
            return Err(Error::InvalidArgument("slot store must be non-empty"));
        }
        let total = capacity
            .checked_mul(slot_size)
            .ok_or(Error::InvalidArgument("ring size overflows usize"))?;
        let layout = Layout::from_size_align(total, SLOT_ALIGN)
            .map_err(|_| Error::InvalidArgument("ring size exceeds allocation limits"))?;

        // SAFETY: layout has a non-zero size.
        let data = unsafe { alloc::alloc_zeroed(layout) };
        let data = NonNull::new(data).unwrap_or_else(|| alloc::handle_alloc_error(layout));

        Ok(Self {
            data,
            layout,
            capacity,
            slot_size,
        })
    }

    /// Total bytes allocated
    pub fn total_size(&self) -> usize {
        self.layout.size()
    }
}

unsafe impl SlotStore for HeapSlots {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot_size(&self) -> usize {
        self.slot_size
    }

    #[inline]
    fn slot_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(index < self.capacity, "slot index {index} out of range");
        // SAFETY: index < capacity keeps the offset inside the allocation.
        unsafe { NonNull::new_unchecked(self.data.as_ptr().add(index * self.slot_size)) }
    }
}

impl Drop for HeapSlots {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { alloc::dealloc(self.data.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for HeapSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapSlots")
            .field("data", &self.data)
            .field("capacity", &self.capacity)
            .field("slot_size", &self.slot_size)
            .finish()
    }
}

/// Header written at the start of every slot of a multi-entry batch.
///
/// Layout, little-endian:
///
/// ```text
/// 0      4      6
/// +------+------+----------
/// | num  | idx  | payload...
/// +------+------+----------
/// ```
///
/// `num` is the low 32 bits of the batch number, `idx` the slot's position
/// inside its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHeader {
    /// Low 32 bits of the batch number
    pub batch_num: u32,
    /// Position inside the batch
    pub index: u16,
}

impl SlotHeader {
    /// Header for entry `index` of batch `batch_num`; keeps the low 32 bits.
    pub fn new(batch_num: u64, index: u16) -> Self {
        Self {
            batch_num: batch_num as u32,
            index,
        }
    }

    /// Decode from the first [`HEADER_SIZE`] bytes of a slot.
    pub fn decode(slot: &[u8]) -> Option<Self> {
        let bytes = slot.get(..HEADER_SIZE)?;
        Some(Self {
            batch_num: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
        })
    }

    /// Write into the first [`HEADER_SIZE`] bytes of a slot.
    pub fn encode(&self, slot: &mut [u8]) {
        slot[..4].copy_from_slice(&self.batch_num.to_le_bytes());
        slot[4..HEADER_SIZE].copy_from_slice(&self.index.to_le_bytes());
    }
}
