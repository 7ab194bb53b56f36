//! Ring geometry and construction parameters.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::HEADER_SIZE;

/// Maximum number of independent consumer groups (one bit each in a batch's
/// group flags).
pub const MAX_GROUPS: usize = 16;

/// Number of slots in the ring.
///
/// Sizes are fixed powers of two so a sequence maps to a slot with a single
/// mask:
///
/// ```text
/// L0  =              64    L7  =    131_072
/// L1  =             512    L8  =    262_144
/// L2  =           1_024    L9  =  2_097_152
/// L3  =           2_048    L10 =  4_194_304
/// L4  =           4_096    L11 =  8_388_608
/// L5  =          32_768    L12 = 16_777_216
/// L6  =          65_536
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CapacityTier {
    /// 64 slots
    L0 = 0,
    /// 512 slots
    L1 = 1,
    /// 1_024 slots
    L2 = 2,
    /// 2_048 slots
    L3 = 3,
    /// 4_096 slots
    L4 = 4,
    /// 32_768 slots
    L5 = 5,
    /// 65_536 slots
    L6 = 6,
    /// 131_072 slots
    L7 = 7,
    /// 262_144 slots
    L8 = 8,
    /// 2_097_152 slots
    L9 = 9,
    /// 4_194_304 slots
    L10 = 10,
    /// 8_388_608 slots
    L11 = 11,
    /// 16_777_216 slots
    L12 = 12,
}

impl CapacityTier {
    /// All tiers, smallest first.
    pub const ALL: [CapacityTier; 13] = [
        CapacityTier::L0,
        CapacityTier::L1,
        CapacityTier::L2,
        CapacityTier::L3,
        CapacityTier::L4,
        CapacityTier::L5,
        CapacityTier::L6,
        CapacityTier::L7,
        CapacityTier::L8,
        CapacityTier::L9,
        CapacityTier::L10,
        CapacityTier::L11,
        CapacityTier::L12,
    ];

    /// Slot count for this tier
    pub const fn slots(self) -> usize {
        match self {
            CapacityTier::L0 => 64,
            CapacityTier::L1 => 8 * 64,
            CapacityTier::L2 => 16 * 64,
            CapacityTier::L3 => 32 * 64,
            CapacityTier::L4 => 4096,
            CapacityTier::L5 => 8 * 4096,
            CapacityTier::L6 => 16 * 4096,
            CapacityTier::L7 => 32 * 4096,
            CapacityTier::L8 => 64 * 4096,
            CapacityTier::L9 => 8 * 64 * 4096,
            CapacityTier::L10 => 16 * 64 * 4096,
            CapacityTier::L11 => 32 * 64 * 4096,
            CapacityTier::L12 => 64 * 64 * 4096,
        }
    }

    /// Smallest tier holding at least `slots` slots.
    pub fn at_least(slots: usize) -> Option<CapacityTier> {
        Self::ALL.into_iter().find(|tier| tier.slots() >= slots)
    }
}

impl TryFrom<u8> for CapacityTier {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(Error::InvalidArgument("unknown capacity tier"))
    }
}

impl fmt::Display for CapacityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", *self as u8)
    }
}

/// Whether a batch may span several slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BatchingMode {
    /// One slot per batch, no in-band header
    Single,
    /// Up to `capacity` slots per batch, every slot prefixed with a header
    #[default]
    Multi,
}

impl BatchingMode {
    /// Bytes reserved in front of each payload
    pub const fn header_size(self) -> usize {
        match self {
            BatchingMode::Single => 0,
            BatchingMode::Multi => HEADER_SIZE,
        }
    }
}

/// Construction parameters for a [`RingBuffer`](crate::RingBuffer).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RingBufferConfig {
    /// Slot count
    pub tier: CapacityTier,
    /// Usable bytes per slot, excluding the header
    pub payload_size: usize,
    /// Size of the batch table; rounded up to a power of two. Zero means one
    /// record per slot.
    pub batch_capacity: usize,
    /// Number of independent consumer groups
    pub groups: usize,
    /// Whether batches may span several slots
    pub batching: BatchingMode,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            tier: CapacityTier::L0,
            payload_size: 64 - HEADER_SIZE,
            batch_capacity: 0,
            groups: 1,
            batching: BatchingMode::Multi,
        }
    }
}

impl RingBufferConfig {
    /// Create a config with one consumer group and multi-entry batching
    ///
    /// # Arguments
    /// * `tier` - Slot count
    /// * `payload_size` - Usable bytes per slot, excluding the header
    pub fn new(tier: CapacityTier, payload_size: usize) -> Self {
        Self {
            tier,
            payload_size,
            ..Self::default()
        }
    }

    /// Set the batch table size; zero means one record per slot
    pub fn batch_capacity(mut self, batch_capacity: usize) -> Self {
        self.batch_capacity = batch_capacity;
        self
    }

    /// Set the number of consumer groups, `1..=MAX_GROUPS`
    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    /// Set the batching mode
    pub fn batching(mut self, batching: BatchingMode) -> Self {
        self.batching = batching;
        self
    }

    /// Check the parameters without allocating anything.
    pub fn validate(&self) -> Result<()> {
        if self.payload_size == 0 {
            return Err(Error::InvalidArgument("payload size must be non-zero"));
        }
        if self.groups == 0 || self.groups > MAX_GROUPS {
            return Err(Error::InvalidArgument(
                "consumer group count must be between 1 and 16",
            ));
        }
        if self.batch_capacity > u32::MAX as usize {
            return Err(Error::InvalidArgument("batch capacity is too large"));
        }
        self.slot_size()
            .checked_mul(self.tier.slots())
            .ok_or(Error::InvalidArgument("ring size overflows usize"))?;
        Ok(())
    }

    /// Header plus payload bytes
    pub fn slot_size(&self) -> usize {
        self.payload_size.saturating_add(self.batching.header_size())
    }

    /// Registry size after defaulting and power-of-two rounding
    pub fn effective_batch_capacity(&self) -> usize {
        match self.batch_capacity {
            0 => self.tier.slots(),
            n => n.next_power_of_two(),
        }
    }
}
