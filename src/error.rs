use std::time::Duration;

use thiserror::Error;

use crate::registry::BatchState;

/// Errors returned by ring buffer operations.
///
/// None of these are fatal to the ring itself: after any error the shared
/// counters are consistent and further calls behave normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A parameter was out of its valid domain (zero claim, bad geometry, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The claim can never be satisfied because it is larger than the ring
    #[error("claim of {requested} slots exceeds ring capacity of {capacity}")]
    CapacityExceeded {
        /// Slots asked for
        requested: usize,
        /// Slots in the ring
        capacity: usize,
    },
    /// Not enough free slots right now (non-blocking claims only)
    #[error("not enough free slots: requested {requested}, available {available}")]
    Full {
        /// Slots asked for
        requested: usize,
        /// Slots free at the time of the attempt
        available: usize,
    },
    /// The claim could not be satisfied before its deadline
    #[error("claim timed out after {0:?}")]
    Timeout(Duration),
    /// The operation is not valid for the batch's current state
    #[error("cannot {operation} batch {batch_num} in state {state}")]
    InvalidState {
        /// What was attempted
        operation: &'static str,
        /// Batch the operation targeted
        batch_num: u64,
        /// State the batch was found in
        state: BatchState,
    },
    /// An earlier batch has not been released by this group yet
    #[error(
        "batch {batch_num} released out of order: group {group} barrier is at {barrier}, batch starts at {seq_num}"
    )]
    OutOfOrder {
        /// Batch the release targeted
        batch_num: u64,
        /// Releasing group
        group: usize,
        /// First sequence the group has not released
        barrier: u64,
        /// First sequence of the batch
        seq_num: u64,
    },
    /// The group's barrier already moved past this batch
    #[error("batch {batch_num} was already released by group {group}")]
    AlreadyReleased {
        /// Batch the release targeted
        batch_num: u64,
        /// Releasing group
        group: usize,
    },
    /// A pending claim was canceled by its owner
    #[error("claim canceled")]
    Canceled,
    /// The ring buffer was closed
    #[error("ring buffer is closed")]
    Closed,
}

/// Result alias defaulting to this crate's [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;
