//! Suspension of claims that cannot be admitted yet.
//!
//! Admission itself is a CAS loop; the channel here only parks threads
//! until a release, cancel or close might have changed the outcome. The
//! mutex never guards ring state, and releasing threads touch it only when
//! someone is parked.

use std::sync::atomic::{self, AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ring_buffer::{Batch, RingBuffer};
use crate::store::{HeapSlots, SlotStore};

/// Point in time a claim gives up; `None` waits forever.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    timeout: Duration,
    at: Option<Instant>,
}

impl Deadline {
    /// A zero timeout means no deadline.
    pub(crate) fn after(timeout: Duration) -> Self {
        let at = if timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(timeout)
        };
        Self { timeout, at }
    }
}

#[derive(Debug, Default)]
pub(crate) struct WaitChannel {
    lock: Mutex<()>,
    cond: Condvar,
    waiters: AtomicUsize,
}

impl WaitChannel {
    /// Run `attempt` until it yields a value, parking between tries.
    ///
    /// `interrupted` is checked under the channel lock before every try, so
    /// a flag set before [`notify`](Self::notify) is never missed.
    pub(crate) fn wait_for<T>(
        &self,
        deadline: &Deadline,
        interrupted: &impl Fn() -> Option<Error>,
        mut attempt: impl FnMut() -> Option<T>,
    ) -> Result<T> {
        if let Some(err) = interrupted() {
            return Err(err);
        }
        if let Some(value) = attempt() {
            return Ok(value);
        }

        self.waiters.fetch_add(1, Ordering::SeqCst);
        atomic::fence(Ordering::SeqCst);
        let result = self.park(deadline, interrupted, &mut attempt);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn park<T>(
        &self,
        deadline: &Deadline,
        interrupted: &impl Fn() -> Option<Error>,
        attempt: &mut impl FnMut() -> Option<T>,
    ) -> Result<T> {
        let mut guard = self.lock.lock();
        loop {
            if let Some(err) = interrupted() {
                return Err(err);
            }
            if let Some(value) = attempt() {
                return Ok(value);
            }
            match deadline.at {
                None => self.cond.wait(&mut guard),
                Some(at) => {
                    if self.cond.wait_until(&mut guard, at).timed_out() {
                        return attempt().ok_or(Error::Timeout(deadline.timeout));
                    }
                }
            }
        }
    }

    /// Wake every parked claimant so it re-runs its attempt.
    pub(crate) fn notify(&self) {
        atomic::fence(Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.cond.notify_all();
        }
    }

    pub(crate) fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

/// A claim that has been validated but not yet admitted.
///
/// This is the result handle of an asynchronous claim: [`wait`](Self::wait)
/// blocks for the batch, [`try_claim`](Self::try_claim) polls for it, and a
/// [`ClaimCanceller`] obtained from the handle can abandon it from any thread.
/// An abandoned claim never consumes sequences or batch numbers.
pub struct PendingClaim<'a, S: SlotStore = HeapSlots> {
    ring: &'a RingBuffer<S>,
    count: u16,
    canceled: Arc<AtomicBool>,
}

impl<'a, S: SlotStore> PendingClaim<'a, S> {
    pub(crate) fn new(ring: &'a RingBuffer<S>, count: u16) -> Self {
        Self {
            ring,
            count,
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of slots requested
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Whether the claim was canceled
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// A handle that cancels this claim from another thread.
    pub fn canceller(&self) -> ClaimCanceller {
        ClaimCanceller {
            canceled: Arc::clone(&self.canceled),
            channel: self.ring.wait_channel(),
        }
    }

    /// Abandon the claim; a blocked [`wait`](Self::wait) returns [`Error::Canceled`].
    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// Take the batch if it can be admitted right now.
    pub fn try_claim(&self) -> Result<Option<Batch<'a, S>>> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        match self.ring.try_claim(self.count) {
            Ok(batch) => Ok(Some(batch)),
            Err(Error::Full { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Block until the claim is admitted, canceled, or `timeout` elapses.
    ///
    /// A zero `timeout` waits indefinitely.
    pub fn wait(self, timeout: Duration) -> Result<Batch<'a, S>> {
        let result = self
            .ring
            .claim_until(self.count, &Deadline::after(timeout), Some(&*self.canceled));
        if let Err(Error::Canceled) = result {
            debug!(count = self.count, "pending claim canceled");
        }
        result
    }
}

/// Cancels a [`PendingClaim`]; cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct ClaimCanceller {
    canceled: Arc<AtomicBool>,
    channel: Arc<WaitChannel>,
}

impl ClaimCanceller {
    /// Cancel the claim and wake it if parked.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.channel.notify();
    }

    /// Whether the claim was canceled
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}
