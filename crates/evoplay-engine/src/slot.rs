//! Fixed pool of exclusive numbered slots.
//!
//! Game engines consume a resource scarcer than threads (network ports, per-instance
//! configuration files). A [`SlotAllocator`] bounds how many engines run at once,
//! independently of the worker-pool size: callers [`acquire`](SlotAllocator::acquire) a
//! [`SlotLease`] before spawning an engine and give it back when the engine is dead.
//!
//! The allocator is an explicit value passed to whoever needs it, so independent runs
//! (and tests) never share slots by accident.
//!
//! # Guarantees
//!
//! - At most `capacity` leases are outstanding at any instant.
//! - A slot index is held by at most one lease at a time.
//! - A lease is released exactly once: [`SlotLease::release`] consumes it, and dropping
//!   an unreleased lease releases it.
//!
//! The free-set mutex protects only the scan-and-mark bookkeeping. Callers block on a
//! condition variable while every slot is taken.

use std::{
    ptr,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use log::{debug, warn};
use rand::Rng as _;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum SlotError {
    #[display("slot pool must contain at least one slot")]
    EmptyPool,
    #[display("slot {slot} released while not leased")]
    NotLeased { slot: usize },
    #[display("lease for slot {slot} belongs to a different allocator")]
    ForeignLease { slot: usize },
}

/// Hands out exclusive leases on slot indices `0..capacity`.
#[derive(Debug)]
pub struct SlotAllocator {
    taken: Mutex<Vec<bool>>,
    freed: Condvar,
}

impl SlotAllocator {
    pub fn new(capacity: usize) -> Result<Self, SlotError> {
        if capacity == 0 {
            return Err(SlotError::EmptyPool);
        }
        Ok(Self {
            taken: Mutex::new(vec![false; capacity]),
            freed: Condvar::new(),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Returns the number of outstanding leases.
    #[must_use]
    pub fn leased(&self) -> usize {
        self.lock().iter().filter(|taken| **taken).count()
    }

    /// Blocks until a slot is free and leases it.
    ///
    /// The search starts at a random offset so that slots wear evenly under light load.
    /// No fairness between waiting threads is guaranteed.
    pub fn acquire(&self) -> SlotLease<'_> {
        let mut taken = self.lock();
        loop {
            if let Some(slot) = claim_free(&mut taken) {
                drop(taken);
                debug!("leased slot {slot}");
                return SlotLease::new(self, slot);
            }
            taken = self
                .freed
                .wait(taken)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Leases a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<SlotLease<'_>> {
        let slot = claim_free(&mut self.lock())?;
        debug!("leased slot {slot}");
        Some(SlotLease::new(self, slot))
    }

    /// Returns a lease to the pool.
    ///
    /// Equivalent to [`SlotLease::release`], but also rejects leases issued by another
    /// allocator.
    pub fn release(&self, lease: SlotLease<'_>) -> Result<(), SlotError> {
        if !ptr::eq(self, lease.allocator) {
            return Err(SlotError::ForeignLease { slot: lease.slot });
        }
        lease.release()
    }

    fn free(&self, slot: usize) -> Result<(), SlotError> {
        {
            let mut taken = self.lock();
            match taken.get_mut(slot) {
                Some(entry) if *entry => *entry = false,
                _ => return Err(SlotError::NotLeased { slot }),
            }
        }
        debug!("released slot {slot}");
        self.freed.notify_one();
        Ok(())
    }

    // The critical sections never panic halfway through an update, so a poisoned
    // free-set is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        self.taken.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn claim_free(taken: &mut [bool]) -> Option<usize> {
    let len = taken.len();
    let start = rand::rng().random_range(0..len);
    let slot = (0..len)
        .map(|i| (start + i) % len)
        .find(|&slot| !taken[slot])?;
    taken[slot] = true;
    Some(slot)
}

/// Exclusive ownership of one slot index.
#[derive(Debug)]
#[must_use = "a lease holds a slot until it is released or dropped"]
pub struct SlotLease<'a> {
    allocator: &'a SlotAllocator,
    slot: usize,
    released: bool,
}

impl<'a> SlotLease<'a> {
    fn new(allocator: &'a SlotAllocator, slot: usize) -> Self {
        Self {
            allocator,
            slot,
            released: false,
        }
    }

    /// Returns the leased slot index, in `0..capacity`.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Returns the slot to its allocator.
    pub fn release(mut self) -> Result<(), SlotError> {
        self.released = true;
        self.allocator.free(self.slot)
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.allocator.free(self.slot) {
            warn!("{e}");
        }
    }
}
