//! Fixed arena of setpoint batch slots addressed by index.
//!
//! Acquire and release are O(N) over a small `N`, with no general allocation.

use crate::error::{Error, Result};
use crate::setpoint::SetpointBatch;

/// Handle to an occupied slot.
///
/// Deliberately not `Copy` or `Clone`: each occupied slot has exactly one
/// handle, and releasing consumes it.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatchId(u8);

impl BatchId {
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

pub struct BatchPool<const N: usize> {
    slots: [SetpointBatch; N],
    used: [bool; N],
}

impl<const N: usize> BatchPool<N> {
    #[must_use]
    pub const fn new() -> Self {
        assert!(N <= u8::MAX as usize, "pool index must fit in a u8");
        Self {
            slots: [const { SetpointBatch::STOP }; N],
            used: [false; N],
        }
    }

    /// Store `batch` in a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] when every slot is occupied.
    pub fn acquire(&mut self, batch: &SetpointBatch) -> Result<BatchId> {
        let (index, (slot, used)) = self
            .slots
            .iter_mut()
            .zip(self.used.iter_mut())
            .enumerate()
            .find(|(_, (_, used))| !**used)
            .ok_or(Error::PoolExhausted)?;
        slot.clone_from(batch);
        *used = true;
        let index = u8::try_from(index).map_err(|_| Error::PoolExhausted)?;
        Ok(BatchId(index))
    }

    /// Store the stop batch without copying a caller's batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] when every slot is occupied.
    pub fn acquire_stop(&mut self) -> Result<BatchId> {
        self.acquire(&SetpointBatch::STOP)
    }

    #[must_use]
    pub fn get(&self, id: &BatchId) -> Option<&SetpointBatch> {
        self.slots.get(id.index())
    }

    pub fn release(&mut self, id: BatchId) {
        if let Some(used) = self.used.get_mut(id.index()) {
            *used = false;
        }
        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.setpoints.clear();
        }
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.used.iter().filter(|used| **used).count()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for BatchPool<N> {
    fn default() -> Self {
        Self::new()
    }
}
