use std::num::NonZeroU32;
use std::sync::atomic::{
    AtomicU32,
    Ordering,
};

const UNCLAIMED: u32 = 0;

/// Ownership table for the peaks of a [crate::PeakIndex], scoped to one sweep.
///
/// A peak claimed by an accepted feature is no longer "active" for any other
/// feature. Claims can be handed over to another owner but never dropped, so a
/// deactivated peak stays deactivated for the rest of the sweep.
#[derive(Debug)]
pub struct PeakClaims {
    owners: Vec<AtomicU32>,
}

impl PeakClaims {
    pub fn new(num_peaks: usize) -> Self {
        Self {
            owners: (0..num_peaks).map(|_| AtomicU32::new(UNCLAIMED)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Claim an unclaimed peak. Returns false if it already has an owner
    /// (or the position is out of bounds).
    pub fn claim(&self, position: u32, owner: NonZeroU32) -> bool {
        match self.owners.get(position as usize) {
            Some(slot) => slot
                .compare_exchange(UNCLAIMED, owner.get(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            None => false,
        }
    }

    /// Move a claim from `from` to `to`. Only succeeds if `from` currently owns the peak.
    pub fn transfer(&self, position: u32, from: NonZeroU32, to: NonZeroU32) -> bool {
        match self.owners.get(position as usize) {
            Some(slot) => slot
                .compare_exchange(from.get(), to.get(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            None => false,
        }
    }

    pub fn owner(&self, position: u32) -> Option<NonZeroU32> {
        self.owners
            .get(position as usize)
            .and_then(|slot| NonZeroU32::new(slot.load(Ordering::Acquire)))
    }

    /// A peak is active while nobody owns it.
    pub fn is_active(&self, position: u32) -> bool {
        self.owner(position).is_none()
    }

    pub fn num_claimed(&self) -> usize {
        self.owners
            .iter()
            .filter(|x| x.load(Ordering::Relaxed) != UNCLAIMED)
            .count()
    }
}
