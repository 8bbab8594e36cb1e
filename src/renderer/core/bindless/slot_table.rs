//! Bindless slot bookkeeping, independent of any GPU object.
//!
//! Slot 0 permanently resolves to the default texture. Every other slot is
//! vacant, live, or expired (its weak reference no longer upgrades). Expired
//! slots are never swept; `allocate` reclaims them when a probe lands on one.

use std::sync::{Arc, Weak};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::errors::{Result, TesseraError};
use crate::renderer::settings::BindlessSettings;

/// Reserved slot that always maps to the default texture.
pub const DEFAULT_SLOT: u32 = 0;

enum SlotEntry<T> {
    Vacant,
    Occupied(Weak<T>),
}

/// Observable state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Slot 0.
    Reserved,
    Vacant,
    Live,
    /// Mapped to a resource that has since been dropped.
    Expired,
}

impl SlotState {
    #[inline]
    #[must_use]
    pub fn is_reusable(self) -> bool {
        matches!(self, Self::Vacant | Self::Expired)
    }
}

/// Integer slot → weakly-held resource map with random-probe allocation.
pub struct SlotTable<T> {
    entries: Vec<SlotEntry<T>>,
    default: Arc<T>,
    rng: StdRng,
    max_probe_attempts: u32,
}

impl<T> SlotTable<T> {
    #[must_use]
    pub fn new(default: Arc<T>, settings: &BindlessSettings) -> Self {
        let capacity = settings.max_slots.max(1) as usize;
        Self {
            entries: (0..capacity).map(|_| SlotEntry::Vacant).collect(),
            default,
            rng: StdRng::seed_from_u64(settings.seed),
            max_probe_attempts: settings.max_probe_attempts,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn default_resource(&self) -> &Arc<T> {
        &self.default
    }

    #[must_use]
    pub fn state(&self, slot: u32) -> Option<SlotState> {
        if slot == DEFAULT_SLOT {
            return Some(SlotState::Reserved);
        }
        let state = match self.entries.get(slot as usize)? {
            SlotEntry::Vacant => SlotState::Vacant,
            SlotEntry::Occupied(weak) if weak.strong_count() > 0 => SlotState::Live,
            SlotEntry::Occupied(_) => SlotState::Expired,
        };
        Some(state)
    }

    /// The resource a shader indexing `slot` sees: the live resource, or the
    /// default for vacant, expired, reserved and out-of-range slots.
    #[must_use]
    pub fn resolve(&self, slot: u32) -> Arc<T> {
        match self.entries.get(slot as usize) {
            Some(SlotEntry::Occupied(weak)) if slot != DEFAULT_SLOT => {
                weak.upgrade().unwrap_or_else(|| Arc::clone(&self.default))
            }
            _ => Arc::clone(&self.default),
        }
    }

    /// Number of slots currently mapped to a live resource.
    #[must_use]
    pub fn live_count(&self) -> usize {
        (1..self.capacity())
            .filter(|&slot| self.state(slot) == Some(SlotState::Live))
            .count()
    }

    /// Picks a reusable slot in `[1, capacity)` and maps `resource` to it.
    ///
    /// Probes uniformly random slots up to the configured attempt count, then
    /// falls back to a linear sweep so a table with a single reusable slot
    /// still succeeds. Fails only when every slot is live.
    pub fn allocate(&mut self, resource: &Arc<T>) -> Result<u32> {
        let capacity = self.capacity();
        if capacity <= 1 {
            return Err(TesseraError::SlotTableExhausted {
                attempts: 0,
                capacity,
            });
        }

        for _ in 0..self.max_probe_attempts {
            let slot = self.rng.random_range(1..capacity);
            if self.state(slot).is_some_and(SlotState::is_reusable) {
                self.entries[slot as usize] = SlotEntry::Occupied(Arc::downgrade(resource));
                return Ok(slot);
            }
        }

        let found = (1..capacity).find(|&slot| self.state(slot).is_some_and(SlotState::is_reusable));
        match found {
            Some(slot) => {
                log::debug!(
                    "Bindless probe missed {} times; swept to slot {slot}",
                    self.max_probe_attempts
                );
                self.entries[slot as usize] = SlotEntry::Occupied(Arc::downgrade(resource));
                Ok(slot)
            }
            None => Err(TesseraError::SlotTableExhausted {
                attempts: self.max_probe_attempts + capacity - 1,
                capacity,
            }),
        }
    }

    /// Maps `resource` to `slot`, replacing whatever was there.
    pub fn allocate_at(&mut self, resource: &Arc<T>, slot: u32) -> Result<()> {
        self.check_writable(slot)?;
        self.entries[slot as usize] = SlotEntry::Occupied(Arc::downgrade(resource));
        Ok(())
    }

    /// Clears the mapping of `slot`; it resolves to the default from now on.
    ///
    /// Returns whether the slot held a mapping. Releasing slot 0 is a no-op.
    pub fn release(&mut self, slot: u32) -> Result<bool> {
        if slot == DEFAULT_SLOT {
            log::warn!("Ignoring release of reserved bindless slot {DEFAULT_SLOT}");
            return Ok(false);
        }
        self.check_writable(slot)?;
        let previous = std::mem::replace(&mut self.entries[slot as usize], SlotEntry::Vacant);
        Ok(matches!(previous, SlotEntry::Occupied(_)))
    }

    fn check_writable(&self, slot: u32) -> Result<()> {
        if slot == DEFAULT_SLOT {
            return Err(TesseraError::ReservedSlot(slot));
        }
        if slot >= self.capacity() {
            return Err(TesseraError::SlotOutOfRange {
                slot,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }
}
