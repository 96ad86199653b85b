//! Decoded Picture Buffer
//!
//! Fixed slot table of reference pictures. Eviction is entirely codec-driven:
//! a slot only changes when the refresh mask of a decoded frame names it.

use thiserror::Error;

use crate::picture::PictureRef;

/// Reference slots in a VP9 stream.
pub const VP9_NUM_REF_FRAMES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DpbError {
    #[error("DPB slot {slot} out of range (capacity {capacity})")]
    OutOfRange { slot: usize, capacity: usize },
    #[error("DPB slot {0} is empty")]
    EmptySlot(usize),
}

#[derive(Debug, Clone)]
pub struct Dpb {
    slots: Vec<Option<PictureRef>>,
}

impl Dpb {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, slot: usize) -> Result<(), DpbError> {
        if slot >= self.slots.len() {
            return Err(DpbError::OutOfRange {
                slot,
                capacity: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Picture held in `slot`, `Ok(None)` when the slot is empty.
    pub fn get(&self, slot: usize) -> Result<Option<PictureRef>, DpbError> {
        self.check(slot)?;
        Ok(self.slots[slot].clone())
    }

    /// Like [`Dpb::get`] but treats an empty slot as an error.
    pub fn get_occupied(&self, slot: usize) -> Result<PictureRef, DpbError> {
        self.get(slot)?.ok_or(DpbError::EmptySlot(slot))
    }

    /// Store `picture` in `slot`, dropping the DPB's reference to the
    /// previous occupant. Returns that previous occupant.
    pub fn insert(&mut self, slot: usize, picture: PictureRef) -> Result<Option<PictureRef>, DpbError> {
        self.check(slot)?;
        Ok(self.slots[slot].replace(picture))
    }

    /// Insert into every slot set in `mask`. Fails without touching any slot
    /// when the mask names a slot beyond capacity.
    pub fn refresh(&mut self, mask: u32, picture: &PictureRef) -> Result<(), DpbError> {
        self.validate_mask(mask)?;
        for slot in 0..self.slots.len().min(u32::BITS as usize) {
            if mask & (1 << slot) != 0 {
                self.slots[slot] = Some(picture.clone());
            }
        }
        Ok(())
    }

    pub fn validate_mask(&self, mask: u32) -> Result<(), DpbError> {
        let capacity = self.slots.len();
        if capacity < u32::BITS as usize && mask >> capacity != 0 {
            let slot = (u32::BITS - mask.leading_zeros() - 1) as usize;
            return Err(DpbError::OutOfRange { slot, capacity });
        }
        Ok(())
    }

    /// Slot-ordered view of the table, for backends building reference lists.
    pub fn slots(&self) -> &[Option<PictureRef>] {
        &self.slots
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}

impl Default for Dpb {
    fn default() -> Self {
        Self::new(VP9_NUM_REF_FRAMES)
    }
}
