/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Coherent (uncached) memory region shared with the VideoCore.
//!
//! The kernel maps one megabyte as device memory and hands out fixed page slots from
//! it: low slots for small buffers such as the property mailbox, the upper half for
//! VCHIQ slot and fragment memory.

use crate::mm::PAGE_SIZE;

/// Default physical base of the coherent megabyte.
pub const COHERENT_REGION_BASE: usize = 0x01c0_0000;
/// Size of the coherent region.
pub const COHERENT_REGION_SIZE: usize = 0x0010_0000;

/// Page slot holding the property mailbox buffer used to enable VCHIQ.
pub const PROPERTY_MAILBOX_SLOT: usize = 4;
/// First page slot of the VCHIQ area.
pub const VCHIQ_START_SLOT: usize = COHERENT_REGION_SIZE / PAGE_SIZE / 2;
/// Last page slot of the VCHIQ area.
pub const VCHIQ_END_SLOT: usize = COHERENT_REGION_SIZE / PAGE_SIZE - 1;

#[derive(Copy, Clone, Debug)]
pub struct CoherentRegion {
    base: usize,
}

impl CoherentRegion {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// Address of page `slot` inside the region.
    pub const fn page(&self, slot: usize) -> usize {
        self.base + slot * PAGE_SIZE
    }

    /// Inclusive address range reserved for VCHIQ, half a megabyte.
    pub const fn vchiq_region(&self) -> (usize, usize) {
        (
            self.page(VCHIQ_START_SLOT),
            self.page(VCHIQ_END_SLOT) + PAGE_SIZE - 1,
        )
    }
}

impl Default for CoherentRegion {
    fn default() -> Self {
        Self::new(COHERENT_REGION_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vchiq_gets_upper_half_megabyte() {
        let region = CoherentRegion::default();
        assert_eq!(VCHIQ_START_SLOT, 128);
        assert_eq!(region.page(PROPERTY_MAILBOX_SLOT), 0x01c0_4000);
        assert_eq!(region.vchiq_region(), (0x01c8_0000, 0x01cf_ffff));
    }
}
