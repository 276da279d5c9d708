/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! The VCHIQ platform device: register window, doorbell interrupt and DMA memory.

use {
    crate::platform::rpi3::{coherent::CoherentRegion, interrupt::irq, BcmHost},
    core::ptr::NonNull,
};

/// Resources one platform device can carry.
pub const MAX_RESOURCES: usize = 4;

bitflags::bitflags! {
    /// `IORESOURCE_*` kinds.
    pub struct ResourceFlags: u32 {
        const MEM = 0x0000_0200;
        const IRQ = 0x0000_0400;
        const DMA = 0x0000_0800;
    }
}

/// Inclusive address or interrupt number range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    pub start: usize,
    pub end: usize,
    pub flags: ResourceFlags,
}

impl Resource {
    pub const fn size(&self) -> usize {
        self.end - self.start + 1
    }
}

#[derive(Debug, Default)]
pub struct PlatformDevice {
    resources: [Option<Resource>; MAX_RESOURCES],
    count: usize,
    dma_memory: Option<Resource>,
}

impl PlatformDevice {
    pub const fn new() -> Self {
        Self {
            resources: [None; MAX_RESOURCES],
            count: 0,
            dma_memory: None,
        }
    }

    /// Append a resource. Running out of slots is fatal.
    pub fn add_resource(&mut self, start: usize, end: usize, flags: ResourceFlags) {
        bug_on!(start > end);
        bug_on!(flags.is_empty());
        bug_on!(self.count >= MAX_RESOURCES);

        self.resources[self.count] = Some(Resource { start, end, flags });
        self.count += 1;
    }

    /// Declare the memory `dmam_alloc_coherent()` hands out.
    pub fn set_dma_memory(&mut self, start: usize, end: usize) {
        bug_on!(start > end);
        self.dma_memory = Some(Resource {
            start,
            end,
            flags: ResourceFlags::DMA,
        });
    }

    /// The `index`-th resource of kind `flags`.
    pub fn resource(&self, flags: ResourceFlags, index: usize) -> Option<Resource> {
        self.resources
            .iter()
            .flatten()
            .filter(|resource| resource.flags.contains(flags))
            .nth(index)
            .copied()
    }

    /// Interrupt number of the `index`-th IRQ resource.
    pub fn irq(&self, index: usize) -> Option<usize> {
        self.resource(ResourceFlags::IRQ, index)
            .map(|resource| resource.start)
    }

    /// `dmam_alloc_coherent()`: the whole DMA range, if it holds `size` bytes.
    /// Returns the CPU address and the bus address of the memory.
    ///
    /// There is a single consumer, every call returns the same memory.
    pub fn alloc_coherent(&self, size: usize) -> Option<(NonNull<u8>, u32)> {
        let memory = self.dma_memory?;
        if memory.size() < size {
            return None;
        }
        let cpu = NonNull::new(memory.start as *mut u8)?;
        Some((cpu, BcmHost::phys2bus(memory.start)))
    }
}

/// The device as wired on the BCM2835: doorbell registers, doorbell 0 interrupt and the
/// VCHIQ half of the coherent region for slots and fragments.
pub fn vchiq_device(region: &CoherentRegion) -> PlatformDevice {
    let mut device = PlatformDevice::new();
    let (start, end) = BcmHost::vchiq_registers();
    device.add_resource(start, end, ResourceFlags::MEM);
    device.add_resource(irq::ARM_DOORBELL_0, irq::ARM_DOORBELL_0, ResourceFlags::IRQ);
    let (start, end) = region.vchiq_region();
    device.set_dma_memory(start, end);
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcm2835_device_layout() {
        let device = vchiq_device(&CoherentRegion::default());
        assert_eq!(
            device.resource(ResourceFlags::MEM, 0),
            Some(Resource {
                start: 0x3f00_b840,
                end: 0x3f00_b84f,
                flags: ResourceFlags::MEM
            })
        );
        assert_eq!(device.irq(0), Some(66));
        assert_eq!(device.irq(1), None);

        let (cpu, bus) = device.alloc_coherent(512 * 1024).unwrap();
        assert_eq!(cpu.as_ptr() as usize, 0x01c8_0000);
        assert_eq!(bus, 0xc1c8_0000);
        assert!(device.alloc_coherent(512 * 1024 + 1).is_none());
    }

    #[test]
    fn device_without_dma_memory_cannot_allocate() {
        let device = PlatformDevice::new();
        assert!(device.alloc_coherent(1).is_none());
        assert_eq!(device.resource(ResourceFlags::MEM, 0), None);
    }

    #[test]
    #[should_panic]
    fn fifth_resource_is_fatal() {
        let mut device = PlatformDevice::new();
        for irq in 0..=MAX_RESOURCES {
            device.add_resource(irq, irq, ResourceFlags::IRQ);
        }
    }

    #[test]
    #[should_panic]
    fn inverted_range_is_fatal() {
        let mut device = PlatformDevice::new();
        device.add_resource(0x2000, 0x1000, ResourceFlags::MEM);
    }
}
