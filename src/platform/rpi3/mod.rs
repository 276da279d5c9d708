/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

pub mod coherent;
pub mod interrupt;
pub mod mailbox;
pub mod timer;

/// See BCM2835-ARM-Peripherals.pdf
/// See <https://www.raspberrypi.org/forums/viewtopic.php?t=186090> for more details.
pub struct BcmHost;

impl BcmHost {
    /// VideoCore view of uncached SDRAM.
    pub const GPU_MEM_BASE: u32 = 0xc000_0000;

    /// This returns the ARM-side physical address where peripherals are mapped.
    pub const fn get_peripheral_address() -> usize {
        0x3f00_0000
    }

    /// ARM interrupt controller block.
    pub const fn interrupt_controller_address() -> usize {
        Self::get_peripheral_address() + 0xb200
    }

    /// Free-running 1 MHz system timer.
    pub const fn system_timer_address() -> usize {
        Self::get_peripheral_address() + 0x3000
    }

    /// Property mailbox to the VideoCore firmware.
    pub const fn mailbox_address() -> usize {
        Self::get_peripheral_address() + 0xb880
    }

    /// VCHIQ doorbell registers, inclusive range.
    pub const fn vchiq_registers() -> (usize, usize) {
        let base = Self::get_peripheral_address() + 0xb840;
        (base, base + 0xf)
    }

    /// Bus address of ARM physical memory as seen by the VideoCore, through the uncached
    /// alias. Only the low gigabyte is reachable.
    pub const fn phys2bus(phys: usize) -> u32 {
        ((phys as u32) & !Self::GPU_MEM_BASE) | Self::GPU_MEM_BASE
    }

    pub const fn bus2phys(bus: u32) -> usize {
        (bus & !Self::GPU_MEM_BASE) as usize
    }
}
