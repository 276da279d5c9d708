/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

pub mod coroutine;

pub mod barrier {
    use aarch64_cpu::asm::barrier;

    /// Order earlier stores before later ones, as Linux `wmb()`.
    #[inline(always)]
    pub fn wmb() {
        barrier::dsb(barrier::SY);
    }

    #[inline(always)]
    pub fn dmb() {
        barrier::dmb(barrier::SY);
    }

    #[inline(always)]
    pub fn dsb() {
        barrier::dsb(barrier::SY);
    }
}

pub mod cache {
    use {super::barrier, crate::mm};

    /// Data cache line size of the Cortex-A53.
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Clean and invalidate every data cache line overlapping `[start, start + len)`
    /// to the point of coherency.
    pub fn clean_and_invalidate_range(start: usize, len: usize) {
        if len == 0 {
            return;
        }
        let end = start + len;
        let mut line = mm::align_down(start, CACHE_LINE_SIZE);
        while line < end {
            unsafe {
                core::arch::asm!("dc civac, {}", in(reg) line, options(nostack, preserves_flags));
            }
            line += CACHE_LINE_SIZE;
        }
        barrier::dsb();
    }
}

pub mod cpu {
    /// Number of the executing core.
    #[inline(always)]
    pub fn core_id() -> usize {
        use aarch64_cpu::registers::{Readable, MPIDR_EL1};

        const CORE_MASK: u64 = 0x3;
        (MPIDR_EL1.get() & CORE_MASK) as usize
    }

    /// Busy-wait hint inside spin loops.
    #[inline(always)]
    pub fn spin_hint() {
        core::hint::spin_loop();
    }

    /// Park the core forever.
    pub fn endless_sleep() -> ! {
        loop {
            aarch64_cpu::asm::wfe();
        }
    }
}

pub mod time {
    use {
        aarch64_cpu::registers::{Readable, CNTFRQ_EL0, CNTPCT_EL0},
        core::time::Duration,
    };

    const NANOSEC_PER_SEC: u128 = 1_000_000_000;

    /// Time since the generic timer started counting, used for log timestamps.
    pub fn uptime() -> Duration {
        let frequency = CNTFRQ_EL0.get() as u128;
        if frequency == 0 {
            return Duration::ZERO;
        }
        let nanos = (CNTPCT_EL0.get() as u128 * NANOSEC_PER_SEC) / frequency;
        Duration::from_nanos(nanos as u64)
    }
}
