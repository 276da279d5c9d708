/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! BCM2835 system timer: 1 MHz free-running counter with four compare channels.
//!
//! Channel 1 drives the periodic kernel tick, the counter itself backs busy-wait delays.

use {
    super::interrupt::{IrqHandler, IrqReturn},
    crate::{
        arch,
        platform::MMIODerefWrapper,
        sched::Clock,
        sync::{interface::Mutex, NullLock},
    },
    tock_registers::{
        interfaces::{Readable, Writeable},
        register_bitfields, register_structs,
        registers::{ReadOnly, ReadWrite},
    },
};

/// Periodic tick rate.
pub const TICKS_PER_SECOND: u32 = 100;
/// Microseconds between two ticks.
pub const TICK_INTERVAL_US: u32 = 1_000_000 / TICKS_PER_SECOND;

register_bitfields! {
    u32,

    /// Compare match flags, write 1 to clear.
    CS [
        M0 OFFSET(0) NUMBITS(1) [],
        M1 OFFSET(1) NUMBITS(1) [],
        M2 OFFSET(2) NUMBITS(1) [],
        M3 OFFSET(3) NUMBITS(1) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => CS: ReadWrite<u32, CS::Register>),
        (0x04 => CLO: ReadOnly<u32>),
        (0x08 => CHI: ReadOnly<u32>),
        (0x0c => C0: ReadWrite<u32>),
        (0x10 => C1: ReadWrite<u32>),
        (0x14 => C2: ReadWrite<u32>),
        (0x18 => C3: ReadWrite<u32>),
        (0x1c => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

/// Called from interrupt context on every tick.
pub type PeriodicHandler = fn();

pub struct SystemTimer {
    registers: Registers,
    periodic: NullLock<Option<PeriodicHandler>>,
}

impl SystemTimer {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// - The user must ensure to provide the correct `base_addr`.
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self {
            registers: Registers::new(base_addr),
            periodic: NullLock::new(None),
        }
    }

    /// Low 32 bits of the microsecond counter.
    pub fn now_us(&self) -> u32 {
        arch::barrier::dmb();
        let now = self.registers.CLO.get();
        arch::barrier::dmb();
        now
    }

    /// Busy-wait for `us` microseconds, correct across counter wrap.
    pub fn delay_us(&self, us: u32) {
        let start = self.now_us();
        while self.now_us().wrapping_sub(start) < us {
            arch::cpu::spin_hint();
        }
    }

    pub fn delay_ms(&self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }

    /// Handler to run on every tick, replaces the previous one.
    pub fn register_periodic_handler(&self, handler: PeriodicHandler) {
        self.periodic.lock(|periodic| *periodic = Some(handler));
    }

    /// Arm compare channel 1 for the first tick. The caller connects the timer to
    /// [`irq::TIMER1`](super::interrupt::irq::TIMER1).
    pub fn start_ticks(&self) {
        let first = self.now_us().wrapping_add(TICK_INTERVAL_US);
        self.registers.C1.set(first);
    }

    /// Next deadline after `previous`. A deadline already in the past is replaced by one a
    /// full interval from `now`, so a late tick never makes the timer wait a whole wrap.
    fn next_deadline(previous: u32, now: u32) -> u32 {
        let next = previous.wrapping_add(TICK_INTERVAL_US);
        if (next.wrapping_sub(now) as i32) <= 0 {
            now.wrapping_add(TICK_INTERVAL_US)
        } else {
            next
        }
    }

    fn tick(&self) {
        let next = Self::next_deadline(self.registers.C1.get(), self.now_us());
        self.registers.C1.set(next);
        self.registers.CS.write(CS::M1::SET);

        if let Some(handler) = self.periodic.lock(|periodic| *periodic) {
            handler();
        }
    }
}

impl IrqHandler for SystemTimer {
    fn handle(&self) -> IrqReturn {
        if !self.registers.CS.is_set(CS::M1) {
            return IrqReturn::None;
        }
        self.tick();
        IrqReturn::Handled
    }
}

impl Clock for SystemTimer {
    fn now_us(&self) -> u32 {
        SystemTimer::now_us(self)
    }
}
