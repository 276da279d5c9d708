/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! BCM2835 ARM interrupt controller: handler table and three-bank dispatch.
//!
//! Sources 0 to 63 are the GPU peripheral interrupts in `PENDING_1` and `PENDING_2`,
//! sources 64 to 71 are the ARM local ones in the low byte of `BASIC_PENDING`.

use {
    crate::{
        platform::MMIODerefWrapper,
        sync::{interface::Mutex, NullLock},
    },
    bit_field::BitField,
    snafu::Snafu,
    tock_registers::{
        interfaces::{Readable, Writeable},
        register_structs,
        registers::{ReadOnly, ReadWrite, WriteOnly},
    },
};

/// Interrupt sources the controller can raise.
pub const NUM_IRQ_SOURCES: usize = 72;
/// Size of the handler table.
pub const MAX_HANDLERS: usize = 128;

/// Well known source numbers.
pub mod irq {
    /// System timer compare channel 1.
    pub const TIMER1: usize = 1;
    pub const ARM_TIMER: usize = 64;
    pub const ARM_MAILBOX: usize = 65;
    /// VCHIQ doorbell rung by the VideoCore.
    pub const ARM_DOORBELL_0: usize = 66;
    pub const ARM_DOORBELL_1: usize = 67;
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => BASIC_PENDING: ReadOnly<u32>),
        (0x04 => PENDING_1: ReadOnly<u32>),
        (0x08 => PENDING_2: ReadOnly<u32>),
        (0x0c => FIQ_CONTROL: ReadWrite<u32>),
        (0x10 => ENABLE_1: WriteOnly<u32>),
        (0x14 => ENABLE_2: WriteOnly<u32>),
        (0x18 => ENABLE_BASIC: WriteOnly<u32>),
        (0x1c => DISABLE_1: WriteOnly<u32>),
        (0x20 => DISABLE_2: WriteOnly<u32>),
        (0x24 => DISABLE_BASIC: WriteOnly<u32>),
        (0x28 => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

/// Set in `BASIC_PENDING` when `PENDING_1` has a bit set.
const BASIC_PENDING_1: usize = 8;
/// Set in `BASIC_PENDING` when `PENDING_2` has a bit set.
const BASIC_PENDING_2: usize = 9;
const BASIC_LOCAL_MASK: u32 = 0xff;

/// What a handler did with the interrupt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IrqReturn {
    /// Not ours.
    None,
    Handled,
}

/// Implemented by drivers that service an interrupt source.
pub trait IrqHandler {
    fn handle(&self) -> IrqReturn;
}

#[derive(Copy, Clone)]
pub struct IrqDescriptor {
    /// Descriptive name.
    pub name: &'static str,
    /// Reference to handler trait object.
    pub handler: &'static (dyn IrqHandler + Sync),
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum IrqError {
    #[snafu(display("IRQ {} is out of range", irq))]
    OutOfRange { irq: usize },
    #[snafu(display("IRQ {} already has a handler", irq))]
    AlreadyRegistered { irq: usize },
}

type HandlerTable = [Option<IrqDescriptor>; MAX_HANDLERS];

pub struct InterruptController {
    registers: Registers,
    handlers: NullLock<HandlerTable>,
}

impl InterruptController {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// - The user must ensure to provide the correct `base_addr`.
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self {
            registers: Registers::new(base_addr),
            handlers: NullLock::new([None; MAX_HANDLERS]),
        }
    }

    /// Install `descriptor` for `irq` and unmask the source.
    pub fn connect(&self, irq: usize, descriptor: IrqDescriptor) -> Result<(), IrqError> {
        if irq >= MAX_HANDLERS {
            return Err(IrqError::OutOfRange { irq });
        }
        self.handlers.lock(|table| {
            if table[irq].is_some() {
                return Err(IrqError::AlreadyRegistered { irq });
            }
            table[irq] = Some(descriptor);
            Ok(())
        })?;
        self.enable(irq);
        debug!("connected IRQ {} to {}", irq, descriptor.name);
        Ok(())
    }

    /// Mask `irq` and drop its handler.
    pub fn disconnect(&self, irq: usize) {
        if irq >= MAX_HANDLERS {
            return;
        }
        self.disable(irq);
        self.handlers.lock(|table| table[irq] = None);
    }

    /// Writing a 1 sets the corresponding enable bit, all other bits are unaffected.
    pub fn enable(&self, irq: usize) {
        let bit = 1u32 << (irq % 32);
        match irq {
            0..=31 => self.registers.ENABLE_1.set(bit),
            32..=63 => self.registers.ENABLE_2.set(bit),
            64..=71 => self.registers.ENABLE_BASIC.set(bit),
            _ => {}
        }
    }

    pub fn disable(&self, irq: usize) {
        let bit = 1u32 << (irq % 32);
        match irq {
            0..=31 => self.registers.DISABLE_1.set(bit),
            32..=63 => self.registers.DISABLE_2.set(bit),
            64..=71 => self.registers.DISABLE_BASIC.set(bit),
            _ => {}
        }
    }

    /// The source to service next: `PENDING_1` first, then `PENDING_2`, then the ARM
    /// local sources, lowest bit first within a bank.
    pub fn pending(&self) -> Option<usize> {
        let basic = self.registers.BASIC_PENDING.get();

        if basic.get_bit(BASIC_PENDING_1) {
            let pending = self.registers.PENDING_1.get();
            if pending != 0 {
                return Some(pending.trailing_zeros() as usize);
            }
        }
        if basic.get_bit(BASIC_PENDING_2) {
            let pending = self.registers.PENDING_2.get();
            if pending != 0 {
                return Some(32 + pending.trailing_zeros() as usize);
            }
        }
        let local = basic & BASIC_LOCAL_MASK;
        if local != 0 {
            return Some(64 + local.trailing_zeros() as usize);
        }
        None
    }

    /// Service one pending interrupt. Returns the source whose handler ran.
    pub fn dispatch(&self) -> Option<usize> {
        let irq = self.pending()?;
        match self.handlers.lock(|table| table[irq]) {
            Some(descriptor) => {
                if descriptor.handler.handle() == IrqReturn::None {
                    debug!("IRQ {} not claimed by {}", irq, descriptor.name);
                }
                Some(irq)
            }
            None => {
                warn!("no handler for pending IRQ {}", irq);
                None
            }
        }
    }
}
