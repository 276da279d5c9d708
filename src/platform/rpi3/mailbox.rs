/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 *
 * Based on https://github.com/rust-embedded/rust-raspi3-tutorial/blob/master/04_mailboxes/src/mbox.rs
 * by Andre Richter of Tock OS.
 */

//! Broadcom property mailbox between the ARM core and the VideoCore firmware.
//!
//! Only the tags the emulation layer needs are wired up. The buffer lives in coherent
//! memory, so the firmware sees the request without cache maintenance.

use {
    crate::{arch, platform::MMIODerefWrapper},
    core::{
        result::Result as CoreResult,
        sync::atomic::{compiler_fence, Ordering},
    },
    snafu::Snafu,
    tock_registers::{
        interfaces::{Readable, Writeable},
        register_bitfields, register_structs,
        registers::{ReadOnly, WriteOnly},
    },
};

/// Lowest 4-bits are channel ID.
const CHANNEL_MASK: u32 = 0xf;

/// Polls of the status register before giving up.
const MAILBOX_TIMEOUT_POLLS: u32 = 1 << 25;

register_bitfields! {
    u32,

    STATUS [
        /* Bit 31 set in status register if the write mailbox is full */
        FULL  OFFSET(31) NUMBITS(1) [],
        /* Bit 30 set in status register if the read mailbox is empty */
        EMPTY OFFSET(30) NUMBITS(1) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => READ: ReadOnly<u32>), // Mailbox0 read for ARM
        (0x04 => __reserved_1),
        (0x18 => STATUS: ReadOnly<u32, STATUS::Register>),
        (0x1c => __reserved_2),
        (0x20 => WRITE: WriteOnly<u32>), // Mailbox1 write for ARM
        (0x24 => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

#[derive(Snafu, Debug, PartialEq, Eq)]
pub enum MailboxError {
    #[snafu(display("firmware could not parse the request buffer"))]
    Response,
    #[snafu(display("unexpected mailbox response code {:#x}", code))]
    Unknown { code: u32 },
    #[snafu(display("tag {:#x} was not answered", tag))]
    TagNotAnswered { tag: u32 },
    #[snafu(display("timed out waiting for the mailbox"))]
    Timeout,
}

pub type Result<T> = CoreResult<T, MailboxError>;

/*
 * Source for channels 8 and 9: https://github.com/raspberrypi/firmware/wiki/Mailboxes
 */
#[allow(non_upper_case_globals)]
pub mod channel {
    pub const VChiq: u32 = 3;
    pub const PropertyTagsArmToVc: u32 = 8;
}

// Single code indicating request
pub const REQUEST: u32 = 0;

// Possible responses
pub mod response {
    pub const SUCCESS: u32 = 0x8000_0000;
    pub const ERROR: u32 = 0x8000_0001; // error parsing request buffer (partial response)
    /// Set by the VC in val_len of every tag it answered.
    pub const VAL_LEN_FLAG: u32 = 0x8000_0000;
}

#[allow(non_upper_case_globals)]
pub mod tag {
    /// Hand the VCHIQ slot memory bus address to the firmware.
    pub const VchiqInit: u32 = 0x0004_8010;
    pub const End: u32 = 0;
}

/// Word storage for a mailbox request. The address must be 16-byte aligned,
/// the low 4 bits of what is written to the mailbox carry the channel.
pub trait MailboxStorage {
    fn as_ref(&self) -> &[u32];
    fn as_mut(&mut self) -> &mut [u32];
    fn as_ptr(&self) -> *const u32;
}

#[repr(align(16))]
pub struct LocalMailboxStorage<const N_SLOTS: usize> {
    pub storage: [u32; N_SLOTS],
}

impl<const N_SLOTS: usize> LocalMailboxStorage<N_SLOTS> {
    pub const fn new() -> Self {
        Self {
            storage: [0u32; N_SLOTS],
        }
    }
}

impl<const N_SLOTS: usize> Default for LocalMailboxStorage<N_SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N_SLOTS: usize> MailboxStorage for LocalMailboxStorage<N_SLOTS> {
    fn as_ref(&self) -> &[u32] {
        &self.storage
    }

    fn as_mut(&mut self) -> &mut [u32] {
        &mut self.storage
    }

    fn as_ptr(&self) -> *const u32 {
        self.storage.as_ptr()
    }
}

/// Request buffer at a fixed page of coherent memory.
pub struct CoherentMailboxStorage<const N_SLOTS: usize> {
    storage: *mut u32,
}

impl<const N_SLOTS: usize> CoherentMailboxStorage<N_SLOTS> {
    /// # Safety
    ///
    /// `address` must be 16-byte aligned coherent memory of at least `N_SLOTS` words,
    /// not used by anything else while the mailbox exists.
    pub const unsafe fn new(address: usize) -> Self {
        Self {
            storage: address as *mut u32,
        }
    }
}

impl<const N_SLOTS: usize> MailboxStorage for CoherentMailboxStorage<N_SLOTS> {
    fn as_ref(&self) -> &[u32] {
        unsafe { core::slice::from_raw_parts(self.storage, N_SLOTS) }
    }

    fn as_mut(&mut self) -> &mut [u32] {
        unsafe { core::slice::from_raw_parts_mut(self.storage, N_SLOTS) }
    }

    fn as_ptr(&self) -> *const u32 {
        self.storage
    }
}

/// Mailbox with a request being built.
pub struct Mailbox<const N_SLOTS: usize, Storage> {
    registers: Registers,
    buffer: Storage,
}

/// Mailbox that is ready to be called.
/// This prevents invalid use of the mailbox until it is fully prepared.
pub struct PreparedMailbox<const N_SLOTS: usize, Storage>(Mailbox<N_SLOTS, Storage>);

impl<const N_SLOTS: usize, Storage: MailboxStorage> Mailbox<N_SLOTS, Storage> {
    /// # Safety
    ///
    /// Caller is responsible for picking the correct MMIO register base address.
    pub const unsafe fn new(base_addr: usize, buffer: Storage) -> Self {
        Mailbox {
            registers: Registers::new(base_addr),
            buffer,
        }
    }

    /// Start mailbox request.
    ///
    /// @returns index of the next available slot.
    #[inline]
    pub fn request(&mut self) -> usize {
        self.buffer.as_mut()[1] = REQUEST;
        2
    }

    /// Mark mailbox payload as completed.
    /// Consumes the Mailbox and returns a PreparedMailbox that can be called.
    #[inline]
    pub fn end(mut self, index: usize) -> PreparedMailbox<N_SLOTS, Storage> {
        self.buffer.as_mut()[index] = tag::End;
        self.buffer.as_mut()[0] = (index as u32 + 1) * 4;
        PreparedMailbox(self)
    }

    /// Ask the firmware to start VCHIQ with slot memory at `channel_base` (bus address).
    /// The firmware answers 0 on success.
    ///
    /// @returns index of the next available slot.
    #[inline]
    pub fn vchiq_init(&mut self, index: usize, channel_base: u32) -> usize {
        let buf = self.buffer.as_mut();
        buf[index] = tag::VchiqInit;
        buf[index + 1] = 4; // Buffer size   // val buf size
        buf[index + 2] = 4; // Request size  // val size
        buf[index + 3] = channel_base;
        index + 4
    }

    fn do_write(&self, channel: u32) -> Result<()> {
        let buf_ptr = self.buffer.as_ptr() as usize as u32;
        let mut count: u32 = 0;

        debug!("Mailbox::write {:#08x}/{:#x}", buf_ptr, channel);

        // All stores to the buffer must land before the GPU is signaled.
        compiler_fence(Ordering::Release);

        while self.registers.STATUS.is_set(STATUS::FULL) {
            count += 1;
            if count > MAILBOX_TIMEOUT_POLLS {
                return Err(MailboxError::Timeout);
            }
        }
        arch::barrier::dmb();
        self.registers
            .WRITE
            .set((buf_ptr & !CHANNEL_MASK) | (channel & CHANNEL_MASK));
        Ok(())
    }

    /// # Safety
    ///
    /// Buffer will be mutated by the hardware before read operation is completed.
    unsafe fn do_read(&self, channel: u32, expected: u32) -> Result<()> {
        loop {
            let mut count: u32 = 0;
            while self.registers.STATUS.is_set(STATUS::EMPTY) {
                count += 1;
                if count > MAILBOX_TIMEOUT_POLLS {
                    warn!("timed out waiting for mailbox response");
                    return Err(MailboxError::Timeout);
                }
            }

            arch::barrier::dmb();
            let data: u32 = self.registers.READ.get();
            arch::barrier::dmb();

            // Responses to somebody else's messages are skipped.
            if ((data & CHANNEL_MASK) == channel) && ((data & !CHANNEL_MASK) == expected) {
                return match self.buffer.as_ref()[1] {
                    response::SUCCESS => Ok(()),
                    response::ERROR => Err(MailboxError::Response),
                    code => Err(MailboxError::Unknown { code }),
                };
            }
        }
    }
}

impl<const N_SLOTS: usize, Storage: MailboxStorage> PreparedMailbox<N_SLOTS, Storage> {
    /// Send the request and wait for the firmware to answer it.
    pub fn call(&self, channel: u32) -> Result<()> {
        self.0.do_write(channel)?;
        let expected = self.0.buffer.as_ptr() as usize as u32 & !CHANNEL_MASK;
        unsafe { self.0.do_read(channel, expected) }
    }

    pub fn value_at(&self, index: usize) -> u32 {
        self.0.buffer.as_ref()[index]
    }

    /// First response word of the tag starting at `index`.
    pub fn tag_value(&self, index: usize) -> Result<u32> {
        let buf = self.0.buffer.as_ref();
        if buf[index + 2] & response::VAL_LEN_FLAG == 0 {
            return Err(MailboxError::TagNotAnswered { tag: buf[index] });
        }
        Ok(buf[index + 3])
    }
}

/// Firmware property calls the VCHIQ platform code makes.
pub trait PropertyTags {
    /// Pass the slot memory bus address to the firmware, returns its status word.
    fn vchiq_init(&self, channel_base: u32) -> Result<u32>;
}

/// Property interface over the hardware mailbox with its buffer in coherent memory.
pub struct Firmware {
    mailbox_base: usize,
    buffer_address: usize,
}

impl Firmware {
    /// # Safety
    ///
    /// `mailbox_base` must be the mailbox registers and `buffer_address` a coherent,
    /// 16-byte aligned page owned by the firmware interface.
    pub const unsafe fn new(mailbox_base: usize, buffer_address: usize) -> Self {
        Self {
            mailbox_base,
            buffer_address,
        }
    }
}

impl PropertyTags for Firmware {
    fn vchiq_init(&self, channel_base: u32) -> Result<u32> {
        let mut mailbox = unsafe {
            Mailbox::<8, _>::new(
                self.mailbox_base,
                CoherentMailboxStorage::<8>::new(self.buffer_address),
            )
        };
        let index = mailbox.request();
        let next = mailbox.vchiq_init(index, channel_base);
        let mailbox = mailbox.end(next);
        mailbox.call(channel::PropertyTagsArmToVc)?;
        mailbox.tag_value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Validate the buffer is properly terminated when call()ed -- this invariant must be
    // maintained by the end() fn.
    #[test]
    fn vchiq_init_request_layout() {
        let mut mailbox =
            unsafe { Mailbox::<8, _>::new(0, LocalMailboxStorage::<8>::new()) };
        let index = mailbox.request();
        let index = mailbox.vchiq_init(index, 0xc1c8_0000);
        let mailbox = mailbox.end(index);

        assert_eq!(mailbox.value_at(0) as usize, (index + 1) * 4);
        assert_eq!(mailbox.value_at(1), REQUEST);
        assert_eq!(mailbox.value_at(2), tag::VchiqInit);
        assert_eq!(mailbox.value_at(3), 4);
        assert_eq!(mailbox.value_at(4), 4);
        assert_eq!(mailbox.value_at(5), 0xc1c8_0000);
        assert_eq!(mailbox.value_at(6), tag::End);
    }

    #[test]
    fn answered_tag_yields_value() {
        let mut storage = LocalMailboxStorage::<8>::new();
        storage.storage[2] = tag::VchiqInit;
        storage.storage[4] = response::VAL_LEN_FLAG | 4;
        storage.storage[5] = 0;
        let mailbox = unsafe { Mailbox::<8, _>::new(0, storage) }.end(6);
        assert_eq!(mailbox.tag_value(2), Ok(0));
    }

    #[test]
    fn unanswered_tag_is_an_error() {
        let mut mailbox =
            unsafe { Mailbox::<8, _>::new(0, LocalMailboxStorage::<8>::new()) };
        let index = mailbox.request();
        let next = mailbox.vchiq_init(index, 0x1234_0000);
        let mailbox = mailbox.end(next);
        assert_eq!(
            mailbox.tag_value(index),
            Err(MailboxError::TagNotAnswered {
                tag: tag::VchiqInit
            })
        );
    }
}
