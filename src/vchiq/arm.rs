/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! ARM side of VCHIQ on the BCM2835, with the VideoCore as master.

use {
    super::{
        device::{PlatformDevice, ResourceFlags},
        fragments::FragmentPool,
        pagelist::{AddressTranslation, Direction, PageListBuilder},
        Bulk, BulkDir, MemHandle, RemoteEvent, VchiqCore, VchiqStatus, MAX_FRAGMENTS,
        TOTAL_SLOTS, VCHIQ_SLOT_SIZE,
    },
    crate::{
        arch::{self, cache::CACHE_LINE_SIZE},
        linux::{EBUSY, EINVAL, ENODEV, ENOMEM, ENXIO},
        mm::{self, PAGE_SIZE},
        platform::{
            rpi3::{
                interrupt::{InterruptController, IrqDescriptor, IrqError, IrqHandler, IrqReturn},
                mailbox::{MailboxError, PropertyTags},
            },
            MMIODerefWrapper,
        },
        runtime::Runtime,
    },
    core::{
        ffi::c_int,
        fmt,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    snafu::{ResultExt, Snafu},
    tock_registers::{
        interfaces::{Readable, Writeable},
        register_structs,
        registers::{ReadOnly, WriteOnly},
    },
};

register_structs! {
    #[allow(non_snake_case)]
    DoorbellBlock {
        (0x00 => BELL0: ReadOnly<u32>), // Read clears
        (0x04 => __reserved_1),
        (0x08 => BELL2: WriteOnly<u32>), // Any write rings the VideoCore
        (0x0c => @END),
    }
}

type Doorbell = MMIODerefWrapper<DoorbellBlock>;

/// Set in `BELL0` when the VideoCore rang us.
const BELL0_RUNG: u32 = 0x4;

#[derive(Debug, Snafu)]
pub enum PlatformError {
    #[snafu(display("could not allocate {} bytes of DMA memory", size))]
    NoDmaMemory { size: usize },
    #[snafu(display("VCHIQ core rejected the slot memory"))]
    SlotInit,
    #[snafu(display("VCHIQ core state initialisation failed"))]
    StateInit,
    #[snafu(display("doorbell register window missing"))]
    NoRegisters,
    #[snafu(display("failed to get IRQ"))]
    NoIrq,
    #[snafu(display("failed to register irq={}", irq))]
    IrqRequest { irq: usize, source: IrqError },
    #[snafu(display("firmware property call failed"))]
    Firmware { source: MailboxError },
    #[snafu(display("failed to set channelbase, firmware answered {:#x}", status))]
    ChannelBase { status: u32 },
}

impl PlatformError {
    /// Negative errno as a probe function returns it.
    pub fn errno(&self) -> c_int {
        match self {
            PlatformError::NoDmaMemory { .. } => -ENOMEM,
            PlatformError::SlotInit | PlatformError::StateInit => -EINVAL,
            PlatformError::NoRegisters | PlatformError::Firmware { .. } => -ENODEV,
            PlatformError::NoIrq | PlatformError::ChannelBase { .. } => -ENXIO,
            PlatformError::IrqRequest { .. } => -EBUSY,
        }
    }
}

/// Platform state for one VCHIQ instance.
pub struct VchiqArm<C: VchiqCore + 'static> {
    core: &'static C,
    firmware: &'static (dyn PropertyTags + Sync),
    runtime: &'static Runtime,
    translation: &'static (dyn AddressTranslation + Sync),
    fragments: FragmentPool,
    doorbell: AtomicUsize,
    inited: AtomicBool,
    arm_state: C::ArmState,
}

impl<C: VchiqCore + 'static> VchiqArm<C> {
    pub const fn new(
        core: &'static C,
        firmware: &'static (dyn PropertyTags + Sync),
        runtime: &'static Runtime,
        translation: &'static (dyn AddressTranslation + Sync),
        arm_state: C::ArmState,
    ) -> Self {
        Self {
            core,
            firmware,
            runtime,
            translation,
            fragments: FragmentPool::new(),
            doorbell: AtomicUsize::new(0),
            inited: AtomicBool::new(false),
            arm_state,
        }
    }

    /// Bring the platform up: slot and fragment memory, core state, doorbell interrupt
    /// and finally the slot address handed to the firmware.
    pub fn platform_init(
        &'static self,
        device: &PlatformDevice,
        interrupts: &InterruptController,
    ) -> Result<(), PlatformError> {
        let fragment_size = 2 * CACHE_LINE_SIZE;
        let slot_mem_size = mm::page_align(TOTAL_SLOTS * VCHIQ_SLOT_SIZE);
        let frag_mem_size = mm::page_align(fragment_size * MAX_FRAGMENTS);
        let size = slot_mem_size + frag_mem_size;

        let (slot_mem, slot_phys) = match device.alloc_coherent(size) {
            Some(memory) => memory,
            None => {
                error!("could not allocate DMA memory");
                return Err(PlatformError::NoDmaMemory { size });
            }
        };
        if !mm::is_aligned(slot_mem.as_ptr() as usize, PAGE_SIZE) {
            warn!("slot memory at {:p} is not page aligned", slot_mem);
        }

        let platform_data = self
            .core
            .init_slots(slot_mem, slot_mem_size)
            .ok_or(PlatformError::SlotInit)?;
        unsafe {
            let data = platform_data.as_ptr();
            (*data).fragments_offset = slot_phys.wrapping_add(slot_mem_size as u32);
            (*data).fragments_count = MAX_FRAGMENTS as u32;
        }
        self.fragments.init(
            slot_mem.as_ptr() as usize + slot_mem_size,
            MAX_FRAGMENTS,
            CACHE_LINE_SIZE,
        );

        if self.core.init_state() != VchiqStatus::Success {
            return Err(PlatformError::StateInit);
        }

        let registers = device
            .resource(ResourceFlags::MEM, 0)
            .ok_or(PlatformError::NoRegisters)?;
        self.doorbell.store(registers.start, Ordering::Release);

        let irq = match device.irq(0) {
            Some(irq) if irq > 0 => irq,
            _ => {
                error!("failed to get IRQ");
                return Err(PlatformError::NoIrq);
            }
        };
        interrupts
            .connect(
                irq,
                IrqDescriptor {
                    name: "VCHIQ doorbell",
                    handler: self,
                },
            )
            .context(IrqRequestSnafu { irq })?;

        // Send the base address of the slots to VideoCore
        let status = self.firmware.vchiq_init(slot_phys).context(FirmwareSnafu)?;
        if status != 0 {
            error!("failed to set channelbase");
            return Err(PlatformError::ChannelBase { status });
        }

        info!(
            "vchiq_init - done (slots {:p}, phys {:#010x})",
            slot_mem, slot_phys
        );

        self.core.call_connected_callbacks();
        Ok(())
    }

    /// Called by the core while it initialises its state.
    pub fn init_platform_state(&self) -> VchiqStatus {
        self.inited.store(true, Ordering::Release);
        let status = self.core.init_arm_state(&self.arm_state);
        if status != VchiqStatus::Success {
            self.inited.store(false, Ordering::Release);
        }
        status
    }

    /// ARM side state. Asking before [`init_platform_state`](Self::init_platform_state)
    /// succeeded is a bug.
    pub fn arm_state(&self) -> &C::ArmState {
        bug_on!(!self.inited.load(Ordering::Acquire));
        &self.arm_state
    }

    fn doorbell(&self) -> Option<Doorbell> {
        match self.doorbell.load(Ordering::Acquire) {
            0 => None,
            base => Some(unsafe { Doorbell::new(base) }),
        }
    }

    /// Tell the VideoCore about `event`, ringing its doorbell if it waits for it.
    pub fn remote_event_signal(&self, event: &RemoteEvent) {
        arch::barrier::wmb();

        event.fired.store(1, Ordering::Release);

        arch::barrier::dsb();

        if event.is_armed() {
            if let Some(doorbell) = self.doorbell() {
                doorbell.BELL2.set(0);
            }
        }
    }

    fn pagelists(&self) -> PageListBuilder<'_> {
        PageListBuilder::new(
            self.runtime,
            &self.fragments,
            self.translation,
            self.runtime.scheduler(),
        )
    }

    /// Describe `size` bytes at `buffer` to the VideoCore for `bulk`.
    pub fn prepare_bulk_data(
        &self,
        bulk: &mut Bulk,
        handle: MemHandle,
        buffer: usize,
        size: usize,
        dir: BulkDir,
    ) -> VchiqStatus {
        if handle != MemHandle::INVALID {
            warn!("bulk memory handle {:?} ignored", handle);
        }

        let direction = match dir {
            BulkDir::Receive => Direction::Read,
            BulkDir::Transmit => Direction::Write,
        };
        let pagelist = match self.pagelists().create(buffer, size, direction) {
            Ok(pagelist) => pagelist,
            Err(err) => {
                warn!("create_pagelist failed: {}", err);
                return VchiqStatus::Error;
            }
        };

        bulk.handle = handle;
        bulk.data = pagelist.bus_address();
        // The page list lives in remote_data, which the slave side never uses.
        bulk.remote_data = Some(pagelist);

        VchiqStatus::Success
    }

    /// Release the page list of a finished bulk, copying back received fragments.
    pub fn complete_bulk(&self, bulk: &mut Bulk) {
        if let Some(pagelist) = bulk.remote_data.take() {
            self.pagelists().free(pagelist, bulk.actual);
        }
    }

    /// Only the master side transfers bulks.
    pub fn transfer_bulk(&self, _bulk: &mut Bulk) -> ! {
        bug!()
    }

    pub fn fragments(&self) -> &FragmentPool {
        &self.fragments
    }

    pub fn dump_platform_state(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "  Platform: 2835 (VC master)")
    }

    pub fn dump_platform_use_state(&self) {
        info!("Suspend timer not in use");
    }

    /// Suspend is not supported.
    pub fn suspend(&self) -> VchiqStatus {
        VchiqStatus::Error
    }

    pub fn resume(&self) -> VchiqStatus {
        VchiqStatus::Success
    }

    pub fn paused(&self) {}

    pub fn resumed(&self) {}

    /// Without autosuspend the VideoCore is always wanted.
    pub fn videocore_wanted(&self) -> bool {
        true
    }

    pub fn use_suspend_timer(&self) -> bool {
        false
    }

    pub fn handle_timeout(&self) {}
}

impl<C: VchiqCore + 'static> IrqHandler for VchiqArm<C> {
    fn handle(&self) -> IrqReturn {
        let doorbell = match self.doorbell() {
            Some(doorbell) => doorbell,
            None => return IrqReturn::None,
        };

        // Read (and clear) the doorbell
        let status = doorbell.BELL0.get();

        if status & BELL0_RUNG != 0 {
            self.core.poll_all_remote_events();
            IrqReturn::Handled
        } else {
            IrqReturn::None
        }
    }
}

/// There is no user space, every pointer is a kernel pointer.
pub fn copy_from_user(dst: &mut [u8], src: &[u8]) -> c_int {
    let count = dst.len().min(src.len());
    dst[..count].copy_from_slice(&src[..count]);
    0
}
