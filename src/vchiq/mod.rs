/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! BCM2835 platform layer of the VCHIQ message queue.
//!
//! The protocol engine (slots, messages, services) lives outside this crate and is
//! reached through [`VchiqCore`]. This module provides what that engine needs from the
//! platform: slot memory and the firmware handshake, the doorbell interrupt, remote
//! event signalling and page lists for bulk transfers.

pub mod arm;
pub mod device;
pub mod fragments;
pub mod pagelist;

pub use {
    arm::{PlatformError, VchiqArm},
    device::{vchiq_device, PlatformDevice, Resource, ResourceFlags},
    fragments::FragmentPool,
    pagelist::{AddressTranslation, Direction, DirectMap, PageList, PageListBuilder, PageRun},
};

use core::{
    ptr::NonNull,
    sync::atomic::{AtomicI32, Ordering},
};

/// Size of one message slot.
pub const VCHIQ_SLOT_SIZE: usize = 4096;
/// Slots taken by slot zero itself.
pub const VCHIQ_SLOT_ZERO_SLOTS: usize = 1;
/// Bulk transfers that can be in flight per direction.
pub const VCHIQ_NUM_CURRENT_BULKS: usize = 32;
/// Slot zero plus 32 slots for each side.
pub const TOTAL_SLOTS: usize = VCHIQ_SLOT_ZERO_SLOTS + 2 * 32;
/// Fragment buffers shared with the VideoCore.
pub const MAX_FRAGMENTS: usize = VCHIQ_NUM_CURRENT_BULKS * 2;

/// Result code shared with the protocol engine.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VchiqStatus {
    Error = -1,
    Success = 0,
    Retry = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BulkDir {
    /// ARM memory to the VideoCore.
    Transmit,
    /// VideoCore into ARM memory.
    Receive,
}

/// Memory handle of a bulk. Only [`MemHandle::INVALID`] is supported on this platform,
/// the data is always described by a page list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemHandle(pub u32);

impl MemHandle {
    pub const INVALID: MemHandle = MemHandle(0);
}

/// Platform words of slot zero, read by the VideoCore.
#[repr(C)]
#[derive(Debug, Default)]
pub struct PlatformData {
    /// Bus address of the fragment buffers.
    pub fragments_offset: u32,
    pub fragments_count: u32,
}

/// Event flags living in slot memory, shared with the VideoCore.
#[repr(C)]
#[derive(Debug, Default)]
pub struct RemoteEvent {
    pub armed: AtomicI32,
    pub fired: AtomicI32,
    /// Index of the local event object, owned by the protocol engine.
    pub event: u32,
}

impl RemoteEvent {
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire) != 0
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire) != 0
    }
}

/// One bulk transfer as tracked by the protocol engine.
#[derive(Debug)]
pub struct Bulk {
    pub handle: MemHandle,
    /// Bus address of the page list handed to the VideoCore.
    pub data: u32,
    pub size: usize,
    /// Bytes actually transferred, negative when the transfer was aborted.
    pub actual: i32,
    pub dir: BulkDir,
    /// Page list backing `data`, owned by the platform until completion.
    pub remote_data: Option<PageList>,
}

impl Bulk {
    pub fn new(dir: BulkDir, size: usize) -> Self {
        Self {
            handle: MemHandle::INVALID,
            data: 0,
            size,
            actual: 0,
            dir,
            remote_data: None,
        }
    }
}

/// Protocol engine entry points the platform layer calls into.
pub trait VchiqCore: Sync {
    /// ARM side state, stored by the platform and set up by the engine.
    type ArmState: Sync;

    /// Lay out slot zero and the slots in `size` bytes at `mem`. Returns the platform
    /// words of slot zero, or `None` if the memory is unusable.
    fn init_slots(&self, mem: NonNull<u8>, size: usize) -> Option<NonNull<PlatformData>>;

    /// Initialise the engine state on top of the slots.
    fn init_state(&self) -> VchiqStatus;

    /// Initialise the ARM side state, called back through
    /// [`VchiqArm::init_platform_state`].
    fn init_arm_state(&self, state: &Self::ArmState) -> VchiqStatus;

    /// The doorbell rang: check every remote event.
    fn poll_all_remote_events(&self);

    /// Run callbacks waiting for the connection to come up.
    fn call_connected_callbacks(&self);
}
