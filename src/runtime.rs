/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Process-wide state of the emulation layer: the scheduler and the kmalloc pool.

use {
    crate::{
        linux::TaskTable,
        mm::{self, AllocError, BumpAllocator},
        sched::Scheduler,
        sync::{interface::Mutex, NullLock},
    },
    core::{alloc::Layout, ptr::NonNull},
};

/// Size of the kmalloc pool the kernel reserves for the driver.
pub const HEAP_SIZE: usize = 32 * 1024 * 1024;

/// Everything the emulated kernel ABI needs, created once by the embedding kernel.
///
/// ```ignore
/// static mut POOL: [u8; HEAP_SIZE] = [0; HEAP_SIZE];
/// static RUNTIME: Runtime = Runtime::new(pool_start, pool_start + HEAP_SIZE);
/// linuxemu::linux::install(&RUNTIME)?;
/// ```
pub struct Runtime {
    scheduler: Scheduler,
    tasks: TaskTable,
    heap: NullLock<BumpAllocator>,
}

impl Runtime {
    pub const fn new(heap_start: usize, heap_end: usize) -> Self {
        Self {
            scheduler: Scheduler::new(),
            tasks: TaskTable::new(),
            heap: NullLock::new(BumpAllocator::new(heap_start, heap_end, "kmalloc")),
        }
    }

    pub fn scheduler(&'static self) -> &'static Scheduler {
        &self.scheduler
    }

    /// `task_struct` entries handed to the driver.
    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    /// `kmalloc()`: a block of at least `size` bytes.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.heap
            .lock(|heap| heap.allocate(Self::layout(heap, size)?))
    }

    /// `kzalloc()`: a cleared block of at least `size` bytes.
    pub fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.heap
            .lock(|heap| heap.allocate_zeroed(Self::layout(heap, size)?))
    }

    /// `kfree()`: the pool never reclaims, this only exists for symmetry.
    pub fn free(&self, block: NonNull<u8>) {
        self.heap
            .lock(|heap| unsafe { heap.deallocate(block, Layout::new::<u128>()) })
    }

    /// Bytes left in the kmalloc pool.
    pub fn heap_remaining(&self) -> usize {
        self.heap.lock(|heap| heap.remaining())
    }

    pub(crate) fn report(&self) {
        let (size, unit) = mm::size_human_readable_ceil(self.heap_remaining());
        info!("kmalloc pool: {} {} available", size, unit);
    }

    fn layout(heap: &BumpAllocator, size: usize) -> Result<Layout, AllocError> {
        // Zero-sized requests still get a distinct address.
        heap.layout(size.max(1), mm::KMALLOC_MIN_ALIGN)
    }
}
