/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel counting `struct semaphore`.

use {
    super::bug::assert_boot_core,
    crate::sched::Yield,
    core::{
        ffi::c_int,
        sync::atomic::{AtomicU32, Ordering},
    },
};

#[repr(C)]
#[derive(Debug, Default)]
pub struct Semaphore {
    count: AtomicU32,
}

impl Semaphore {
    pub const fn new(count: u32) -> Self {
        Self {
            count: AtomicU32::new(count),
        }
    }

    /// Take one unit, yielding while none is available.
    pub fn down(&self, sched: &(impl Yield + ?Sized)) {
        assert_boot_core();
        while self.count.load(Ordering::Acquire) == 0 {
            sched.yield_now();
        }
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Take one unit if available. Returns `true` on success.
    pub fn try_down(&self) -> bool {
        assert_boot_core();
        if self.count.load(Ordering::Acquire) == 0 {
            return false;
        }
        self.count.fetch_sub(1, Ordering::AcqRel);
        true
    }

    pub fn up(&self) {
        assert_boot_core();
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Set the count without waking anybody, `sema_init()`.
    pub fn reset(&self, count: u32) {
        self.count.store(count, Ordering::Release);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn sema_init(sem: &Semaphore, value: c_int) {
    sem.reset(value.max(0) as u32);
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn down(sem: &Semaphore) {
    sem.down(super::scheduler());
}

/// Never interrupted, always returns 0 after taking a unit.
#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn down_interruptible(sem: &Semaphore) -> c_int {
    sem.down(super::scheduler());
    0
}

/// Returns 0 when a unit was taken and 1 when the count was zero.
#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn down_trylock(sem: &Semaphore) -> c_int {
    if sem.try_down() {
        0
    } else {
        1
    }
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn up(sem: &Semaphore) {
    sem.up();
}
