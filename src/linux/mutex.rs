/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel `struct mutex`.

use {
    super::bug::assert_boot_core,
    crate::sched::Yield,
    core::sync::atomic::{AtomicU32, Ordering},
};

/// Binary lock word, 0 when free. Waiters yield until it reads 0.
///
/// No owner is recorded, so unlocking from another task is not detected.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Mutex {
    lock: AtomicU32,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            lock: AtomicU32::new(0),
        }
    }

    pub fn lock(&self, sched: &(impl Yield + ?Sized)) {
        assert_boot_core();
        while self.lock.load(Ordering::Acquire) != 0 {
            sched.yield_now();
        }
        self.lock.store(1, Ordering::Release);
    }

    pub fn unlock(&self) {
        assert_boot_core();
        self.lock.store(0, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Acquire) != 0
    }
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn mutex_init(lock: &Mutex) {
    lock.unlock();
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn mutex_lock(lock: &Mutex) {
    lock.lock(super::scheduler());
}

/// Always acquires, signals cannot interrupt an emulated thread.
#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn mutex_lock_interruptible(lock: &Mutex) -> i32 {
    lock.lock(super::scheduler());
    0
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn mutex_unlock(lock: &Mutex) {
    lock.unlock();
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sched::{Scheduler, SpinYield},
        core::ffi::{c_int, c_void},
    };

    const ROUNDS: u32 = 25;

    struct Shared {
        sched: &'static Scheduler,
        mutex: Mutex,
        counter: AtomicU32,
        locked: bool,
        inside: AtomicU32,
    }

    extern "C" fn increment(arg: *mut c_void) -> c_int {
        let shared = unsafe { &*(arg as *const Shared) };
        let me = shared.sched.current().get();
        for round in 0..ROUNDS {
            if shared.locked {
                shared.mutex.lock(shared.sched);
            }
            shared.inside.fetch_add(1, Ordering::SeqCst);
            if shared.locked {
                assert_eq!(shared.inside.load(Ordering::SeqCst), 1);
            }
            // Non-atomic read-modify-write with a switch point in the middle.
            let value = shared.counter.load(Ordering::SeqCst);
            for _ in 0..(me + round) % 3 {
                shared.sched.yield_now();
            }
            shared.counter.store(value + 1, Ordering::SeqCst);
            shared.inside.fetch_sub(1, Ordering::SeqCst);
            if shared.locked {
                shared.mutex.unlock();
            }
            shared.sched.yield_now();
        }
        0
    }

    fn run_two(locked: bool) -> u32 {
        let sched: &'static Scheduler = Box::leak(Box::new(Scheduler::new()));
        let shared: &'static Shared = Box::leak(Box::new(Shared {
            sched,
            mutex: Mutex::new(),
            counter: AtomicU32::new(0),
            locked,
            inside: AtomicU32::new(0),
        }));
        let arg = shared as *const Shared as *mut c_void;
        sched.create_thread(increment, arg);
        sched.create_thread(increment, arg);
        sched.run();
        assert!(!shared.mutex.is_locked());
        shared.counter.load(Ordering::SeqCst)
    }

    #[test]
    fn mutex_serializes_read_modify_write() {
        assert_eq!(run_two(true), 2 * ROUNDS);
    }

    #[test]
    fn updates_are_lost_without_the_mutex() {
        assert!(run_two(false) < 2 * ROUNDS);
    }

    #[test]
    fn lock_and_unlock_flip_the_word() {
        let mutex = Mutex::new();
        mutex.lock(&SpinYield);
        assert!(mutex.is_locked());
        mutex.unlock();
        assert!(!mutex.is_locked());
    }
}
