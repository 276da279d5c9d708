/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel `rwlock_t`.
//!
//! The low 31 bits count readers, the top bit marks a writer. A writer only gets in when
//! there are no readers, and readers keep getting in while no writer holds the lock, so a
//! steady stream of readers can starve a writer.

use {
    super::bug::assert_boot_core,
    crate::sched::Yield,
    core::sync::atomic::{AtomicU32, Ordering},
};

const WRITE_LOCK: u32 = 1 << 31;

#[repr(C)]
#[derive(Debug, Default)]
pub struct RwLock {
    lock: AtomicU32,
}

impl RwLock {
    pub const fn new() -> Self {
        Self {
            lock: AtomicU32::new(0),
        }
    }

    pub fn read_lock(&self, sched: &(impl Yield + ?Sized)) {
        assert_boot_core();
        while self.lock.load(Ordering::Acquire) & WRITE_LOCK != 0 {
            sched.yield_now();
        }
        self.lock.fetch_add(1, Ordering::AcqRel);
    }

    pub fn read_unlock(&self) {
        assert_boot_core();
        bug_on!(self.readers() == 0);
        self.lock.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn write_lock(&self, sched: &(impl Yield + ?Sized)) {
        assert_boot_core();
        while self.lock.load(Ordering::Acquire) != 0 {
            sched.yield_now();
        }
        self.lock.fetch_or(WRITE_LOCK, Ordering::AcqRel);
    }

    pub fn write_unlock(&self) {
        assert_boot_core();
        self.lock.fetch_and(!WRITE_LOCK, Ordering::AcqRel);
    }

    pub fn readers(&self) -> u32 {
        self.lock.load(Ordering::Acquire) & !WRITE_LOCK
    }

    pub fn is_write_locked(&self) -> bool {
        self.lock.load(Ordering::Acquire) & WRITE_LOCK != 0
    }
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn rwlock_init(lock: &RwLock) {
    lock.lock.store(0, Ordering::Release);
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn read_lock(lock: &RwLock) {
    lock.read_lock(super::scheduler());
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn read_unlock(lock: &RwLock) {
    lock.read_unlock();
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn write_lock(lock: &RwLock) {
    lock.write_lock(super::scheduler());
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn write_unlock(lock: &RwLock) {
    lock.write_unlock();
}

/// Bottom halves never preempt a task here, the `_bh` forms are the plain ones.
#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn read_lock_bh(lock: &RwLock) {
    read_lock(lock);
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn read_unlock_bh(lock: &RwLock) {
    read_unlock(lock);
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn write_lock_bh(lock: &RwLock) {
    write_lock(lock);
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn write_unlock_bh(lock: &RwLock) {
    write_unlock(lock);
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sched::{Scheduler, SpinYield},
        core::ffi::{c_int, c_void},
        std::sync::Mutex as StdMutex,
    };

    #[test]
    fn readers_share_the_lock() {
        let lock = RwLock::new();
        lock.read_lock(&SpinYield);
        lock.read_lock(&SpinYield);
        assert_eq!(lock.readers(), 2);
        assert!(!lock.is_write_locked());
        lock.read_unlock();
        lock.read_unlock();
        lock.write_lock(&SpinYield);
        assert!(lock.is_write_locked());
        assert_eq!(lock.readers(), 0);
        lock.write_unlock();
        assert_eq!(lock.lock.load(Ordering::SeqCst), 0);
    }

    struct Shared {
        sched: &'static Scheduler,
        lock: RwLock,
        events: StdMutex<Vec<&'static str>>,
    }

    extern "C" fn reader(arg: *mut c_void) -> c_int {
        let shared = unsafe { &*(arg as *const Shared) };
        shared.lock.read_lock(shared.sched);
        shared.events.lock().unwrap().push("read start");
        shared.sched.yield_now();
        shared.sched.yield_now();
        shared.events.lock().unwrap().push("read end");
        shared.lock.read_unlock();
        0
    }

    extern "C" fn writer(arg: *mut c_void) -> c_int {
        let shared = unsafe { &*(arg as *const Shared) };
        shared.lock.write_lock(shared.sched);
        shared.events.lock().unwrap().push("write start");
        shared.sched.yield_now();
        assert_eq!(shared.lock.readers(), 0);
        shared.events.lock().unwrap().push("write end");
        shared.lock.write_unlock();
        0
    }

    #[test]
    fn writer_waits_for_readers_and_excludes_them() {
        let sched: &'static Scheduler = Box::leak(Box::new(Scheduler::new()));
        let shared: &'static Shared = Box::leak(Box::new(Shared {
            sched,
            lock: RwLock::new(),
            events: StdMutex::new(Vec::new()),
        }));
        let arg = shared as *const Shared as *mut c_void;
        sched.create_thread(reader, arg);
        sched.create_thread(writer, arg);
        sched.create_thread(reader, arg);
        sched.run();

        let events = shared.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "read start",
                "read start",
                "read end",
                "read end",
                "write start",
                "write end"
            ]
        );
    }

    extern "C" fn late_reader(arg: *mut c_void) -> c_int {
        let shared = unsafe { &*(arg as *const Shared) };
        shared.events.lock().unwrap().push("read attempt");
        shared.lock.read_lock(shared.sched);
        shared.events.lock().unwrap().push("read start");
        shared.lock.read_unlock();
        0
    }

    extern "C" fn writer_spawning_reader(arg: *mut c_void) -> c_int {
        let shared = unsafe { &*(arg as *const Shared) };
        shared.lock.write_lock(shared.sched);
        shared.events.lock().unwrap().push("write start");
        shared.sched.create_thread(late_reader, arg);
        shared.sched.yield_now();
        shared.sched.yield_now();
        assert_eq!(shared.lock.readers(), 0);
        shared.events.lock().unwrap().push("write end");
        shared.lock.write_unlock();
        0
    }

    #[test]
    fn reader_arriving_during_write_waits_for_it() {
        let sched: &'static Scheduler = Box::leak(Box::new(Scheduler::new()));
        let shared: &'static Shared = Box::leak(Box::new(Shared {
            sched,
            lock: RwLock::new(),
            events: StdMutex::new(Vec::new()),
        }));
        sched.create_thread(writer_spawning_reader, shared as *const Shared as *mut c_void);
        sched.run();

        let events = shared.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["write start", "read attempt", "write end", "read start"]
        );
        assert_eq!(shared.lock.lock.load(Ordering::SeqCst), 0);
    }
}
