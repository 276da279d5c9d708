/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Emulated Linux kernel ABI used by the VCHIQ driver.
//!
//! The Rust types carry the semantics and take their scheduler explicitly. The
//! `extern "C"` entry points next to them use the runtime installed with [`install`].

pub mod bug;
pub mod kthread;
pub mod mutex;
pub mod printk;
pub mod rwlock;
pub mod semaphore;
pub mod slab;

pub use {
    kthread::{current_task, TaskStruct, TaskTable},
    mutex::Mutex,
    printk::printk,
    rwlock::RwLock,
    semaphore::Semaphore,
};

use {
    crate::{runtime::Runtime, sched::Scheduler},
    once_cell::race::OnceRef,
    snafu::Snafu,
};

pub const EPERM: i32 = 1;
pub const ENXIO: i32 = 6;
pub const ENOMEM: i32 = 12;
pub const EBUSY: i32 = 16;
pub const ENODEV: i32 = 19;
pub const EINVAL: i32 = 22;

#[derive(Debug, Snafu)]
pub enum InstallError {
    #[snafu(display("the kernel emulation runtime is already installed"))]
    AlreadyInstalled,
}

static RUNTIME: OnceRef<'static, Runtime> = OnceRef::new();

/// Make `runtime` the one behind the C entry points and hook the task table to its
/// scheduler. Done once during kernel startup.
pub fn install(runtime: &'static Runtime) -> Result<(), InstallError> {
    RUNTIME
        .set(runtime)
        .map_err(|_| InstallError::AlreadyInstalled)?;
    kthread::init(runtime);
    runtime.report();
    Ok(())
}

pub(crate) fn runtime() -> &'static Runtime {
    match RUNTIME.get() {
        Some(runtime) => runtime,
        None => bug!(),
    }
}

pub(crate) fn scheduler() -> &'static Scheduler {
    runtime().scheduler()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{sched::Yield, test_support::leak_region},
        core::{
            ffi::{c_int, c_void},
            sync::atomic::{AtomicU32, Ordering},
        },
    };

    static GUARD: Mutex = Mutex::new();
    static SEM: Semaphore = Semaphore::new(0);
    static LOCK: RwLock = RwLock::new();
    static ENTERED: AtomicU32 = AtomicU32::new(0);

    extern "C" fn worker(arg: *mut c_void) -> c_int {
        let pid = unsafe { (*current_task()).pid };
        assert_eq!(pid as usize, arg as usize);
        mutex::mutex_lock(&GUARD);
        ENTERED.fetch_add(1, Ordering::SeqCst);
        scheduler().yield_now();
        mutex::mutex_unlock(&GUARD);
        rwlock::read_lock_bh(&LOCK);
        rwlock::read_unlock_bh(&LOCK);
        semaphore::up(&SEM);
        0
    }

    // The C entry points share one process-wide runtime, so all of them are
    // exercised from this single test.
    #[test]
    fn c_entry_points_use_installed_runtime() {
        let (start, end) = leak_region(1 << 20, 4096);
        let runtime: &'static Runtime = Box::leak(Box::new(Runtime::new(start, end)));
        install(runtime).unwrap();
        assert!(install(runtime).is_err());
        assert_eq!(unsafe { (*current_task()).pid }, 0);

        let a = slab::kmalloc(10, slab::GFP_KERNEL);
        let b = slab::kzalloc(4096, slab::GFP_ATOMIC);
        assert!(!a.is_null() && !b.is_null());
        assert_ne!(a, b);
        slab::kfree(a);
        assert!(slab::kmalloc(2 << 20, slab::GFP_KERNEL).is_null());
        assert!(slab::kmalloc(usize::MAX - 8, slab::GFP_KERNEL).is_null());
        assert!(slab::kzalloc(usize::MAX, slab::GFP_KERNEL).is_null());

        let first = kthread::kthread_create(worker, 1 as *mut c_void, core::ptr::null());
        let second = kthread::kthread_create(worker, 2 as *mut c_void, core::ptr::null());
        assert_eq!(kthread::wake_up_process(first), 0);
        kthread::set_user_nice(second, -20);
        kthread::flush_signals(second);
        assert_eq!(unsafe { (*first).pid }, 1);
        assert_eq!(unsafe { (*second).pid }, 2);

        // Boot context waits on the semaphore while both workers finish.
        semaphore::down(&SEM);
        semaphore::down(&SEM);

        assert_eq!(ENTERED.load(Ordering::SeqCst), 2);
        rwlock::write_lock_bh(&LOCK);
        assert!(LOCK.is_write_locked());
        rwlock::write_unlock_bh(&LOCK);
        scheduler().run();
        assert_eq!(unsafe { (*first).terminated }, 1);
        assert_eq!(unsafe { (*second).terminated }, 1);
        assert_eq!(unsafe { (*current_task()).pid }, 0);
        assert!(!GUARD.is_locked());
    }
}
