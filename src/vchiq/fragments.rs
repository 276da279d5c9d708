/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Fragment buffers for the partial cache lines at both ends of a read bulk.
//!
//! The VideoCore writes the head and tail of a misaligned receive into a fragment
//! instead of the destination, the ARM copies them over once the transfer completes.
//! Each fragment is two cache lines: head first, tail second.

use {
    crate::{
        linux::{Mutex, Semaphore},
        sched::Yield,
    },
    core::sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// Largest pool the free bitmap can track.
pub const MAX_POOL_FRAGMENTS: usize = 64;

/// Fixed pool of fragments in coherent memory.
///
/// `available` counts free fragments so acquirers block without touching the bitmap,
/// `guard` serialises bitmap updates.
pub struct FragmentPool {
    base: AtomicUsize,
    fragment_size: AtomicUsize,
    count: AtomicUsize,
    free: AtomicU64,
    available: Semaphore,
    guard: Mutex,
}

impl FragmentPool {
    /// An empty pool, [`init`](Self::init) must run before the first acquire.
    pub const fn new() -> Self {
        Self {
            base: AtomicUsize::new(0),
            fragment_size: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            free: AtomicU64::new(0),
            available: Semaphore::new(0),
            guard: Mutex::new(),
        }
    }

    /// Hand `count` fragments of two `cache_line` bytes each, starting at `base`, to the pool.
    pub fn init(&self, base: usize, count: usize, cache_line: usize) {
        bug_on!(count == 0 || count > MAX_POOL_FRAGMENTS);
        bug_on!(!cache_line.is_power_of_two());

        let free = if count == MAX_POOL_FRAGMENTS {
            u64::MAX
        } else {
            (1u64 << count) - 1
        };
        self.base.store(base, Ordering::Release);
        self.fragment_size.store(2 * cache_line, Ordering::Release);
        self.count.store(count, Ordering::Release);
        self.free.store(free, Ordering::Release);
        self.available.reset(count as u32);
    }

    /// Take a fragment, yielding until one is free. Returns its index.
    pub fn acquire(&self, sched: &(impl Yield + ?Sized)) -> usize {
        self.available.down(sched);

        self.guard.lock(sched);
        let free = self.free.load(Ordering::Acquire);
        bug_on!(free == 0);
        let index = free.trailing_zeros() as usize;
        self.free.store(free & !(1 << index), Ordering::Release);
        self.guard.unlock();

        index
    }

    /// Return fragment `index` to the pool.
    pub fn release(&self, index: usize, sched: &(impl Yield + ?Sized)) {
        bug_on!(index >= self.count.load(Ordering::Acquire));

        self.guard.lock(sched);
        let free = self.free.load(Ordering::Acquire);
        bug_on!(free & (1 << index) != 0);
        self.free.store(free | (1 << index), Ordering::Release);
        self.guard.unlock();

        self.available.up();
    }

    /// Fragments not handed out.
    pub fn free_count(&self) -> usize {
        self.available.count() as usize
    }

    pub fn cache_line(&self) -> usize {
        self.fragment_size.load(Ordering::Acquire) / 2
    }

    /// CPU address of fragment `index`.
    pub fn fragment(&self, index: usize) -> usize {
        self.base.load(Ordering::Acquire) + index * self.fragment_size.load(Ordering::Acquire)
    }
}

impl Default for FragmentPool {
    fn default() -> Self {
        Self::new()
    }
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
    fn fragments_are_handed_out_lowest_first() {
        let pool = FragmentPool::new();
        pool.init(0x1000, 4, 64);
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.cache_line(), 64);

        assert_eq!(pool.acquire(&SpinYield), 0);
        assert_eq!(pool.acquire(&SpinYield), 1);
        assert_eq!(pool.fragment(1), 0x1080);
        pool.release(0, &SpinYield);
        assert_eq!(pool.acquire(&SpinYield), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn full_pool_of_sixty_four() {
        let pool = FragmentPool::new();
        pool.init(0, MAX_POOL_FRAGMENTS, 32);
        for expected in 0..MAX_POOL_FRAGMENTS {
            assert_eq!(pool.acquire(&SpinYield), expected);
        }
        assert_eq!(pool.free_count(), 0);
        pool.release(63, &SpinYield);
        assert_eq!(pool.acquire(&SpinYield), 63);
    }

    #[test]
    #[should_panic]
    fn double_release_is_fatal() {
        let pool = FragmentPool::new();
        pool.init(0, 2, 64);
        pool.release(1, &SpinYield);
    }

    struct Shared {
        sched: &'static Scheduler,
        pool: FragmentPool,
        log: StdMutex<Vec<&'static str>>,
    }

    extern "C" fn holder(arg: *mut c_void) -> c_int {
        let shared = unsafe { &*(arg as *const Shared) };
        let index = shared.pool.acquire(shared.sched);
        shared.log.lock().unwrap().push("holder acquired");
        shared.sched.yield_now();
        shared.log.lock().unwrap().push("holder released");
        shared.pool.release(index, shared.sched);
        0
    }

    extern "C" fn waiter(arg: *mut c_void) -> c_int {
        let shared = unsafe { &*(arg as *const Shared) };
        let index = shared.pool.acquire(shared.sched);
        shared.log.lock().unwrap().push("waiter acquired");
        shared.pool.release(index, shared.sched);
        0
    }

    #[test]
    fn acquire_blocks_while_pool_is_empty() {
        let sched: &'static Scheduler = Box::leak(Box::new(Scheduler::new()));
        let shared: &'static Shared = Box::leak(Box::new(Shared {
            sched,
            pool: FragmentPool::new(),
            log: StdMutex::new(Vec::new()),
        }));
        shared.pool.init(0, 1, 64);
        let arg = shared as *const Shared as *mut c_void;
        sched.create_thread(holder, arg);
        sched.create_thread(waiter, arg);
        sched.run();

        assert_eq!(
            *shared.log.lock().unwrap(),
            vec!["holder acquired", "holder released", "waiter acquired"]
        );
        assert_eq!(shared.pool.free_count(), 1);
    }
}
