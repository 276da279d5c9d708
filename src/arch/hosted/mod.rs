/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Host stand-ins for the aarch64 primitives.

pub mod coroutine;

pub mod barrier {
    use std::sync::atomic::{fence, Ordering};

    #[inline(always)]
    pub fn wmb() {
        fence(Ordering::Release);
    }

    #[inline(always)]
    pub fn dmb() {
        fence(Ordering::SeqCst);
    }

    #[inline(always)]
    pub fn dsb() {
        fence(Ordering::SeqCst);
    }
}

pub mod cache {
    /// Same value as on the target, so page list layouts match.
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Host caches are coherent, only ordering is needed.
    pub fn clean_and_invalidate_range(_start: usize, _len: usize) {
        super::barrier::dsb();
    }
}

pub mod cpu {
    use std::cell::Cell;

    thread_local! {
        static CORE_ID: Cell<usize> = Cell::new(0);
    }

    /// Core the calling host thread pretends to run on, 0 unless overridden.
    #[inline(always)]
    pub fn core_id() -> usize {
        CORE_ID.with(Cell::get)
    }

    /// Make the calling thread report `id` from [`core_id`].
    pub fn set_core_id(id: usize) {
        CORE_ID.with(|core| core.set(id));
    }

    #[inline(always)]
    pub fn spin_hint() {
        std::thread::yield_now();
    }

    pub fn endless_sleep() -> ! {
        loop {
            std::thread::park();
        }
    }
}

pub mod time {
    use std::{
        sync::OnceLock,
        time::{Duration, Instant},
    };

    static START: OnceLock<Instant> = OnceLock::new();

    pub fn uptime() -> Duration {
        START.get_or_init(Instant::now).elapsed()
    }
}
