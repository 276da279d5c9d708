/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Host memory standing in for device registers and physical memory in unit tests.

use std::{alloc::Layout, cell::UnsafeCell};

/// A block of fake 32-bit registers.
#[repr(C, align(16))]
pub struct FakeRegisters<const N: usize> {
    words: UnsafeCell<[u32; N]>,
}

// Tests poke the words through volatile accesses only.
unsafe impl<const N: usize> Sync for FakeRegisters<N> {}

impl<const N: usize> FakeRegisters<N> {
    pub fn leak() -> &'static Self {
        Box::leak(Box::new(Self {
            words: UnsafeCell::new([0; N]),
        }))
    }

    pub fn base(&self) -> usize {
        self.words.get() as usize
    }

    pub fn read(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile((self.base() + offset) as *const u32) }
    }

    pub fn write(&self, offset: usize, value: u32) {
        unsafe { core::ptr::write_volatile((self.base() + offset) as *mut u32, value) }
    }
}

/// Leak a zeroed host allocation and return its `[start, end)` address range.
pub fn leak_region(size: usize, align: usize) -> (usize, usize) {
    let layout = Layout::from_size_align(size, align).unwrap();
    let start = unsafe { std::alloc::alloc_zeroed(layout) } as usize;
    assert_ne!(start, 0);
    (start, start + size)
}
