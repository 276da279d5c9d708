/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Monotonic allocator backing `kmalloc`.
//!
//! Memory is carved off a fixed pool in allocation order and never given back. The VCHIQ
//! driver allocates almost everything once at startup, so the pool only has to cover
//! that plus one page list per bulk transfer.

use {
    core::{alloc::Layout, cell::Cell, ptr::NonNull},
    snafu::Snafu,
};

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum AllocError {
    #[snafu(display("{} exhausted: {} bytes requested, {} left", name, size, left))]
    Exhausted {
        name: &'static str,
        size: usize,
        left: usize,
    },
    #[snafu(display("{} cannot describe a block of {} bytes", name, size))]
    Oversized { name: &'static str, size: usize },
}

pub struct BumpAllocator {
    next: Cell<usize>,
    pool_end: usize,
    name: &'static str,
}

impl BumpAllocator {
    /// Create a named bump allocator between start and end addresses.
    pub const fn new(pool_start: usize, pool_end: usize, name: &'static str) -> Self {
        Self {
            next: Cell::new(pool_start),
            pool_end,
            name,
        }
    }

    /// Layout of a `size` byte block aligned to `align`.
    pub fn layout(&self, size: usize, align: usize) -> Result<Layout, AllocError> {
        Layout::from_size_align(size, align).map_err(|_| AllocError::Oversized {
            name: self.name,
            size,
        })
    }

    /// Allocate a memory block from the pool.
    pub fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let start = crate::mm::align_up(self.next.get(), layout.align());
        let left = self.remaining();
        let exhausted = || AllocError::Exhausted {
            name: self.name,
            size: layout.size(),
            left,
        };

        let end = start.checked_add(layout.size()).ok_or_else(exhausted)?;
        if end > self.pool_end {
            return Err(exhausted());
        }
        let block = NonNull::new(start as *mut u8).ok_or_else(exhausted)?;
        self.next.set(end);

        Ok(block)
    }

    /// Allocate and clear a memory block.
    pub fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let block = self.allocate(layout)?;
        unsafe { core::ptr::write_bytes(block.as_ptr(), 0, layout.size()) };
        Ok(block)
    }

    /// A bump allocator doesn't care about releasing memory.
    ///
    /// # Safety
    ///
    /// Nothing happens, the signature only mirrors a real allocator.
    pub unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    /// Bytes still available for allocation.
    pub fn remaining(&self) -> usize {
        self.pool_end.saturating_sub(self.next.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_within_init_range() {
        let allocator = BumpAllocator::new(256, 512, "Test allocator 1");
        let first = allocator.allocate(Layout::from_size_align(128, 1).unwrap());
        assert_eq!(first.map(|p| p.as_ptr() as usize), Ok(256));
        let second = allocator.allocate(Layout::from_size_align(100, 32).unwrap());
        assert_eq!(second.map(|p| p.as_ptr() as usize), Ok(384));
        assert_eq!(allocator.remaining(), 28);
        let third = allocator.allocate(Layout::from_size_align(29, 1).unwrap());
        assert_eq!(
            third,
            Err(AllocError::Exhausted {
                name: "Test allocator 1",
                size: 29,
                left: 28
            })
        );
        // A failed request does not consume anything.
        assert_eq!(allocator.remaining(), 28);
    }

    #[test]
    fn inverted_range_never_allocates() {
        let bad_allocator = BumpAllocator::new(512, 256, "Test allocator 2");
        let result = bad_allocator.allocate(Layout::from_size_align(1, 1).unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn zeroed_allocation_clears_memory() {
        let mut pool = vec![0xaau8; 256];
        let start = pool.as_mut_ptr() as usize;
        let allocator = BumpAllocator::new(start, start + pool.len(), "zeroed");
        let block = allocator
            .allocate_zeroed(Layout::from_size_align(64, 1).unwrap())
            .unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(pool[64], 0xaa);
    }
}
