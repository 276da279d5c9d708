/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

mod bump_allocator;
pub use bump_allocator::{AllocError, BumpAllocator};

/// Page size the VCHIQ driver and the GPU agree on.
pub const PAGE_SIZE: usize = 4096;

/// Default minimal alignment of `kmalloc` blocks.
pub const KMALLOC_MIN_ALIGN: usize = 16;

/// Align address downwards.
///
/// Returns the greatest x with alignment `align` so that x <= addr.
/// The alignment must be a power of 2.
#[inline(always)]
pub const fn align_down(addr: usize, alignment: usize) -> usize {
    assert!(
        alignment.is_power_of_two(),
        "`alignment` must be a power of two"
    );
    addr & !(alignment - 1)
}

/// Align address upwards.
///
/// Returns the smallest x with alignment `align` so that x >= addr.
/// The alignment must be a power of 2.
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    assert!(
        alignment.is_power_of_two(),
        "`alignment` must be a power of two"
    );

    let align_mask = alignment - 1;
    if value & align_mask == 0 {
        value
    } else {
        (value | align_mask) + 1
    }
}

/// Check if a value is aligned to a given alignment.
/// The alignment must be a power of 2.
#[inline(always)]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    assert!(
        alignment.is_power_of_two(),
        "`alignment` must be a power of two"
    );

    (value & (alignment - 1)) == 0
}

/// Linux `PAGE_ALIGN()`.
#[inline(always)]
pub const fn page_align(size: usize) -> usize {
    align_up(size, PAGE_SIZE)
}

/// Offset of `addr` inside its page.
#[inline(always)]
pub const fn page_offset(addr: usize) -> usize {
    addr & (PAGE_SIZE - 1)
}

/// Convert a size into human readable format.
pub const fn size_human_readable_ceil(size: usize) -> (usize, &'static str) {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;

    if (size / MIB) > 0 {
        ((size + MIB - 1) / MIB, "MiB")
    } else if (size / KIB) > 0 {
        ((size + KIB - 1) / KIB, "KiB")
    } else {
        (size, "Byte")
    }
}
