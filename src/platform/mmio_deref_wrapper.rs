/*
 * SPDX-License-Identifier: MIT OR BlueOak-1.0.0
 * Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>
 * Original code distributed under MIT, additional changes are under BlueOak-1.0.0
 */

use core::{marker::PhantomData, ops};

/// Typed view of a memory-mapped register block at a fixed address.
pub struct MMIODerefWrapper<T> {
    base_addr: usize,
    phantom: PhantomData<fn() -> T>,
}

impl<T> MMIODerefWrapper<T> {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// `start_addr` must point at a register block laid out as `T` that stays mapped for
    /// the lifetime of the wrapper.
    pub const unsafe fn new(start_addr: usize) -> Self {
        Self {
            base_addr: start_addr,
            phantom: PhantomData,
        }
    }

    pub const fn base_addr(&self) -> usize {
        self.base_addr
    }
}

/// Deref to the register block, so registers read as `self.CS.get()`.
impl<T> ops::Deref for MMIODerefWrapper<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*(self.base_addr as *const _) }
    }
}
