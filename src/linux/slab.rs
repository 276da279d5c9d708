/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! `kmalloc` family on top of the runtime pool.

use core::{
    ffi::{c_uint, c_void},
    ptr::{self, NonNull},
};

pub const GFP_KERNEL: c_uint = 0;
pub const GFP_ATOMIC: c_uint = 1;

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn qwq_malloc(size: usize) -> *mut c_void {
    match super::runtime().allocate(size) {
        Ok(block) => block.as_ptr().cast(),
        Err(e) => {
            warn!("{}", e);
            ptr::null_mut()
        }
    }
}

/// Memory is never reclaimed.
#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn qwq_free(block: *mut c_void) {
    if let Some(block) = NonNull::new(block.cast()) {
        super::runtime().free(block);
    }
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn kmalloc(size: usize, _flags: c_uint) -> *mut c_void {
    qwq_malloc(size)
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn kzalloc(size: usize, _flags: c_uint) -> *mut c_void {
    match super::runtime().allocate_zeroed(size) {
        Ok(block) => block.as_ptr().cast(),
        Err(e) => {
            warn!("{}", e);
            ptr::null_mut()
        }
    }
}

#[cfg_attr(target_os = "none", no_mangle)]
pub extern "C" fn kfree(block: *const c_void) {
    qwq_free(block as *mut c_void);
}
