/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Fatal error reporting: `BUG()`, `BUG_ON()` and C `assert()`.

use core::ffi::{c_char, c_uint, CStr};

/// Report a kernel bug at `file:line` and stop.
#[cold]
pub fn bug_at(file: &str, line: u32) -> ! {
    error!("BUG at {}:{}", file, line);
    panic!("BUG at {}:{}", file, line)
}

/// A failed assertion in driver code.
#[cold]
pub fn assertion_failed(expr: &str, file: &str, line: u32) -> ! {
    error!("assertion failed: {} ({}:{})", expr, file, line);
    panic!("assertion failed: {} ({}:{})", expr, file, line)
}

/// C `assert()` backend.
///
/// # Safety
///
/// `expr` and `file` must be NUL-terminated strings or null.
#[cfg_attr(target_os = "none", no_mangle)]
pub unsafe extern "C" fn qwq_assertion_failed(
    expr: *const c_char,
    file: *const c_char,
    line: c_uint,
) -> ! {
    assertion_failed(c_text(expr), c_text(file), line)
}

/// C `BUG()` backend.
///
/// # Safety
///
/// `file` must be a NUL-terminated string or null.
#[cfg_attr(target_os = "none", no_mangle)]
pub unsafe extern "C" fn linuxemu_bug(file: *const c_char, line: c_uint) -> ! {
    bug_at(c_text(file), line)
}

unsafe fn c_text<'a>(s: *const c_char) -> &'a str {
    if s.is_null() {
        "?"
    } else {
        CStr::from_ptr(s).to_str().unwrap_or("?")
    }
}

/// Under `multicore`, every lock primitive may only be touched from core 0.
#[inline(always)]
pub fn assert_boot_core() {
    #[cfg(feature = "multicore")]
    bug_on!(crate::arch::cpu::core_id() != 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "BUG at")]
    fn bug_macro_panics_with_location() {
        bug!();
    }

    #[test]
    #[should_panic(expected = "assertion failed: len > 0 (vchiq_core.c:42)")]
    fn assertion_reports_expression() {
        let (expr, file) = unsafe {
            (
                c_text(b"len > 0\0".as_ptr().cast()),
                c_text(b"vchiq_core.c\0".as_ptr().cast()),
            )
        };
        assertion_failed(expr, file, 42);
    }

    #[test]
    fn null_c_strings_are_replaced() {
        assert_eq!(unsafe { c_text(core::ptr::null()) }, "?");
    }

    #[test]
    fn bug_on_false_is_silent() {
        bug_on!(1 + 1 != 2);
    }

    #[cfg(feature = "multicore")]
    mod multicore {
        use {
            super::super::assert_boot_core,
            crate::{arch::cpu, linux::Mutex, sched::SpinYield},
        };

        #[test]
        fn boot_core_passes() {
            cpu::set_core_id(0);
            assert_boot_core();
        }

        #[test]
        #[should_panic(expected = "BUG at")]
        fn secondary_core_is_fatal() {
            cpu::set_core_id(1);
            assert_boot_core();
        }

        #[test]
        #[should_panic(expected = "BUG at")]
        fn lock_from_secondary_core_is_fatal() {
            let lock = Mutex::new();
            cpu::set_core_id(2);
            lock.lock(&SpinYield);
        }
    }
}
