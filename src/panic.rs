/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Panic reporting for the embedding kernel.
//!
//! The library does not install a `#[panic_handler]` itself, the kernel binary forwards to
//! [`handler`] from its own one. `BUG()` and failed assertions end up here too.

use crate::console::{console, log_write, ConsoleOps, Severity};

/// Print the panic report on the console and park the core.
pub fn handler(info: &core::panic::PanicInfo) -> ! {
    log_write("panic", Severity::Error, format_args!("{}", info));
    console().flush();
    crate::arch::cpu::endless_sleep()
}
