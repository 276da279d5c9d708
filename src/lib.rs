/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Linux kernel emulation layer for the VideoCore VCHIQ driver.
//!
//! Provides the small slice of the Linux kernel environment the unmodified VCHIQ core
//! expects (cooperative locks, kernel threads, allocation, printk) on top of a bare metal
//! Raspberry Pi, plus the BCM2835 platform glue: doorbell interrupt, slot memory setup,
//! firmware handshake and bulk transfer page lists.
//!
//! The crate builds for `aarch64` bare metal targets and for the host, where the
//! coroutine backend runs on OS threads so everything can be unit tested.

#![cfg_attr(target_os = "none", no_std)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::nonstandard_macro_braces)] // https://github.com/shepmaster/snafu/issues/296

#[macro_use]
pub mod macros;

pub mod arch;
pub mod console;
pub mod linux;
pub mod mm;
pub mod panic;
pub mod platform;
pub mod runtime;
pub mod sched;
pub mod sync;
pub mod vchiq;

pub use runtime::Runtime;

#[cfg(test)]
pub(crate) mod test_support;
