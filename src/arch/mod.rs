/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Architecture specific parts: barriers, cache maintenance, core id, uptime and the
//! coroutine backend the scheduler switches kernel threads with.
//!
//! On bare metal aarch64 the real instructions are used. Everywhere else a hosted
//! backend built on std threads stands in, so the rest of the crate can be tested.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_os = "none"))] {
        mod aarch64;
        pub use self::aarch64::*;
    } else if #[cfg(not(target_os = "none"))] {
        mod hosted;
        pub use self::hosted::*;
    } else {
        compile_error!("only aarch64 bare metal and hosted builds are supported");
    }
}
