/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

/// Macro similar to [std](https://doc.rust-lang.org/src/std/macros.rs.html)
/// but for writing into the registered kernel console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::macros::_print(format_args!($($arg)*)));
}

/// Macro similar to [std](https://doc.rust-lang.org/src/std/macros.rs.html)
/// but for writing into the registered kernel console.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ({
        $crate::macros::_print(format_args!($($arg)*));
        $crate::macros::_print(format_args!("\n"));
    })
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    use {crate::console::console, core::fmt::Write};
    // Console writes are infallible.
    let _ = console().write_fmt(args);
}

//--------------------------------------------------------------------------------------------------
//--------------------------------------------------------------------------------------------------

/// Logs an error, tagged with the calling module.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ($crate::console::log_write(
        module_path!(), $crate::console::Severity::Error, format_args!($($arg)*)
    ));
}

/// Logs a warning, tagged with the calling module.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ($crate::console::log_write(
        module_path!(), $crate::console::Severity::Warning, format_args!($($arg)*)
    ));
}

/// Prints info text, with a newline.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::console::log_write(
        module_path!(), $crate::console::Severity::Notice, format_args!($($arg)*)
    ));
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ($crate::console::log_write(
        module_path!(), $crate::console::Severity::Debug, format_args!($($arg)*)
    ));
}

/// Kernel `BUG()`: report the location and halt.
#[macro_export]
macro_rules! bug {
    () => ($crate::linux::bug::bug_at(file!(), line!()));
}

/// Kernel `BUG_ON(cond)`.
#[macro_export]
macro_rules! bug_on {
    ($cond:expr) => {
        if $cond {
            $crate::linux::bug::bug_at(file!(), line!());
        }
    };
}
