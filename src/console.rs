/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Global console sink for kernel log output.

use {
    core::{
        fmt,
        sync::atomic::{AtomicU32, Ordering},
    },
    once_cell::race::OnceRef,
};

/// A trait that must be implemented by devices that are candidates for the
/// global console.
pub trait ConsoleOps {
    /// Display a string.
    fn write_string(&self, string: &str);
    /// Wait until everything written so far has left the device.
    fn flush(&self) {}
}

/// A dummy console that just ignores its inputs.
pub struct NullConsole;

impl ConsoleOps for NullConsole {
    fn write_string(&self, _string: &str) {}
}

/// Forwards output to the host process stdout, so the test harness captures it.
#[cfg(not(target_os = "none"))]
pub struct HostConsole;

#[cfg(not(target_os = "none"))]
impl ConsoleOps for HostConsole {
    fn write_string(&self, string: &str) {
        std::print!("{}", string);
    }
}

/// Console wrapper that gets installed once by the embedding kernel.
pub struct Console {
    output: &'static (dyn ConsoleOps + Sync),
}

impl Console {
    pub const fn new(output: &'static (dyn ConsoleOps + Sync)) -> Console {
        Console { output }
    }
}

impl ConsoleOps for Console {
    fn write_string(&self, string: &str) {
        self.output.write_string(string);
    }

    fn flush(&self) {
        self.output.flush()
    }
}

/// Implementing this trait enables usage of the format_args! macros, which in
/// turn are used to implement the print! and println! macros.
///
/// See src/macros.rs.
impl fmt::Write for &Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output.write_string(s);
        Ok(())
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        static DEFAULT_CONSOLE: Console = Console::new(&NullConsole);
    } else {
        static DEFAULT_CONSOLE: Console = Console::new(&HostConsole);
    }
}

static CONSOLE: OnceRef<'static, Console> = OnceRef::new();

/// Install the global console. Only the first registration wins.
pub fn register_console(console: &'static Console) -> bool {
    CONSOLE.set(console).is_ok()
}

/// Return a reference to the currently installed console.
pub fn console() -> &'static Console {
    CONSOLE.get().unwrap_or(&DEFAULT_CONSOLE)
}

//--------------------------------------------------------------------------------------------------
// Log severities
//--------------------------------------------------------------------------------------------------

/// Message severity, numerically compatible with the C logger levels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Notice = 3,
    Debug = 4,
}

impl Severity {
    /// Map a raw C level, clamping anything unknown to `Debug`.
    pub fn from_raw(level: u32) -> Self {
        match level {
            0 | 1 => Severity::Error,
            2 => Severity::Warning,
            3 => Severity::Notice,
            _ => Severity::Debug,
        }
    }

    /// Tag printed in the log line prefix.
    pub fn marker(self) -> char {
        match self {
            Severity::Error => 'E',
            Severity::Warning => 'W',
            Severity::Notice => ' ',
            Severity::Debug => 'D',
        }
    }
}

static LOG_LEVEL: AtomicU32 = AtomicU32::new(Severity::Debug as u32);

/// Messages less severe than `level` are dropped.
pub fn set_log_level(level: Severity) {
    LOG_LEVEL.store(level as u32, Ordering::Relaxed);
}

pub fn log_enabled(severity: Severity) -> bool {
    severity as u32 <= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Write one log line: `[S sss.uuuuuu] source: message`.
pub fn log_write(source: &str, severity: Severity, args: fmt::Arguments) {
    use fmt::Write;

    if !log_enabled(severity) {
        return;
    }
    let timestamp = crate::arch::time::uptime();
    let mut out = console();
    // Console writes are infallible.
    let _ = write!(
        out,
        "[{} {:>3}.{:06}] {}: {}\n",
        severity.marker(),
        timestamp.as_secs(),
        timestamp.subsec_micros(),
        source,
        args
    );
}
