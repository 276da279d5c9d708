/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! `printk` into the kernel log.

use {
    crate::console::{log_write, Severity},
    core::{
        ffi::{c_char, c_int, CStr},
        fmt,
    },
};

/// Longest message printk emits, longer ones are cut.
pub const PRINTK_MAX_MSG_LEN: usize = 1000;

/// Fixed-capacity formatting target that drops whatever does not fit.
///
/// Truncation happens on a character boundary, so the content is always valid UTF-8.
pub struct MessageBuffer<const N: usize> {
    bytes: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> MessageBuffer<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        // Only whole characters are ever copied in.
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for MessageBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for MessageBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.truncated = true;
        }
        Ok(())
    }
}

/// Format a message and log it with debug severity under the `printk` source.
/// Returns the number of bytes logged.
pub fn printk(args: fmt::Arguments) -> usize {
    use fmt::Write;

    let mut message = MessageBuffer::<PRINTK_MAX_MSG_LEN>::new();
    let _ = message.write_fmt(args);
    let text = message.as_str().trim_end_matches('\n');
    log_write("printk", Severity::Debug, format_args!("{}", text));
    message.len()
}

/// `printk` as called from C. The driver side formats into a string first,
/// a leading `KERN_*` level marker (`"\x01" "n"`) is stripped.
///
/// # Safety
///
/// `message` must be a NUL-terminated string or null.
#[cfg_attr(target_os = "none", no_mangle)]
pub unsafe extern "C" fn linuxemu_printk(message: *const c_char) -> c_int {
    if message.is_null() {
        return 0;
    }
    let bytes = CStr::from_ptr(message).to_bytes();
    let bytes = match bytes {
        [0x01, _level, rest @ ..] => rest,
        other => other,
    };
    let text = core::str::from_utf8(bytes).unwrap_or("<invalid utf-8>");
    printk(format_args!("{}", text)) as c_int
}
