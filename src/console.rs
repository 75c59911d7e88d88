//! Serial console for mpboot
//!
//! Text goes out through the firmware call gate on the stdio channel. Output
//! is staged in a fixed buffer rather than on the heap, so diagnostics still
//! work when the managed heap is the thing that broke.

use core::fmt::{self, Write};

use spin::{Mutex, Once};

use crate::config::{CONSOLE_BUFFER_SIZE, CONSOLE_STALL_TICKS};
use crate::gate::FirmwareGate;

/// Gate shared with the global console
pub type Sink = dyn FirmwareGate + Sync;

/// Console writer over a firmware serial channel
pub struct Console<G: FirmwareGate> {
    gate: G,
    channel: u32,
    buffer: heapless::Vec<u8, CONSOLE_BUFFER_SIZE>,
}

impl<G: FirmwareGate> Console<G> {
    pub const fn new(gate: G, channel: u32) -> Self {
        Console {
            gate,
            channel,
            buffer: heapless::Vec::new(),
        }
    }

    pub const fn channel(&self) -> u32 {
        self.channel
    }

    /// Stage bytes, sending whenever a line completes or the buffer fills
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.buffer.push(byte).is_err() {
                self.flush();
                // cannot fail, the buffer was just drained
                let _ = self.buffer.push(byte);
            }
            if byte == b'\n' {
                self.flush();
            }
        }
    }

    /// Send everything staged so far
    pub fn flush(&mut self) {
        send(&self.gate, self.channel, &self.buffer);
        self.buffer.clear();
    }
}

impl<G: FirmwareGate> fmt::Write for Console<G> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl<G: FirmwareGate> Drop for Console<G> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Write all of `bytes`, yielding to firmware while the channel is backed up
///
/// A channel that accepts nothing for [`CONSOLE_STALL_TICKS`] rounds in a row
/// loses the rest of `bytes`. Returns how many bytes were accepted.
pub fn send<G: FirmwareGate + ?Sized>(gate: &G, channel: u32, bytes: &[u8]) -> usize {
    let mut rest = bytes;
    let mut stalled = 0;

    while !rest.is_empty() {
        let accepted = gate.write_serial(channel, rest);
        rest = &rest[accepted.min(rest.len())..];

        if rest.is_empty() {
            break;
        }
        if accepted == 0 {
            stalled += 1;
            if stalled > CONSOLE_STALL_TICKS {
                break;
            }
        } else {
            stalled = 0;
        }
        gate.cooperative_tick();
    }

    bytes.len() - rest.len()
}

static INSTALLED: Once = Once::new();

/// Global console instance
static CONSOLE: Mutex<Option<Console<&'static Sink>>> = Mutex::new(None);

/// Route `print!` output to `gate` on `channel`
///
/// Only the first call takes effect. Returns `false` if a console was already
/// installed.
pub fn install(gate: &'static Sink, channel: u32) -> bool {
    let mut installed = false;
    INSTALLED.call_once(|| {
        *CONSOLE.lock() = Some(Console::new(gate, channel));
        installed = true;
    });
    installed
}

/// Print formatted text to console
///
/// Output is discarded until a console is installed.
pub fn print(args: fmt::Arguments) {
    if let Some(console) = CONSOLE.lock().as_mut() {
        let _ = console.write_fmt(args);
    }
}

/// Write raw bytes to the global console
///
/// Output is discarded until a console is installed.
pub fn write(bytes: &[u8]) {
    if let Some(console) = CONSOLE.lock().as_mut() {
        console.write_bytes(bytes);
    }
}

/// Send whatever the global console has staged, unless someone holds it
pub fn try_flush() {
    if let Some(mut console) = CONSOLE.try_lock() {
        if let Some(console) = console.as_mut() {
            console.flush();
        }
    }
}

/// Print macro for boot code
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print(format_args!($($arg)*));
    };
}

/// Print with newline macro
#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n");
    };
    ($($arg:tt)*) => {
        $crate::console::print(format_args!("{}\n", format_args!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GateEvent, RecordingGate};

    #[test]
    fn test_console_write() {
        let gate = RecordingGate::new();
        let mut console = Console::new(&gate, 1);
        console.write_str("Hello, mpboot!\n").unwrap();
        assert_eq!(gate.serial_output(1), b"Hello, mpboot!\n");
    }

    #[test]
    fn test_console_formatting() {
        let gate = RecordingGate::new();
        {
            let mut console = Console::new(&gate, 3);
            write!(&mut console, "Test {}", 42).unwrap();
            // nothing sent until newline, flush or drop
            assert!(gate.serial_output(3).is_empty());
        }
        assert_eq!(gate.serial_output(3), b"Test 42");
    }

    #[test]
    fn test_long_output_is_chunked() {
        let gate = RecordingGate::new();
        let long = [b'x'; CONSOLE_BUFFER_SIZE * 2 + 10];
        {
            let mut console = Console::new(&gate, 1);
            console.write_bytes(&long);
        }
        assert_eq!(gate.serial_output(1), long);
        assert!(gate.events().iter().all(|e| match e {
            GateEvent::Write { data, .. } => data.len() <= CONSOLE_BUFFER_SIZE,
            _ => true,
        }));
    }

    #[test]
    fn test_short_writes_are_retried_after_tick() {
        let gate = RecordingGate::new().with_write_limit(2);
        let sent = send(&gate, 1, b"hello");

        assert_eq!(sent, 5);
        assert_eq!(gate.serial_output(1), b"hello");
        assert_eq!(gate.ticks(), 2);
    }

    #[test]
    fn test_stalled_channel_gives_up() {
        let gate = RecordingGate::new().with_write_limit(0);
        let sent = send(&gate, 1, b"lost");

        assert_eq!(sent, 0);
        assert_eq!(gate.ticks(), CONSOLE_STALL_TICKS as usize);
    }

    #[test]
    fn test_print_before_install_is_dropped() {
        // no console installed in unit tests; must not panic
        print(format_args!("ignored"));
        write(b"ignored");
        try_flush();
    }
}
