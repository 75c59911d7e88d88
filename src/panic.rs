//! Panic handler
//!
//! A Rust panic in the boot layer is outside the runtime's recovery
//! boundary. The report goes straight to the serial gate, then the device
//! asks firmware to end the program and idles like a normal halt.

use core::fmt;
use core::panic::{Location, PanicInfo};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::boot::Idle;
use crate::console::{self, Console};
use crate::gate::FirmwareGate;

static PANICKED: AtomicBool = AtomicBool::new(false);

/// Report a panic on `channel`, request exit and idle
///
/// A panic raised while reporting another one skips the report.
pub fn device_panic<G: FirmwareGate>(gate: G, channel: u32, info: &PanicInfo) -> ! {
    if !PANICKED.swap(true, Ordering::SeqCst) {
        console::try_flush();
        let mut out = Console::new(&gate, channel);
        let _ = write_report(&mut out, info.location(), info.message());
    }

    gate.request_exit();
    Idle::after_exit_request(gate).run()
}

fn write_report(
    out: &mut impl fmt::Write,
    location: Option<&Location<'_>>,
    message: impl fmt::Display,
) -> fmt::Result {
    out.write_str("\n!!! PANIC !!!\n")?;
    if let Some(location) = location {
        writeln!(out, "Location: {}:{}", location.file(), location.line())?;
    }
    writeln!(out, "Message: {message}")?;
    out.write_str("System halted.\n")
}
