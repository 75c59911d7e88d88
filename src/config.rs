//! Build-time configuration for mpboot
//!
//! Everything the boot layer needs to know about the board is fixed here or in
//! the linker script. There is no runtime configuration surface on the device.

/// Base address of the firmware jump table.
///
/// Firmware places one function pointer per capability at a fixed offset from
/// this address. The offsets below must be revalidated for every firmware
/// release; nothing on the device checks them.
pub const JUMP_TABLE_BASE: usize = 0x037f_c000;

/// Offset of `serial_write(channel, data, len) -> i32`.
pub const SERIAL_WRITE_OFFSET: usize = 0x89c;
/// Offset of `tasks_run()`, the cooperative scheduler tick.
pub const TASKS_RUN_OFFSET: usize = 0x05c;
/// Offset of `system_exit_request()`.
pub const EXIT_REQUEST_OFFSET: usize = 0x130;

/// Serial channel carrying the managed program's stdio.
pub const STDIO_CHANNEL: u32 = 1;

/// Console staging buffer size in bytes.
pub const CONSOLE_BUFFER_SIZE: usize = 256;

/// Scheduler ticks the console waits for a stalled serial channel before it
/// drops the rest of a line.
pub const CONSOLE_STALL_TICKS: u32 = 64;

/// "VXV5" read as a little-endian word.
pub const SIGNATURE_MAGIC: u32 = 0x3558_5658;

/// Magic word at the start of a linked bytecode bundle.
pub const BUNDLE_MAGIC: u32 = 0x675c_3ed9;

/// Bundle record whose payload is the name of the module to run at boot.
pub const ENTRY_RECORD_NAME: &[u8] = b"__mpboot_entry__";

/// Name the runtime gives the module context of the entry program.
pub const ENTRY_MODULE_NAME: &core::ffi::CStr = c"__main__";

/// Boot sequencer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Serial channel used for diagnostics and program output
    pub stdio_channel: u32,
    /// Print `[BOOT]` progress lines for each step
    pub verbose: bool,
}

impl BootConfig {
    pub const fn new() -> Self {
        Self {
            stdio_channel: STDIO_CHANNEL,
            verbose: false,
        }
    }

    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::new()
    }
}
