//! Firmware call gate
//!
//! Vendor firmware exports its services as a table of function pointers at a
//! fixed address. Each capability is described once by a [`Capability`]
//! descriptor and called through one primitive that loads the pointer at
//! `base + offset` and calls it with the declared shape. All of the unsafe
//! address arithmetic lives in [`JumpTable`]; the rest of the crate only sees
//! the [`FirmwareGate`] trait.
//!
//! Nothing here can verify that the loaded pointer is the function we think it
//! is. Matching firmware is a precondition of [`JumpTable::new`], enforced by
//! whoever builds and deploys the image.

use core::mem::size_of;

use crate::config;

/// Services the boot layer needs from firmware
pub trait FirmwareGate {
    /// Write `data` to a serial channel
    ///
    /// Returns how many bytes firmware accepted, always in `0..=data.len()`.
    /// A short count is partial success: the first `n` bytes were queued and
    /// the rest were not sent at all.
    fn write_serial(&self, channel: u32, data: &[u8]) -> usize;

    /// Let the firmware scheduler run one round
    fn cooperative_tick(&self);

    /// Ask firmware to end the user program
    ///
    /// Does not stop execution; the caller must idle afterwards.
    fn request_exit(&self);
}

impl<G: FirmwareGate + ?Sized> FirmwareGate for &G {
    fn write_serial(&self, channel: u32, data: &[u8]) -> usize {
        (**self).write_serial(channel, data)
    }

    fn cooperative_tick(&self) {
        (**self).cooperative_tick()
    }

    fn request_exit(&self) {
        (**self).request_exit()
    }
}

/// Firmware capability descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    /// Byte offset of the function pointer from the table base
    pub offset: usize,
    /// C signature the pointer is called with
    pub signature: &'static str,
}

/// Jump table rooted at a fixed base address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTable {
    base: usize,
}

impl JumpTable {
    /// Table at `base`
    ///
    /// # Safety
    ///
    /// For every entry in [`CAPABILITIES`], `base + offset` must hold a
    /// pointer to a function with the listed signature for as long as the
    /// table is used.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// The table firmware installs at [`config::JUMP_TABLE_BASE`]
    ///
    /// # Safety
    ///
    /// Only sound on a device running the firmware release the offsets in
    /// [`config`] were taken from.
    pub const unsafe fn firmware() -> Self {
        unsafe { Self::new(config::JUMP_TABLE_BASE) }
    }

    pub const fn base(&self) -> usize {
        self.base
    }

    /// Load the function pointer stored at `offset`
    ///
    /// Entries are not guaranteed to be naturally aligned for the host word
    /// size, so the load is unaligned.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the entry at `offset`.
    unsafe fn entry<F: Copy>(&self, offset: usize) -> F {
        debug_assert_eq!(size_of::<F>(), size_of::<usize>());
        unsafe { core::ptr::read_unaligned((self.base + offset) as *const F) }
    }
}

macro_rules! jump_table {
    ($(
        $(#[$meta:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? = $offset:expr;
    )*) => {
        /// Every capability the gate calls through
        pub const CAPABILITIES: &[Capability] = &[$(
            Capability {
                name: stringify!($name),
                offset: $offset,
                signature: stringify!(fn($($ty),*) $(-> $ret)?),
            },
        )*];

        impl JumpTable {
            $(
                $(#[$meta])*
                ///
                /// # Safety
                ///
                /// Calls straight into firmware; see [`JumpTable::new`].
                pub unsafe fn $name(&self, $($arg: $ty),*) $(-> $ret)? {
                    let f: unsafe extern "C" fn($($ty),*) $(-> $ret)? =
                        unsafe { self.entry($offset) };
                    unsafe { f($($arg),*) }
                }
            )*
        }
    };
}

jump_table! {
    /// Queue `len` bytes on a serial channel, returning the accepted count.
    fn serial_write(channel: u32, data: *const u8, len: u32) -> i32 = config::SERIAL_WRITE_OFFSET;

    /// Run firmware background tasks once.
    fn tasks_run() = config::TASKS_RUN_OFFSET;

    /// Request termination of the user program.
    fn system_exit_request() = config::EXIT_REQUEST_OFFSET;
}

/// Clamp a raw firmware write count into `0..=requested`
///
/// Firmware reports internal errors as negative counts. Those mean nothing
/// was sent.
pub fn accepted_bytes(raw: i32, requested: usize) -> usize {
    usize::try_from(raw).unwrap_or(0).min(requested)
}

impl FirmwareGate for JumpTable {
    fn write_serial(&self, channel: u32, data: &[u8]) -> usize {
        let len = data.len().min(u32::MAX as usize);
        let raw = unsafe { self.serial_write(channel, data.as_ptr(), len as u32) };
        accepted_bytes(raw, len)
    }

    fn cooperative_tick(&self) {
        unsafe { self.tasks_run() }
    }

    fn request_exit(&self) {
        unsafe { self.system_exit_request() }
    }
}
