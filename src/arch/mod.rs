//! Architecture-specific code for mpboot
//!
//! The only thing the rest of the crate needs from the CPU is a snapshot of
//! the callee-saved registers together with the stack pointer, taken at one
//! instant. Everything that consumes the snapshot is architecture-neutral.
//!
//! 32-bit ARM is the device target. The x86_64 and AArch64 versions exist so
//! the root scanner can be exercised on a development host.

#[cfg(target_arch = "arm")]
mod arm;
#[cfg(target_arch = "arm")]
pub use arm::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::*;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(not(any(target_arch = "arm", target_arch = "aarch64", target_arch = "x86_64")))]
mod fallback;
#[cfg(not(any(target_arch = "arm", target_arch = "aarch64", target_arch = "x86_64")))]
pub use fallback::*;

/// Spin forever without touching memory or firmware
///
/// Terminal state for faults raised before memory is safe to use.
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
