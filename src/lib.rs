//! mpboot - bare-metal boot layer for a MicroPython user program
//!
//! Brings a user-program slot on a microcontroller brain from reset to a
//! running bytecode interpreter: clears static storage, records the stack,
//! hands the heap to the runtime, runs one precompiled program and halts.
//! All device services are reached through the firmware's fixed jump table.

#![cfg_attr(not(test), no_std)]
// Firmware entry points are raw addresses and linker symbols
#![allow(clippy::missing_safety_doc)]
// Configuration types intentionally use builder-style constructors
#![allow(clippy::new_without_default)]

pub mod arch;
pub mod boot;
pub mod bundle;
pub mod config;
pub mod console;
pub mod error;
pub mod gate;
pub mod gc;
pub mod image;
pub mod loader;
pub mod memory;
pub mod panic;
pub mod runtime;

// Device hooks exported to the runtime
#[cfg(feature = "firmware")]
pub mod hal;

#[cfg(test)]
mod testing;

/// Boot layer version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Boot layer name
pub const NAME: &str = "mpboot";
