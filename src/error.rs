//! Error types for mpboot
//!
//! Only [`ExecutionFault`] is ever reported on the device. Everything else is
//! either raised before a safe output path exists or describes a programming
//! error caught during bring-up.

use thiserror::Error;

use crate::memory::RegionPurpose;

/// Link-time memory layout violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{purpose:?} region ends before it starts ({start:#x}..{end:#x})")]
    Inverted {
        purpose: RegionPurpose,
        start: usize,
        end: usize,
    },

    #[error("{purpose:?} region at {start:#x} is not word aligned")]
    Misaligned { purpose: RegionPurpose, start: usize },

    #[error("{first:?} region overlaps {second:?} region")]
    Overlap {
        first: RegionPurpose,
        second: RegionPurpose,
    },

    #[error("region registered as {found:?}, expected {expected:?}")]
    WrongPurpose {
        expected: RegionPurpose,
        found: RegionPurpose,
    },
}

/// Fault raised while decoding or running the entry program
///
/// `F` is the runtime's own fault representation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFault<F> {
    #[error("bytecode could not be loaded: {0}")]
    Decode(F),

    #[error("unhandled fault in program: {0}")]
    Execute(F),
}

impl<F> ExecutionFault<F> {
    /// The runtime fault carried by this execution fault
    pub fn fault(&self) -> &F {
        match self {
            ExecutionFault::Decode(fault) | ExecutionFault::Execute(fault) => fault,
        }
    }
}

/// Linked bytecode bundle errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    #[error("bundle too short: {0} bytes")]
    Truncated(usize),

    #[error("invalid bundle magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("bundle declares {count} modules but only has room for {room}")]
    TooManyModules { count: u32, room: usize },

    #[error("module {index} spans {offset:#x}+{len:#x}, past the end of the bundle")]
    OutOfBounds { index: u32, offset: usize, len: u32 },

    #[error("bundle does not name an entry module")]
    NoEntryRecord,

    #[error("bundle names an entry module it does not contain")]
    MissingEntry,
}

/// Signature header decoding errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("signature header needs {needed} bytes, found {found}")]
    Truncated { needed: usize, found: usize },
}

/// Root scan errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    #[error("a collection cycle is already in progress")]
    Reentrant,
}

/// The runtime was initialized twice
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("runtime already initialized")]
pub struct AlreadyInit;
