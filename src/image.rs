//! Program image and code signature
//!
//! Firmware reads a four-word signature header at the very start of the
//! binary before it will run anything. The boot layer only emits it; nothing
//! on the device parses it. Decoding exists for host-side tooling and tests.

use core::ops::BitOr;

use crate::config::SIGNATURE_MAGIC;
use crate::error::HeaderError;

/// Program type field of the signature header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramType(pub u32);

impl ProgramType {
    pub const USER: Self = Self(0);
}

/// Program owner field of the signature header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramOwner(pub u32);

impl ProgramOwner {
    pub const SYSTEM: Self = Self(0);
    pub const VEX: Self = Self(1);
    pub const PARTNER: Self = Self(2);
}

/// Option bits of the signature header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramFlags(pub u32);

impl ProgramFlags {
    pub const EMPTY: Self = Self(0);
    /// Invert the default graphics colors
    pub const INVERT_GRAPHICS: Self = Self(1 << 0);
    /// Kill all program tasks when the program exits
    pub const KILL_TASKS_ON_EXIT: Self = Self(1 << 1);
    /// Pick graphics colors from the firmware theme
    pub const THEMED_GRAPHICS: Self = Self(1 << 2);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ProgramFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

const HEADER_SIZE: usize = 16;

const fn le_word(bytes: &[u8; HEADER_SIZE], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Four-field header firmware checks before admitting a program
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureHeader {
    pub magic: u32,
    pub program_type: ProgramType,
    pub program_owner: ProgramOwner,
    pub program_flags: ProgramFlags,
}

impl SignatureHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub const fn new(owner: ProgramOwner, flags: ProgramFlags) -> Self {
        Self {
            magic: SIGNATURE_MAGIC,
            program_type: ProgramType::USER,
            program_owner: owner,
            program_flags: flags,
        }
    }

    /// Little-endian wire form
    pub const fn to_le_bytes(&self) -> [u8; HEADER_SIZE] {
        let fields = [
            self.magic.to_le_bytes(),
            self.program_type.0.to_le_bytes(),
            self.program_owner.0.to_le_bytes(),
            self.program_flags.0.to_le_bytes(),
        ];
        let mut out = [0; HEADER_SIZE];
        let mut i = 0;
        while i < HEADER_SIZE {
            out[i] = fields[i / 4][i % 4];
            i += 1;
        }
        out
    }

    pub const fn from_le_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: le_word(bytes, 0),
            program_type: ProgramType(le_word(bytes, 4)),
            program_owner: ProgramOwner(le_word(bytes, 8)),
            program_flags: ProgramFlags(le_word(bytes, 12)),
        }
    }

    /// Split a raw image into its header and the payload that follows it
    pub fn parse(image: &[u8]) -> Result<(Self, &[u8]), HeaderError> {
        let (head, payload) = image
            .split_first_chunk::<HEADER_SIZE>()
            .ok_or(HeaderError::Truncated {
                needed: Self::SIZE,
                found: image.len(),
            })?;
        Ok((Self::from_le_bytes(head), payload))
    }

    pub const fn has_valid_magic(&self) -> bool {
        self.magic == SIGNATURE_MAGIC
    }
}

impl Default for SignatureHeader {
    fn default() -> Self {
        Self::new(ProgramOwner::PARTNER, ProgramFlags::EMPTY)
    }
}

/// The record placed in `.code_signature`: header plus four reserved words
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSignature {
    pub header: SignatureHeader,
    reserved: [u32; 4],
}

impl CodeSignature {
    pub const SIZE: usize = 32;

    pub const fn new(header: SignatureHeader) -> Self {
        Self {
            header,
            reserved: [0; 4],
        }
    }
}

/// Signature header plus the opaque bytecode it introduces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramImage<'a> {
    pub header: SignatureHeader,
    pub payload: &'a [u8],
}

impl<'a> ProgramImage<'a> {
    pub const fn new(header: SignatureHeader, payload: &'a [u8]) -> Self {
        Self { header, payload }
    }
}

/// Widen little-endian 16-bit words into bytes at compile time
///
/// Precompiled bytecode is often checked in as a `u16` array.
pub const fn words_to_le_bytes<const W: usize, const B: usize>(words: [u16; W]) -> [u8; B] {
    assert!(B == W * 2, "byte length must be twice the word count");
    let mut out = [0; B];
    let mut i = 0;
    while i < W {
        let [lo, hi] = words[i].to_le_bytes();
        out[2 * i] = lo;
        out[2 * i + 1] = hi;
        i += 1;
    }
    out
}
