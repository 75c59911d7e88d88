//! Linked bytecode bundle
//!
//! Bytecode can be uploaded separately from the boot binary and linked at a
//! fixed address. The bundle layout is:
//!
//! ```text
//! magic: u32                 BUNDLE_MAGIC
//! name_pool_offset: u32
//! bytecode_pool_offset: u32
//! module_count: u32
//! entries: [{name_len: u32, bytecode_len: u32}; module_count]
//! ...name pool: every module name back to back, in entry order
//! ...bytecode pool: every payload back to back, in entry order
//! ```
//!
//! All fields are little-endian and pool offsets count from the start of
//! the bundle. Modules are addressed by name. The record named
//! [`ENTRY_RECORD_NAME`] holds the name of the module to run at boot.

use core::ops::Range;

use crate::config::{BUNDLE_MAGIC, ENTRY_RECORD_NAME};
use crate::error::TableError;

const HEADER_LEN: usize = 16;
const ENTRY_LEN: usize = 8;

/// One named module in a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Module<'a> {
    pub name: &'a [u8],
    pub bytecode: &'a [u8],
}

/// A validated bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytecodeTable<'a> {
    bytes: &'a [u8],
    name_pool: usize,
    bytecode_pool: usize,
    module_count: u32,
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let word = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// `base + offset .. base + offset + len`, if it fits in `limit` bytes
fn span(base: usize, offset: usize, len: u32, limit: usize) -> Option<Range<usize>> {
    let start = base.checked_add(offset)?;
    let end = start.checked_add(len as usize)?;
    (end <= limit).then_some(start..end)
}

impl<'a> BytecodeTable<'a> {
    /// Check the magic word and that every name and payload lies inside
    /// `bytes`
    pub fn parse(bytes: &'a [u8]) -> Result<Self, TableError> {
        let truncated = TableError::Truncated(bytes.len());
        let magic = read_u32(bytes, 0).ok_or(truncated)?;
        if magic != BUNDLE_MAGIC {
            return Err(TableError::BadMagic {
                expected: BUNDLE_MAGIC,
                found: magic,
            });
        }
        if bytes.len() < HEADER_LEN {
            return Err(truncated);
        }

        let name_pool = read_u32(bytes, 4).ok_or(truncated)? as usize;
        let bytecode_pool = read_u32(bytes, 8).ok_or(truncated)? as usize;
        let module_count = read_u32(bytes, 12).ok_or(truncated)?;

        let room = (bytes.len() - HEADER_LEN) / ENTRY_LEN;
        if module_count as usize > room {
            return Err(TableError::TooManyModules {
                count: module_count,
                room,
            });
        }

        let table = Self {
            bytes,
            name_pool,
            bytecode_pool,
            module_count,
        };
        let mut modules = table.modules();
        while let Some(module) = modules.try_next() {
            module?;
        }

        Ok(table)
    }

    pub const fn len(&self) -> u32 {
        self.module_count
    }

    pub const fn is_empty(&self) -> bool {
        self.module_count == 0
    }

    /// Every module in entry order
    pub fn modules(&self) -> Modules<'a> {
        Modules {
            table: *self,
            index: 0,
            name_cursor: 0,
            bytecode_cursor: 0,
        }
    }

    /// Bytecode of the module called `name`
    pub fn find(&self, name: &[u8]) -> Option<&'a [u8]> {
        self.modules()
            .find(|module| module.name == name)
            .map(|module| module.bytecode)
    }

    /// The module the entry record names
    pub fn entry_module(&self) -> Result<Module<'a>, TableError> {
        let name = self.find(ENTRY_RECORD_NAME).ok_or(TableError::NoEntryRecord)?;
        self.modules()
            .find(|module| module.name == name)
            .ok_or(TableError::MissingEntry)
    }

    fn lengths(&self, index: u32) -> Option<(u32, u32)> {
        let at = HEADER_LEN + index as usize * ENTRY_LEN;
        Some((read_u32(self.bytes, at)?, read_u32(self.bytes, at + 4)?))
    }
}

/// Iterator over the modules of a [`BytecodeTable`]
#[derive(Debug, Clone)]
pub struct Modules<'a> {
    table: BytecodeTable<'a>,
    index: u32,
    name_cursor: usize,
    bytecode_cursor: usize,
}

impl<'a> Modules<'a> {
    fn try_next(&mut self) -> Option<Result<Module<'a>, TableError>> {
        let index = self.index;
        if index >= self.table.module_count {
            return None;
        }
        self.index += 1;

        let table = &self.table;
        let limit = table.bytes.len();
        let Some((name_len, bytecode_len)) = table.lengths(index) else {
            return Some(Err(TableError::Truncated(limit)));
        };

        let out_of_bounds = |base: usize, cursor: usize, len: u32| TableError::OutOfBounds {
            index,
            offset: base.saturating_add(cursor),
            len,
        };
        let (name_at, bytecode_at) = (self.name_cursor, self.bytecode_cursor);
        let Some(name) = span(table.name_pool, name_at, name_len, limit) else {
            return Some(Err(out_of_bounds(table.name_pool, name_at, name_len)));
        };
        let Some(bytecode) = span(table.bytecode_pool, bytecode_at, bytecode_len, limit) else {
            return Some(Err(out_of_bounds(table.bytecode_pool, bytecode_at, bytecode_len)));
        };

        // both spans ended inside the bundle, so the cursors cannot overflow
        self.name_cursor += name_len as usize;
        self.bytecode_cursor += bytecode_len as usize;

        Some(Ok(Module {
            name: &table.bytes[name],
            bytecode: &table.bytes[bytecode],
        }))
    }
}

impl<'a> Iterator for Modules<'a> {
    type Item = Module<'a>;

    fn next(&mut self) -> Option<Module<'a>> {
        // a parsed table has no bad entries
        self.try_next()?.ok()
    }
}

/// Payload to boot from the linked region
///
/// No bundle magic means nothing was uploaded and `builtin` runs. A bundle
/// with the magic but a bad table is an error.
pub fn select_entry<'a>(linked: &'a [u8], builtin: &'a [u8]) -> Result<&'a [u8], TableError> {
    match BytecodeTable::parse(linked) {
        Ok(table) => Ok(table.entry_module()?.bytecode),
        Err(TableError::BadMagic { .. }) => Ok(builtin),
        Err(err) => Err(err),
    }
}
