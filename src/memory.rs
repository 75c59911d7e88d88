//! Link-time memory layout
//!
//! The linker script carves user RAM into a handful of fixed regions. None of
//! them is ever resized after reset, so the layout is a plain value that is
//! checked once and then handed to whoever owns each region.

use core::mem::{align_of, size_of};

use crate::error::LayoutError;

/// What a region is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionPurpose {
    /// Static storage that must read as zero before first use (`.bss`)
    ZeroInit,
    /// Native call stack, growing down from `end`
    Stack,
    /// Arena handed to the runtime's allocator and collector
    Heap,
    /// Optional bytecode bundle linked after the program
    Bytecode,
}

/// Memory region descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: usize,
    pub end: usize,
    pub purpose: RegionPurpose,
}

impl MemoryRegion {
    pub const fn new(start: usize, end: usize, purpose: RegionPurpose) -> Self {
        Self {
            start,
            end,
            purpose,
        }
    }

    /// Region covering a mutable buffer
    pub fn from_slice<T>(buf: &mut [T], purpose: RegionPurpose) -> Self {
        let range = buf.as_mut_ptr_range();
        Self::new(range.start as usize, range.end as usize, purpose)
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn contains(&self, addr: usize) -> bool {
        self.start <= addr && addr < self.end
    }

    /// Two regions overlap if they share at least one byte
    pub const fn overlaps(&self, other: &MemoryRegion) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }

    fn check(&self, expected: RegionPurpose) -> Result<(), LayoutError> {
        if self.purpose != expected {
            return Err(LayoutError::WrongPurpose {
                expected,
                found: self.purpose,
            });
        }
        if self.end < self.start {
            return Err(LayoutError::Inverted {
                purpose: self.purpose,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// The regions the boot sequencer works with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub zero_init: MemoryRegion,
    pub stack: MemoryRegion,
    pub heap: MemoryRegion,
}

impl MemoryLayout {
    pub const fn new(zero_init: MemoryRegion, stack: MemoryRegion, heap: MemoryRegion) -> Self {
        Self {
            zero_init,
            stack,
            heap,
        }
    }

    /// Check ordering, alignment and disjointness
    ///
    /// `.bss` must be word aligned because it is cleared a word at a time, and
    /// the stack top must be word aligned because the root scan walks it in
    /// words.
    pub fn validate(&self) -> Result<(), LayoutError> {
        self.zero_init.check(RegionPurpose::ZeroInit)?;
        self.stack.check(RegionPurpose::Stack)?;
        self.heap.check(RegionPurpose::Heap)?;

        for region in [&self.zero_init, &self.stack] {
            let edge = if region.purpose == RegionPurpose::Stack {
                region.end
            } else {
                region.start
            };
            if edge % align_of::<usize>() != 0 {
                return Err(LayoutError::Misaligned {
                    purpose: region.purpose,
                    start: edge,
                });
            }
        }

        let pairs = [
            (&self.stack, &self.heap),
            (&self.zero_init, &self.stack),
            (&self.zero_init, &self.heap),
        ];
        for (first, second) in pairs {
            if first.overlaps(second) {
                return Err(LayoutError::Overlap {
                    first: first.purpose,
                    second: second.purpose,
                });
            }
        }

        Ok(())
    }
}

/// Write zero to every byte of `region`
///
/// Stores are volatile so the compiler cannot assume anything about the
/// contents of statics it has not yet seen initialized.
///
/// # Safety
///
/// `region` must be writable memory that nothing else reads or holds a
/// reference into while it is cleared. `region.start` must be word aligned.
pub unsafe fn zero_region(region: &MemoryRegion) {
    let mut word = region.start as *mut usize;
    let word_end = (region.start + region.len() / size_of::<usize>() * size_of::<usize>())
        as *mut usize;

    while word < word_end {
        unsafe {
            word.write_volatile(0);
            word = word.add(1);
        }
    }

    let mut byte = word as *mut u8;
    while (byte as usize) < region.end {
        unsafe {
            byte.write_volatile(0);
            byte = byte.add(1);
        }
    }
}
