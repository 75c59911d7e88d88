//! GC root scanning
//!
//! The runtime's collector is conservative: it can find everything reachable
//! from its own heap and globals, but not pointers that only live in CPU
//! registers or native stack frames. [`RootScanner`] hands it those words.
//!
//! A scan must never miss a word that might be a reference. Passing words
//! that merely look like heap addresses is fine; the collector only keeps
//! some garbage alive for one more cycle.

use core::mem::size_of;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::{self, CAPTURED_REGISTERS};
use crate::error::ScanError;

pub type Word = usize;

/// Words copied per [`RootCollector::collect_roots`] call when a range is
/// forwarded through the default implementation.
const SCAN_CHUNK_WORDS: usize = 32;

/// The collector side of a root scan
pub trait RootCollector {
    /// A stop-the-world cycle is starting
    fn collect_start(&mut self);

    /// Treat every word as a candidate reference
    fn collect_roots(&mut self, words: &[Word]);

    /// Treat `len` words starting at `start` as candidate references
    ///
    /// The default copies the range out in chunks with volatile loads, so no
    /// reference into live stack frames is ever formed.
    ///
    /// # Safety
    ///
    /// `start..start + len` must be readable, word aligned memory.
    unsafe fn collect_root_range(&mut self, start: *const Word, len: usize) {
        let mut chunk = [0; SCAN_CHUNK_WORDS];
        let mut done = 0;
        while done < len {
            let n = (len - done).min(SCAN_CHUNK_WORDS);
            for (i, slot) in chunk[..n].iter_mut().enumerate() {
                *slot = unsafe { start.add(done + i).read_volatile() };
            }
            self.collect_roots(&chunk[..n]);
            done += n;
        }
    }

    /// The cycle is over; unmarked objects may be freed
    fn collect_end(&mut self);
}

/// Upper bound of the native stack
///
/// Recorded once during boot and never changed for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackTop(usize);

impl StackTop {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }
}

/// Callee-saved registers and the stack pointer, captured together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    registers: [Word; CAPTURED_REGISTERS],
    stack_pointer: Word,
}

impl RegisterSnapshot {
    /// Snapshot the calling context
    #[inline(never)]
    pub fn capture() -> Self {
        let mut registers = [0; CAPTURED_REGISTERS];
        let stack_pointer = arch::capture_registers(&mut registers);
        Self {
            registers,
            stack_pointer,
        }
    }

    pub const fn from_parts(registers: [Word; CAPTURED_REGISTERS], stack_pointer: Word) -> Self {
        Self {
            registers,
            stack_pointer,
        }
    }

    pub fn registers(&self) -> &[Word] {
        &self.registers
    }

    pub const fn stack_pointer(&self) -> Word {
        self.stack_pointer
    }
}

/// Conservative scanner over registers and `[sp, stack_top)`
#[derive(Debug)]
pub struct RootScanner {
    stack_top: StackTop,
    scanning: AtomicBool,
}

impl RootScanner {
    pub const fn new(stack_top: StackTop) -> Self {
        Self {
            stack_top,
            scanning: AtomicBool::new(false),
        }
    }

    pub const fn stack_top(&self) -> StackTop {
        self.stack_top
    }

    /// Run one collection cycle rooted at the caller's registers and stack
    ///
    /// # Safety
    ///
    /// The stack between the caller's stack pointer and the recorded top must
    /// be the live native stack of the current thread.
    #[inline(never)]
    pub unsafe fn collect<C: RootCollector + ?Sized>(
        &self,
        collector: &mut C,
    ) -> Result<(), ScanError> {
        let _cycle = self.begin()?;
        collector.collect_start();
        let snapshot = RegisterSnapshot::capture();
        unsafe { self.scan(&snapshot, collector) };
        collector.collect_end();
        Ok(())
    }

    /// Run one collection cycle from an already captured snapshot
    ///
    /// # Safety
    ///
    /// `[snapshot.stack_pointer(), stack_top)` must be readable, word aligned
    /// memory.
    pub unsafe fn collect_from<C: RootCollector + ?Sized>(
        &self,
        snapshot: &RegisterSnapshot,
        collector: &mut C,
    ) -> Result<(), ScanError> {
        let _cycle = self.begin()?;
        collector.collect_start();
        unsafe { self.scan(snapshot, collector) };
        collector.collect_end();
        Ok(())
    }

    /// Number of stack words between `sp` and the recorded top
    pub fn stack_words(&self, sp: Word) -> usize {
        self.stack_top.addr().saturating_sub(sp) / size_of::<Word>()
    }

    unsafe fn scan<C: RootCollector + ?Sized>(
        &self,
        snapshot: &RegisterSnapshot,
        collector: &mut C,
    ) {
        collector.collect_roots(snapshot.registers());

        let sp = snapshot.stack_pointer();
        let len = self.stack_words(sp);
        if len > 0 {
            unsafe { collector.collect_root_range(sp as *const Word, len) };
        }
    }

    fn begin(&self) -> Result<CycleGuard<'_>, ScanError> {
        if self.scanning.swap(true, Ordering::Acquire) {
            return Err(ScanError::Reentrant);
        }
        Ok(CycleGuard(&self.scanning))
    }
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ToyHeap;
    use std::boxed::Box;
    use std::vec::Vec;

    fn region_scanner(stack: &[Word]) -> (RootScanner, Word) {
        let range = stack.as_ptr_range();
        (
            RootScanner::new(StackTop::new(range.end as usize)),
            range.start as usize,
        )
    }

    #[test]
    fn test_stack_top_is_fixed() {
        let scanner = RootScanner::new(StackTop::new(0x0800_0000));
        assert_eq!(scanner.stack_top().addr(), 0x0800_0000);
        assert_eq!(scanner.stack_words(0x0800_0000 - 64), 64 / size_of::<Word>());
        assert_eq!(scanner.stack_words(0x0800_0010), 0);
    }

    #[test]
    fn test_object_on_stack_survives() {
        let mut heap = ToyHeap::default();
        let kept = heap.alloc(0x2000_0040);
        let lost = heap.alloc(0x2000_0080);

        let stack = [0, 7, kept, 0xdead_beef];
        let (scanner, sp) = region_scanner(&stack);
        let snapshot = RegisterSnapshot::from_parts([0; CAPTURED_REGISTERS], sp);

        unsafe { scanner.collect_from(&snapshot, &mut heap) }.unwrap();
        assert!(heap.is_live(kept));
        assert!(!heap.is_live(lost));
        assert_eq!(heap.cycles, 1);
    }

    #[test]
    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn test_object_in_register_survives() {
        let mut heap = ToyHeap::default();
        let kept = heap.alloc(0x2000_0100);

        let stack = [0; 8];
        let (scanner, sp) = region_scanner(&stack);
        let mut registers = [0; CAPTURED_REGISTERS];
        registers[CAPTURED_REGISTERS - 1] = kept;
        let snapshot = RegisterSnapshot::from_parts(registers, sp);

        unsafe { scanner.collect_from(&snapshot, &mut heap) }.unwrap();
        assert!(heap.is_live(kept));
    }

    #[test]
    fn test_stale_words_only_over_retain() {
        let mut heap = ToyHeap::default();
        let live = heap.alloc(0x2000_1000);
        let garbage = heap.alloc(0x2000_2000);

        // near-miss addresses, an unaligned alias and a stale copy of garbage
        let mut stack = Vec::new();
        for i in 0..200usize {
            stack.push(0x2000_1000 + (i % 7) + 1);
            stack.push(0x1fff_ffff - i);
        }
        stack.push(garbage);
        stack.push(live);

        let (scanner, sp) = region_scanner(&stack);
        let snapshot = RegisterSnapshot::from_parts([0; CAPTURED_REGISTERS], sp);
        unsafe { scanner.collect_from(&snapshot, &mut heap) }.unwrap();

        assert!(heap.is_live(live));
        // kept alive by a stale word: allowed
        assert!(heap.is_live(garbage));
        assert_eq!(heap.objects.len(), 2);
    }

    #[test]
    fn test_range_longer_than_chunk_is_fully_scanned() {
        let mut heap = ToyHeap::default();
        let last = heap.alloc(0x2000_4000);

        let mut stack = std::vec![0; SCAN_CHUNK_WORDS * 3 + 5];
        *stack.last_mut().unwrap() = last;

        let (scanner, sp) = region_scanner(&stack);
        let snapshot = RegisterSnapshot::from_parts([0; CAPTURED_REGISTERS], sp);
        unsafe { scanner.collect_from(&snapshot, &mut heap) }.unwrap();
        assert!(heap.is_live(last));
    }

    #[test]
    fn test_sp_above_top_scans_only_registers() {
        let mut heap = ToyHeap::default();
        let obj = heap.alloc(0x2000_0200);

        let scanner = RootScanner::new(StackTop::new(0x1000));
        let snapshot = RegisterSnapshot::from_parts([0; CAPTURED_REGISTERS], 0x2000);
        unsafe { scanner.collect_from(&snapshot, &mut heap) }.unwrap();
        assert!(!heap.is_live(obj));
    }

    struct Nested<'a> {
        scanner: &'a RootScanner,
        nested: Option<Result<(), ScanError>>,
    }

    impl RootCollector for Nested<'_> {
        fn collect_start(&mut self) {}

        fn collect_roots(&mut self, _words: &[Word]) {
            if self.nested.is_none() {
                let mut inner = ToyHeap::default();
                let snapshot = RegisterSnapshot::from_parts([0; CAPTURED_REGISTERS], 0);
                self.nested = Some(unsafe { self.scanner.collect_from(&snapshot, &mut inner) });
            }
        }

        fn collect_end(&mut self) {}
    }

    #[test]
    fn test_reentrant_scan_rejected() {
        let stack = [0usize; 4];
        let (scanner, sp) = region_scanner(&stack);
        let mut collector = Nested {
            scanner: &scanner,
            nested: None,
        };
        let snapshot = RegisterSnapshot::from_parts([0; CAPTURED_REGISTERS], sp);

        unsafe { scanner.collect_from(&snapshot, &mut collector) }.unwrap();
        assert_eq!(collector.nested, Some(Err(ScanError::Reentrant)));

        // the guard is released afterwards
        let mut heap = ToyHeap::default();
        assert!(unsafe { scanner.collect_from(&snapshot, &mut heap) }.is_ok());
    }

    /// Keeps a reference only in this frame's stack slot while collecting
    #[inline(never)]
    fn collect_with_local_root(scanner: &RootScanner, heap: &mut ToyHeap) -> Word {
        let boxed = Box::new(0xabcd_u64);
        let addr = heap.alloc(&*boxed as *const u64 as Word);
        let slot = core::hint::black_box(addr);
        let slot_ref = core::hint::black_box(&slot);

        unsafe { scanner.collect(heap) }.unwrap();

        let _ = core::hint::black_box(slot_ref);
        drop(boxed);
        addr
    }

    #[test]
    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn test_live_stack_scan_finds_local_root() {
        let top_marker = 0usize;
        let top = core::hint::black_box(&top_marker) as *const usize as usize;
        let scanner = RootScanner::new(StackTop::new(top));

        let mut heap = ToyHeap::default();
        let addr = collect_with_local_root(&scanner, &mut heap);

        assert_eq!(heap.cycles, 1);
        assert!(heap.is_live(addr));
    }
}
