//! Shared mocks for the integration tests

#![allow(dead_code)]

use std::cell::RefCell;

use mpboot::gate::FirmwareGate;
use mpboot::gc::{RootCollector, Word};
use mpboot::loader::ExecutionContext;
use mpboot::memory::{MemoryLayout, MemoryRegion, RegionPurpose};
use mpboot::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Serial(u32, Vec<u8>),
    Tick,
    Exit,
}

/// Firmware gate that logs every call
#[derive(Default)]
pub struct MockGate {
    pub calls: RefCell<Vec<Call>>,
}

impl MockGate {
    pub fn output(&self, channel: u32) -> String {
        let bytes: Vec<u8> = self
            .calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Serial(ch, data) if *ch == channel => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        String::from_utf8(bytes).expect("console output is UTF-8")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl FirmwareGate for MockGate {
    fn write_serial(&self, channel: u32, data: &[u8]) -> usize {
        self.calls.borrow_mut().push(Call::Serial(channel, data.to_vec()));
        data.len()
    }

    fn cooperative_tick(&self) {
        self.calls.borrow_mut().push(Call::Tick);
    }

    fn request_exit(&self) {
        self.calls.borrow_mut().push(Call::Exit);
    }
}

/// Program understood by [`StubRuntime`]: a list of Python-ish statements
pub const VALID_PREFIX: &[u8] = b"MPY6:";

/// Runtime whose "bytecode" is `MPY6:` followed by `;`-separated statements
///
/// `print <text>` appends to `stdout`, `raise <Name>` raises, `def <name>`
/// stores a module-level name and `call <name>` looks one up the way a
/// function body does, raising `NameError` if the context cannot see it.
#[derive(Debug, Default)]
pub struct StubRuntime {
    pub stack_top: Option<usize>,
    pub heap: Option<MemoryRegion>,
    pub init_calls: u32,
    pub stdout: String,
    pub statements_run: usize,
    pub traceback: Option<String>,
    pub globals: Vec<String>,
}

/// Context handle the stub hands out: the runtime's global namespace
pub const GLOBALS_HANDLE: usize = 0x1000;

impl Runtime for StubRuntime {
    type Function = Vec<String>;
    type Fault = String;

    unsafe fn init_stack(&mut self, top: mpboot::gc::StackTop) {
        self.stack_top = Some(top.addr());
    }

    unsafe fn init_heap(&mut self, arena: MemoryRegion) {
        self.heap = Some(arena);
    }

    fn init(&mut self) {
        self.init_calls += 1;
    }

    fn new_context(&mut self) -> ExecutionContext {
        ExecutionContext::new(GLOBALS_HANDLE)
    }

    fn decode(
        &mut self,
        context: &ExecutionContext,
        payload: &[u8],
    ) -> Result<Vec<String>, String> {
        assert_eq!(context.handle(), GLOBALS_HANDLE);
        let body = payload
            .strip_prefix(VALID_PREFIX)
            .ok_or_else(|| "ValueError: incompatible .mpy file".to_string())?;
        let text = std::str::from_utf8(body).map_err(|_| "ValueError: bad string".to_string())?;
        Ok(text
            .split(';')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn call0(&mut self, function: Vec<String>) -> Result<(), String> {
        for stmt in function {
            self.statements_run += 1;
            if let Some(text) = stmt.strip_prefix("print ") {
                self.stdout.push_str(text);
                self.stdout.push('\n');
            } else if let Some(name) = stmt.strip_prefix("raise ") {
                return Err(name.to_string());
            } else if let Some(name) = stmt.strip_prefix("def ") {
                self.globals.push(name.to_string());
            } else if let Some(name) = stmt.strip_prefix("call ") {
                if !self.globals.iter().any(|g| g == name) {
                    return Err(format!("NameError: name '{name}' isn't defined"));
                }
            }
        }
        Ok(())
    }

    fn print_traceback(&mut self, fault: &String) {
        self.traceback = Some(format!("Traceback (most recent call last):\n{fault}"));
    }
}

/// Collector that records every candidate word it is shown
#[derive(Debug, Default)]
pub struct RecordingCollector {
    pub roots: Vec<Word>,
    pub cycles: u32,
    open: bool,
}

impl RootCollector for RecordingCollector {
    fn collect_start(&mut self) {
        assert!(!self.open);
        self.open = true;
    }

    fn collect_roots(&mut self, words: &[Word]) {
        assert!(self.open);
        self.roots.extend_from_slice(words);
    }

    fn collect_end(&mut self) {
        self.open = false;
        self.cycles += 1;
    }
}

/// Host memory standing in for the linked regions
pub struct HostMemory {
    pub bss: Vec<Word>,
    pub stack: Vec<Word>,
    pub heap: Vec<Word>,
}

impl HostMemory {
    pub fn new() -> Self {
        Self {
            bss: vec![!0; 32],
            stack: vec![0; 128],
            heap: vec![0; 1024],
        }
    }

    pub fn layout(&mut self) -> MemoryLayout {
        MemoryLayout::new(
            MemoryRegion::from_slice(&mut self.bss, RegionPurpose::ZeroInit),
            MemoryRegion::from_slice(&mut self.stack, RegionPurpose::Stack),
            MemoryRegion::from_slice(&mut self.heap, RegionPurpose::Heap),
        )
    }
}
