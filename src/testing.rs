//! Test doubles for the firmware gate and the managed runtime

use std::cell::{Cell, RefCell};
use std::string::String;
use std::vec::Vec;

use crate::gate::FirmwareGate;
use crate::gc::{RootCollector, Word};
use crate::loader::ExecutionContext;
use crate::memory::MemoryRegion;
use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    Write { channel: u32, data: Vec<u8> },
    Tick,
    Exit,
}

/// Gate that records every call
pub struct RecordingGate {
    events: RefCell<Vec<GateEvent>>,
    write_limit: Cell<usize>,
}

impl RecordingGate {
    pub fn new() -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            write_limit: Cell::new(usize::MAX),
        }
    }

    /// Accept at most `limit` bytes per write
    pub fn with_write_limit(self, limit: usize) -> Self {
        self.write_limit.set(limit);
        self
    }

    pub fn events(&self) -> Vec<GateEvent> {
        self.events.borrow().clone()
    }

    pub fn serial_output(&self, channel: u32) -> Vec<u8> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                GateEvent::Write { channel: c, data } if *c == channel => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn serial_text(&self, channel: u32) -> String {
        String::from_utf8_lossy(&self.serial_output(channel)).into_owned()
    }

    pub fn ticks(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| **e == GateEvent::Tick)
            .count()
    }
}

impl FirmwareGate for RecordingGate {
    fn write_serial(&self, channel: u32, data: &[u8]) -> usize {
        let accepted = data.len().min(self.write_limit.get());
        if accepted > 0 {
            self.events.borrow_mut().push(GateEvent::Write {
                channel,
                data: data[..accepted].to_vec(),
            });
        }
        accepted
    }

    fn cooperative_tick(&self) {
        self.events.borrow_mut().push(GateEvent::Tick);
    }

    fn request_exit(&self) {
        self.events.borrow_mut().push(GateEvent::Exit);
    }
}

/// Fake bytecode: `b'M'`, a version byte, then one opcode per byte
pub const SCRIPT_MAGIC: u8 = b'M';
pub const SCRIPT_VERSION: u8 = 6;
/// Opcode: print "ok"
pub const OP_PRINT: u8 = b'p';
/// Opcode: raise an error
pub const OP_RAISE: u8 = b'r';
/// Opcode: store a module-level name
pub const OP_STORE: u8 = b's';
/// Opcode: look a name up from a function body
pub const OP_LOAD_GLOBAL: u8 = b'g';

/// Context handle of the runtime's global namespace
pub const GLOBAL_NAMESPACE: usize = 0x9000;

pub fn script(ops: &[u8]) -> Vec<u8> {
    let mut bytes = std::vec![SCRIPT_MAGIC, SCRIPT_VERSION];
    bytes.extend_from_slice(ops);
    bytes
}

/// Decoded fake bytecode and the namespace its globals resolve in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFunction {
    pub ops: Vec<u8>,
    pub globals: usize,
}

/// Runtime that "executes" the fake bytecode above
///
/// Module-level stores always land in the global namespace; global
/// lookups go through the context the function was decoded in.
#[derive(Debug, Default)]
pub struct ScriptRuntime {
    pub heap: Option<MemoryRegion>,
    pub initialized: u32,
    pub contexts: u32,
    pub executed: Vec<u8>,
    pub output: String,
    pub tracebacks: u32,
    pub stored_names: u32,
}

impl Runtime for ScriptRuntime {
    type Function = ScriptFunction;
    type Fault = &'static str;

    unsafe fn init_heap(&mut self, arena: MemoryRegion) {
        self.heap = Some(arena);
    }

    fn init(&mut self) {
        self.initialized += 1;
    }

    fn new_context(&mut self) -> ExecutionContext {
        self.contexts += 1;
        ExecutionContext::new(GLOBAL_NAMESPACE)
    }

    fn decode(
        &mut self,
        context: &ExecutionContext,
        payload: &[u8],
    ) -> Result<Self::Function, Self::Fault> {
        match payload {
            [SCRIPT_MAGIC, SCRIPT_VERSION, ops @ ..] => Ok(ScriptFunction {
                ops: ops.to_vec(),
                globals: context.handle(),
            }),
            [SCRIPT_MAGIC, _, ..] => Err("incompatible bytecode version"),
            _ => Err("invalid bytecode header"),
        }
    }

    fn call0(&mut self, function: Self::Function) -> Result<(), Self::Fault> {
        for op in function.ops {
            self.executed.push(op);
            match op {
                OP_PRINT => self.output.push_str("ok\n"),
                OP_RAISE => return Err("RuntimeError"),
                OP_STORE => self.stored_names += 1,
                OP_LOAD_GLOBAL => {
                    if function.globals != GLOBAL_NAMESPACE || self.stored_names == 0 {
                        return Err("NameError");
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn print_traceback(&mut self, _fault: &Self::Fault) {
        self.tracebacks += 1;
    }
}

/// Mark-sweep collector over a set of fake object addresses
#[derive(Debug, Default)]
pub struct ToyHeap {
    pub objects: Vec<Word>,
    pub marked: Vec<Word>,
    pub cycles: u32,
    pub in_cycle: bool,
}

impl ToyHeap {
    pub fn alloc(&mut self, addr: Word) -> Word {
        self.objects.push(addr);
        addr
    }

    pub fn is_live(&self, addr: Word) -> bool {
        self.objects.contains(&addr)
    }
}

impl RootCollector for ToyHeap {
    fn collect_start(&mut self) {
        assert!(!self.in_cycle, "nested collection");
        self.in_cycle = true;
        self.marked.clear();
    }

    fn collect_roots(&mut self, words: &[Word]) {
        assert!(self.in_cycle, "roots outside a collection cycle");
        for word in words {
            if self.objects.contains(word) && !self.marked.contains(word) {
                self.marked.push(*word);
            }
        }
    }

    fn collect_end(&mut self) {
        let marked = core::mem::take(&mut self.marked);
        self.objects.retain(|o| marked.contains(o));
        self.in_cycle = false;
        self.cycles += 1;
    }
}
