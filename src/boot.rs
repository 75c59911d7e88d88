//! Boot sequencer
//!
//! Runs once at reset and never returns:
//!
//! 1. Zero `.bss`
//! 2. Record the stack top for the root scanner
//! 3. Hand the heap arena to the runtime's allocator
//! 4. Initialize the runtime's global state
//! 5. Load and run the entry program inside the recovery boundary
//! 6. Request exit, then yield to firmware forever
//!
//! Each step consumes the stage before it, so the sequence cannot be
//! reordered or repeated. Halted states have no way back to running.

use core::fmt::{self, Write};

use crate::config::BootConfig;
use crate::console::{self, Console};
use crate::error::LayoutError;
use crate::gate::FirmwareGate;
use crate::gc::{RootScanner, StackTop};
use crate::image::ProgramImage;
use crate::loader;
use crate::memory::{self, MemoryLayout};
use crate::runtime::{Runtime, RuntimeContext};

/// Where the system is in its one-way life
///
/// `Booting` covers every [`Boot`] stage and `Running` lasts for the call to
/// [`Boot::run_entry_program`]. A [`Halted`] system reports one of the two
/// halted phases and has no way back to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    /// Preparing memory and the runtime
    Booting,
    /// Entry program is executing
    Running,
    /// Program finished; idling
    HaltedNormal,
    /// Program faulted or could not be selected; diagnostic printed, idling
    HaltedError,
}

impl BootPhase {
    pub const fn is_halted(self) -> bool {
        matches!(self, BootPhase::HaltedNormal | BootPhase::HaltedError)
    }
}

/// Stage: fresh from reset, layout checked, nothing touched
pub struct Reset;

/// Stage: `.bss` is zero
pub struct Zeroed;

/// Stage: stack top recorded
pub struct Stacked {
    stack_top: StackTop,
}

/// Stage: heap arena owned by the runtime
pub struct HeapReady<R: Runtime> {
    stack_top: StackTop,
    runtime: R,
}

/// Stage: runtime initialized, ready to run the entry program
pub struct Ready<R: Runtime> {
    stack_top: StackTop,
    runtime: RuntimeContext<R>,
}

/// Boot sequencer at stage `S`
pub struct Boot<G: FirmwareGate, S> {
    gate: G,
    layout: MemoryLayout,
    config: BootConfig,
    stage: S,
}

impl<G: FirmwareGate, S> Boot<G, S> {
    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    fn advance<T>(self, stage: T) -> Boot<G, T> {
        Boot {
            gate: self.gate,
            layout: self.layout,
            config: self.config,
            stage,
        }
    }

    fn progress(&self, step: &str) {
        if self.config.verbose {
            let mut out = Console::new(&self.gate, self.config.stdio_channel);
            let _ = writeln!(out, "[BOOT] {step}... OK");
        }
    }
}

impl<G: FirmwareGate> Boot<G, Reset> {
    /// Start a boot with a link-time layout
    ///
    /// An invalid layout is a pre-safety fault: the caller has no way to
    /// report it and should halt.
    pub fn reset(gate: G, layout: MemoryLayout, config: BootConfig) -> Result<Self, LayoutError> {
        layout.validate()?;
        Ok(Boot {
            gate,
            layout,
            config,
            stage: Reset,
        })
    }

    /// Zero the static storage region
    ///
    /// # Safety
    ///
    /// Nothing may have read or written a static in the region yet, and no
    /// live reference may point into it.
    pub unsafe fn zero_static(self) -> Boot<G, Zeroed> {
        unsafe { memory::zero_region(&self.layout.zero_init) };
        let boot = self.advance(Zeroed);
        boot.progress("Zeroing static storage");
        boot
    }
}

impl<G: FirmwareGate> Boot<G, Zeroed> {
    /// Record the top of the native stack
    pub fn establish_stack(self) -> Boot<G, Stacked> {
        let stack_top = StackTop::new(self.layout.stack.end);
        let boot = self.advance(Stacked { stack_top });
        boot.progress("Recording stack top");
        boot
    }
}

impl<G: FirmwareGate> Boot<G, Stacked> {
    pub fn stack_top(&self) -> StackTop {
        self.stage.stack_top
    }

    /// Root scanner bounded by the recorded stack top
    pub fn root_scanner(&self) -> RootScanner {
        RootScanner::new(self.stage.stack_top)
    }

    /// Give the heap arena to the runtime's allocator
    ///
    /// # Safety
    ///
    /// The heap region must not be used by anything else from here on.
    pub unsafe fn init_heap<R: Runtime>(self, mut runtime: R) -> Boot<G, HeapReady<R>> {
        let stack_top = self.stage.stack_top;
        unsafe {
            runtime.init_stack(stack_top);
            runtime.init_heap(self.layout.heap);
        }
        let boot = self.advance(HeapReady { stack_top, runtime });
        boot.progress("Handing heap to runtime");
        boot
    }
}

impl<G: FirmwareGate, R: Runtime> Boot<G, HeapReady<R>> {
    /// Initialize the runtime's global state
    pub fn init_runtime(self) -> Boot<G, Ready<R>> {
        let HeapReady {
            stack_top,
            mut runtime,
        } = self.stage;
        runtime.init();

        let boot = Boot {
            gate: self.gate,
            layout: self.layout,
            config: self.config,
            stage: Ready {
                stack_top,
                runtime: RuntimeContext::new(runtime),
            },
        };
        boot.progress("Initializing runtime");
        boot
    }
}

impl<G: FirmwareGate, R: Runtime> Boot<G, Ready<R>> {
    pub fn stack_top(&self) -> StackTop {
        self.stage.stack_top
    }

    pub fn runtime(&self) -> &RuntimeContext<R> {
        &self.stage.runtime
    }

    /// Run the entry program inside the one recovery boundary
    ///
    /// Whatever happens in the program, control comes back here and the
    /// system halts. A fault is reported on the stdio channel first.
    pub fn run_entry_program(self, image: &ProgramImage<'_>) -> Halted<G, R> {
        let Ready { mut runtime, .. } = self.stage;

        let phase = match loader::load_and_run(&mut runtime, image) {
            Ok(()) => BootPhase::HaltedNormal,
            Err(fault) => {
                runtime.print_traceback(fault.fault());
                report(&self.gate, self.config.stdio_channel, &fault);
                BootPhase::HaltedError
            }
        };

        Halted {
            gate: self.gate,
            config: self.config,
            phase,
            runtime,
        }
    }

    /// Halt without running anything
    ///
    /// For an entry program that could not be selected. `reason` is
    /// reported like a program fault.
    pub fn abort(self, reason: impl fmt::Display) -> Halted<G, R> {
        let Ready { runtime, .. } = self.stage;
        report(&self.gate, self.config.stdio_channel, &reason);

        Halted {
            gate: self.gate,
            config: self.config,
            phase: BootPhase::HaltedError,
            runtime,
        }
    }
}

fn report<G: FirmwareGate>(gate: &G, channel: u32, fault: &impl fmt::Display) {
    console::try_flush();
    let mut out = Console::new(gate, channel);
    let _ = writeln!(out, "[BOOT] program halted: {fault}");
}

/// Terminal state: the entry program is over
pub struct Halted<G: FirmwareGate, R: Runtime> {
    gate: G,
    config: BootConfig,
    phase: BootPhase,
    runtime: RuntimeContext<R>,
}

impl<G: FirmwareGate, R: Runtime> Halted<G, R> {
    /// `HaltedNormal` or `HaltedError`
    pub const fn phase(&self) -> BootPhase {
        self.phase
    }

    pub fn runtime(&self) -> &RuntimeContext<R> {
        &self.runtime
    }

    /// Ask firmware to end the program and switch to idling
    pub fn shutdown(self) -> Idle<G> {
        console::try_flush();
        if self.config.verbose {
            let mut out = Console::new(&self.gate, self.config.stdio_channel);
            let _ = writeln!(out, "[BOOT] {:?}, requesting exit", self.phase);
        }
        self.gate.request_exit();
        Idle { gate: self.gate }
    }

    /// Request exit, then yield to firmware forever
    pub fn shutdown_and_idle(self) -> ! {
        self.shutdown().run()
    }
}

/// After exit was requested: only scheduler ticks from here on
pub struct Idle<G: FirmwareGate> {
    gate: G,
}

impl<G: FirmwareGate> Idle<G> {
    /// Idle after an exit request made elsewhere (panic path)
    pub const fn after_exit_request(gate: G) -> Self {
        Self { gate }
    }

    /// One idle-loop iteration
    pub fn step(&self) {
        self.gate.cooperative_tick();
    }

    pub fn run(self) -> ! {
        loop {
            self.step();
        }
    }
}
