//! Managed runtime interface
//!
//! The interpreter, object model and collector are external. The boot layer
//! only needs the handful of entry points in [`Runtime`]; the device binding
//! lives in [`micropython`].

use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::gc::StackTop;
use crate::loader::ExecutionContext;
use crate::memory::MemoryRegion;

#[cfg(feature = "firmware")]
pub mod micropython;

/// Entry points the boot layer calls on the managed runtime
pub trait Runtime {
    /// Decoded, callable code object
    type Function;
    /// Whatever the runtime raises when decoding or running code fails
    type Fault: fmt::Display + fmt::Debug;

    /// Tell the runtime where the native stack ends
    ///
    /// # Safety
    ///
    /// `top` must be the real upper bound of the current stack.
    unsafe fn init_stack(&mut self, top: StackTop) {
        let _ = top;
    }

    /// Hand the heap arena to the allocator and collector
    ///
    /// # Safety
    ///
    /// `arena` must be memory owned by nothing else for the rest of the run.
    unsafe fn init_heap(&mut self, arena: MemoryRegion);

    /// Set up the runtime's global state
    fn init(&mut self);

    /// Fresh module context bound to the global namespace
    ///
    /// The program's module-level stores land in the runtime's global
    /// namespace. Global lookups from the functions it defines go through
    /// the context, so the context must resolve names in that same
    /// namespace or a function cannot see its own module's names.
    fn new_context(&mut self) -> ExecutionContext;

    /// Turn a bytecode payload into a callable function
    fn decode(
        &mut self,
        context: &ExecutionContext,
        payload: &[u8],
    ) -> Result<Self::Function, Self::Fault>;

    /// Call `function` with no arguments
    fn call0(&mut self, function: Self::Function) -> Result<(), Self::Fault>;

    /// Print the runtime's own description of a fault, if it has one
    fn print_traceback(&mut self, fault: &Self::Fault) {
        let _ = fault;
    }
}

/// An initialized runtime
///
/// Only the boot sequencer creates one, after the heap and global state have
/// been set up, so holding a `RuntimeContext` proves initialization happened
/// exactly once.
#[derive(Debug)]
pub struct RuntimeContext<R: Runtime> {
    runtime: R,
}

impl<R: Runtime> RuntimeContext<R> {
    pub(crate) fn new(runtime: R) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime> Deref for RuntimeContext<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.runtime
    }
}

impl<R: Runtime> DerefMut for RuntimeContext<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.runtime
    }
}
