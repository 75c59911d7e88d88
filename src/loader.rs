//! Program loader
//!
//! Decodes the entry program's bytecode and calls it once. Decoding happens
//! before anything runs, so a corrupt or incompatible payload fails without
//! executing a single instruction from it.

use crate::error::ExecutionFault;
use crate::image::ProgramImage;
use crate::runtime::{Runtime, RuntimeContext};

/// Module context the entry program runs in
///
/// Owned by the loader for one run. `handle` is the runtime's own reference
/// to the context object.
#[derive(Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    handle: usize,
}

impl ExecutionContext {
    pub const fn new(handle: usize) -> Self {
        Self { handle }
    }

    pub const fn handle(&self) -> usize {
        self.handle
    }
}

/// Decode `image` and run it to completion
pub fn load_and_run<R: Runtime>(
    runtime: &mut RuntimeContext<R>,
    image: &ProgramImage<'_>,
) -> Result<(), ExecutionFault<R::Fault>> {
    let context = runtime.new_context();
    let function = runtime
        .decode(&context, image.payload)
        .map_err(ExecutionFault::Decode)?;
    runtime.call0(function).map_err(ExecutionFault::Execute)
}
