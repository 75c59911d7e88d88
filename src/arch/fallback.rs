//! Targets without a register capture routine
//!
//! No registers are captured. The stack pointer is approximated by the
//! address of a local, which sits below every caller frame.

pub const CAPTURED_REGISTERS: usize = 0;

#[inline(never)]
pub fn capture_registers(_regs: &mut [usize; CAPTURED_REGISTERS]) -> usize {
    let marker = 0usize;
    core::hint::black_box(&marker) as *const usize as usize
}
