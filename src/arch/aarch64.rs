//! AArch64 register capture (hosted development only)

use core::arch::asm;

/// x19-x28 plus the frame pointer
pub const CAPTURED_REGISTERS: usize = 11;

#[inline(never)]
pub fn capture_registers(regs: &mut [usize; CAPTURED_REGISTERS]) -> usize {
    let sp: usize;
    unsafe {
        asm!(
            "stp x19, x20, [{regs}]",
            "stp x21, x22, [{regs}, #16]",
            "stp x23, x24, [{regs}, #32]",
            "stp x25, x26, [{regs}, #48]",
            "stp x27, x28, [{regs}, #64]",
            "str x29, [{regs}, #80]",
            "mov {sp}, sp",
            regs = in(reg) regs.as_mut_ptr(),
            sp = out(reg) sp,
            options(nostack, preserves_flags),
        );
    }
    sp
}
