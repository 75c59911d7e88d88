//! x86_64 (System V) register capture (hosted development only)

use core::arch::asm;

/// rbx, rbp, r12-r15
pub const CAPTURED_REGISTERS: usize = 6;

#[inline(never)]
pub fn capture_registers(regs: &mut [usize; CAPTURED_REGISTERS]) -> usize {
    let sp: usize;
    unsafe {
        asm!(
            "mov [{regs}], rbx",
            "mov [{regs} + 8], rbp",
            "mov [{regs} + 16], r12",
            "mov [{regs} + 24], r13",
            "mov [{regs} + 32], r14",
            "mov [{regs} + 40], r15",
            "mov {sp}, rsp",
            regs = in(reg) regs.as_mut_ptr(),
            sp = out(reg) sp,
            options(nostack, preserves_flags),
        );
    }
    sp
}
