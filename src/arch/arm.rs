//! 32-bit ARM (AAPCS) register capture

use core::arch::global_asm;

/// r4-r12 plus r13
pub const CAPTURED_REGISTERS: usize = 10;

global_asm!(
    ".syntax unified",
    ".arm",
    ".section .text.mpboot_capture_registers, \"ax\", %progbits",
    ".global mpboot_capture_registers",
    ".type mpboot_capture_registers, %function",
    "mpboot_capture_registers:",
    "str r4, [r0], #4",
    "str r5, [r0], #4",
    "str r6, [r0], #4",
    "str r7, [r0], #4",
    "str r8, [r0], #4",
    "str r9, [r0], #4",
    "str r10, [r0], #4",
    "str r11, [r0], #4",
    "str r12, [r0], #4",
    "str r13, [r0], #4",
    "mov r0, sp",
    "bx lr",
    ".size mpboot_capture_registers, . - mpboot_capture_registers",
);

unsafe extern "C" {
    fn mpboot_capture_registers(regs: *mut usize) -> usize;
}

/// Store callee-saved registers into `regs` and return the stack pointer
///
/// The routine touches no stack of its own, so the returned pointer is the
/// caller's stack pointer at the call.
#[inline(never)]
pub fn capture_registers(regs: &mut [usize; CAPTURED_REGISTERS]) -> usize {
    unsafe { mpboot_capture_registers(regs.as_mut_ptr()) }
}
