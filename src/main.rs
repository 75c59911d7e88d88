//! mpboot device binary
//!
//! Firmware jumps to `_boot` right after the code signature. From there the
//! boot sequencer runs the entry module of the linked bytecode bundle, or the
//! built-in demo program when none is linked, and never returns.

#![no_std]
#![no_main]

use core::arch::global_asm;
use core::panic::PanicInfo;
use core::slice;

use mpboot::boot::Boot;
use mpboot::bundle;
use mpboot::config::BootConfig;
use mpboot::error::TableError;
use mpboot::gate::JumpTable;
use mpboot::image::{
    words_to_le_bytes, CodeSignature, ProgramFlags, ProgramImage, ProgramOwner, SignatureHeader,
};
use mpboot::memory::{MemoryLayout, MemoryRegion, RegionPurpose};
use mpboot::runtime::micropython::MicroPython;
use mpboot::{arch, console, hal};

#[used]
#[link_section = ".code_signature"]
static CODE_SIG: CodeSignature = CodeSignature::new(SIGNATURE);

const SIGNATURE: SignatureHeader = SignatureHeader::new(ProgramOwner::PARTNER, ProgramFlags::EMPTY);

// SAFETY: the binary only runs on firmware that exposes the jump table at
// its fixed base
static GATE: JumpTable = unsafe { JumpTable::firmware() };

const CONFIG: BootConfig = BootConfig::new();

/// Prints F(0) through F(19)
const FIBONACCI: [u16; 67] = [
    0x064d, 0x1f00, 0x0106, 0x660c, 0x6269, 0x702e, 0x0079, 0x810f, 0x0629, 0x6966, 0x0062,
    0x6e02, 0x8100, 0x0577, 0x660c, 0x6269, 0x7b28, 0x297d, 0x3d20, 0x7b20, 0x007d, 0x6c82,
    0x0830, 0x8401, 0x2608, 0x0032, 0x0316, 0x4280, 0x5758, 0x0416, 0x0511, 0x0023, 0x0214,
    0x0411, 0x0311, 0x0411, 0x0134, 0x0236, 0x0134, 0x8159, 0x57e5, 0xd794, 0x2343, 0x5159,
    0x0163, 0x4882, 0x0e21, 0x0403, 0x2520, 0x2522, 0xb042, 0xd980, 0x4244, 0x6380, 0x81b0,
    0x44d9, 0x8142, 0x1263, 0xb003, 0xf381, 0x0134, 0x0312, 0x82b0, 0x34f3, 0xf201, 0x5163,
    0x0063,
];

static BUILTIN_PROGRAM: [u8; 134] = words_to_le_bytes(FIBONACCI);

unsafe extern "C" {
    static mut __bss_start: u8;
    static mut __bss_end: u8;
    static __stack_bottom: u8;
    static __stack_top: u8;
    static mut __heap_start: u8;
    static mut __heap_end: u8;
    static __bytecode_ram_start: u8;
    static __bytecode_ram_end: u8;
}

global_asm!(
    ".section .boot, \"ax\"",
    ".global _boot",
    "_boot:",
    "ldr sp, =__stack_top",
    "b startup",
);

fn link_layout() -> MemoryLayout {
    unsafe {
        MemoryLayout::new(
            MemoryRegion::new(
                &raw const __bss_start as usize,
                &raw const __bss_end as usize,
                RegionPurpose::ZeroInit,
            ),
            MemoryRegion::new(
                &raw const __stack_bottom as usize,
                &raw const __stack_top as usize,
                RegionPurpose::Stack,
            ),
            MemoryRegion::new(
                &raw const __heap_start as usize,
                &raw const __heap_end as usize,
                RegionPurpose::Heap,
            ),
        )
    }
}

/// Entry module of the linked bundle, or the built-in program
fn entry_payload() -> Result<&'static [u8], TableError> {
    let region = unsafe {
        MemoryRegion::new(
            &raw const __bytecode_ram_start as usize,
            &raw const __bytecode_ram_end as usize,
            RegionPurpose::Bytecode,
        )
    };
    // SAFETY: the linker reserves this range and nothing writes it at run time
    let linked = unsafe { slice::from_raw_parts(region.start as *const u8, region.len()) };

    bundle::select_entry(linked, &BUILTIN_PROGRAM)
}

#[no_mangle]
unsafe extern "C" fn startup() -> ! {
    let Ok(boot) = Boot::reset(&GATE, link_layout(), CONFIG) else {
        // no safe output path yet
        arch::halt()
    };

    let boot = unsafe { boot.zero_static() };
    console::install(&GATE, CONFIG.stdio_channel);

    let boot = boot.establish_stack();
    hal::install_root_scanner(boot.root_scanner());

    let runtime = match MicroPython::take() {
        Ok(runtime) => runtime,
        Err(err) => panic!("{err}"),
    };
    let boot = unsafe { boot.init_heap(runtime) }.init_runtime();

    let halted = match entry_payload() {
        Ok(payload) => boot.run_entry_program(&ProgramImage::new(SIGNATURE, payload)),
        Err(err) => boot.abort(err),
    };
    halted.shutdown_and_idle()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    mpboot::panic::device_panic(&GATE, CONFIG.stdio_channel, info)
}
