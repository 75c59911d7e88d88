//! Hooks the MicroPython port calls back into
//!
//! The C side expects these symbols at link time. They forward to the boot
//! layer's root scanner and console.

use core::ffi::{c_char, c_int, c_void, CStr};

use spin::Once;

use crate::console;
use crate::gc::RootScanner;
use crate::runtime::micropython::MpCollector;

static ROOT_SCANNER: Once<RootScanner> = Once::new();

/// Make `scanner` the one used by `gc_collect`
///
/// Only the first call takes effect.
pub fn install_root_scanner(scanner: RootScanner) -> bool {
    let mut installed = false;
    ROOT_SCANNER.call_once(|| {
        installed = true;
        scanner
    });
    installed
}

#[no_mangle]
pub extern "C" fn gc_collect() {
    let Some(scanner) = ROOT_SCANNER.get() else {
        return;
    };
    // SAFETY: the scanner was built from the stack this code runs on
    if let Err(err) = unsafe { scanner.collect(&mut MpCollector) } {
        crate::println!("[GC] {err}");
    }
}

#[no_mangle]
pub unsafe extern "C" fn mp_hal_stdout_tx_strn_cooked(text: *const c_char, len: usize) {
    if text.is_null() || len == 0 {
        return;
    }
    let bytes = unsafe { core::slice::from_raw_parts(text as *const u8, len) };
    console::write(bytes);
}

/// An exception escaped every `nlr_push` frame
#[no_mangle]
pub extern "C" fn nlr_jump_fail(val: *mut c_void) -> ! {
    panic!("uncaught exception {val:p} with no handler");
}

unsafe fn c_str_or<'a>(ptr: *const c_char, default: &'a str) -> &'a str {
    if ptr.is_null() {
        return default;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap_or(default)
}

#[no_mangle]
pub unsafe extern "C" fn __assert_func(
    file: *const c_char,
    line: c_int,
    func: *const c_char,
    expr: *const c_char,
) -> ! {
    let (file, func, expr) = unsafe {
        (
            c_str_or(file, "?"),
            c_str_or(func, "?"),
            c_str_or(expr, "?"),
        )
    };
    panic!("runtime assertion `{expr}` failed in {func} at {file}:{line}");
}
