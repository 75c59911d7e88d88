//! MicroPython binding
//!
//! Links against the prebuilt runtime archive. Every call that can raise is
//! made under an `nlr_push` frame, so a Python exception comes back as an
//! `Err` instead of a non-local jump through Rust frames.
//!
//! Struct layouts mirror `py/bc.h` and `py/nlr.h` for this port's
//! configuration (bytecode only, persistent code loading, no compiler).

use core::ffi::{c_char, c_uint, c_void, CStr};
use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use super::Runtime;
use crate::config::ENTRY_MODULE_NAME;
use crate::error::AlreadyInit;
use crate::gc::{RootCollector, StackTop, Word};
use crate::loader::ExecutionContext;
use crate::memory::MemoryRegion;

/// Register slots in `nlr_buf_t`, rounded up over every supported CPU
const NLR_REG_COUNT: usize = 16;

/// `mp_obj_t`
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obj(*mut c_void);

impl Obj {
    pub const NULL: Obj = Obj(ptr::null_mut());

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

#[repr(C)]
struct NlrBuf {
    prev: *mut NlrBuf,
    ret_val: *mut c_void,
    regs: [*mut c_void; NLR_REG_COUNT],
}

/// `mp_obj_module_t`, the head of every module context
#[repr(C)]
struct ModuleObj {
    _base: *const c_void,
    globals: *mut c_void,
}

/// `mp_compiled_module_t` without the save-side fields
#[repr(C)]
struct CompiledModule {
    context: *mut c_void,
    rc: *const c_void,
}

/// `mp_print_t`
#[repr(C)]
struct Print {
    data: *mut c_void,
    print_strn: unsafe extern "C" fn(data: *mut c_void, s: *const c_char, len: usize),
}

unsafe extern "C" {
    fn nlr_push(nlr: *mut NlrBuf) -> c_uint;
    fn nlr_pop();

    fn mp_stack_set_top(top: *mut c_void);
    fn gc_init(start: *mut c_void, end: *mut c_void);
    fn mp_init();

    fn gc_collect_start();
    fn gc_collect_root(ptrs: *mut *mut c_void, len: usize);
    fn gc_collect_end();

    fn qstr_from_str(s: *const c_char) -> usize;
    fn mp_obj_new_module(module_name: usize) -> Obj;
    fn mp_raw_code_load_mem(buf: *const u8, len: usize, cm: *mut CompiledModule);
    fn mp_make_function_from_proto_fun(
        proto_fun: *const c_void,
        context: *const c_void,
        def_args: *const Obj,
    ) -> Obj;
    fn mp_call_function_0(fun: Obj) -> Obj;

    fn mp_obj_get_type_str(obj: Obj) -> *const c_char;
    fn mp_obj_print_exception(print: *const Print, exc: Obj);

    static mp_plat_print: Print;

    /// The `globals()` builtin
    static mp_builtin_globals_obj: u8;
}

/// A Python exception caught at an `nlr_push` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exception(Obj);

impl Exception {
    pub fn obj(&self) -> Obj {
        self.0
    }

    fn type_name(&self) -> Option<&'static str> {
        if self.0.is_null() {
            return None;
        }
        let name = unsafe { mp_obj_get_type_str(self.0) };
        if name.is_null() {
            return None;
        }
        unsafe { CStr::from_ptr(name) }.to_str().ok()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "exception at {:p}", self.0 .0),
        }
    }
}

/// Run `f` under an `nlr_push` frame
///
/// `f` must only call into the runtime; a jump out of it skips Rust drops.
#[inline(never)]
fn protect<T>(f: impl FnOnce() -> T) -> Result<T, Exception> {
    let mut buf = NlrBuf {
        prev: ptr::null_mut(),
        ret_val: ptr::null_mut(),
        regs: [ptr::null_mut(); NLR_REG_COUNT],
    };

    unsafe {
        if nlr_push(&raw mut buf) == 0 {
            let value = f();
            nlr_pop();
            Ok(value)
        } else {
            let raised = ptr::read_volatile(&raw const buf.ret_val);
            Err(Exception(Obj(raised)))
        }
    }
}

static TAKEN: AtomicBool = AtomicBool::new(false);

/// The one MicroPython instance in this program
#[derive(Debug)]
pub struct MicroPython {
    // failure from `new_context`, raised again at `decode`
    pending: Option<Exception>,
    // runtime state is global and single-threaded
    _not_send: PhantomData<*mut ()>,
}

impl MicroPython {
    /// Claim the runtime
    ///
    /// Succeeds once per boot.
    pub fn take() -> Result<Self, AlreadyInit> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            return Err(AlreadyInit);
        }
        Ok(Self {
            pending: None,
            _not_send: PhantomData,
        })
    }
}

impl Runtime for MicroPython {
    type Function = Obj;
    type Fault = Exception;

    unsafe fn init_stack(&mut self, top: StackTop) {
        unsafe { mp_stack_set_top(top.addr() as *mut c_void) };
    }

    unsafe fn init_heap(&mut self, arena: MemoryRegion) {
        unsafe { gc_init(arena.start as *mut c_void, arena.end as *mut c_void) };
    }

    fn init(&mut self) {
        unsafe { mp_init() };
    }

    /// Module context whose globals are the runtime's global namespace
    ///
    /// Module-level stores in the entry program go to that namespace, so
    /// the functions it defines must look their globals up there too.
    fn new_context(&mut self) -> ExecutionContext {
        let module = protect(|| unsafe {
            let name = qstr_from_str(ENTRY_MODULE_NAME.as_ptr());
            let module = mp_obj_new_module(name);
            let globals_fn = Obj(&raw const mp_builtin_globals_obj as *mut c_void);
            let globals = mp_call_function_0(globals_fn);
            (*(module.0 as *mut ModuleObj)).globals = globals.0;
            module
        });

        match module {
            Ok(module) => ExecutionContext::new(module.0 as usize),
            Err(exc) => {
                self.pending = Some(exc);
                ExecutionContext::new(0)
            }
        }
    }

    fn decode(&mut self, context: &ExecutionContext, payload: &[u8]) -> Result<Obj, Exception> {
        if let Some(exc) = self.pending.take() {
            return Err(exc);
        }
        let context = context.handle() as *mut c_void;

        protect(|| unsafe {
            let mut compiled = CompiledModule {
                context,
                rc: ptr::null(),
            };
            mp_raw_code_load_mem(payload.as_ptr(), payload.len(), &raw mut compiled);
            mp_make_function_from_proto_fun(compiled.rc, context, ptr::null())
        })
    }

    fn call0(&mut self, function: Obj) -> Result<(), Exception> {
        protect(|| unsafe {
            mp_call_function_0(function);
        })
    }

    fn print_traceback(&mut self, fault: &Exception) {
        if !fault.0.is_null() {
            unsafe { mp_obj_print_exception(&raw const mp_plat_print, fault.0) };
        }
    }
}

/// The runtime's collector as seen by the root scanner
pub struct MpCollector;

impl RootCollector for MpCollector {
    fn collect_start(&mut self) {
        unsafe { gc_collect_start() };
    }

    fn collect_roots(&mut self, words: &[Word]) {
        unsafe { gc_collect_root(words.as_ptr() as *mut *mut c_void, words.len()) };
    }

    // the collector only reads the range, so no copy is needed
    unsafe fn collect_root_range(&mut self, start: *const Word, len: usize) {
        unsafe { gc_collect_root(start as *mut *mut c_void, len) };
    }

    fn collect_end(&mut self) {
        unsafe { gc_collect_end() };
    }
}
