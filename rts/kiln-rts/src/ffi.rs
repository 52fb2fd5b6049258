//! C ABI entry points for the Kiln runtime.
//!
//! These functions are called by compiled Kiln programs. They provide the
//! interface between generated C code and the Rust runtime.
//!
//! # Calling Convention
//!
//! All functions use the C calling convention and are `no_mangle` to
//! ensure stable symbol names for linking.
//!
//! # Error Slots
//!
//! A fallible entry point returns a `c_int` status and takes one
//! `*mut KilnErrorValue` per error type it can raise, in a fixed order.
//! Status 0 means success and the result was written to `out`. A non-zero
//! status is the 1-based position of the slot that was filled. Raising an
//! error the caller supplied no slot for ends the process.
//!
//! # Strings
//!
//! Strings cross the boundary as [`KilnStr`] by value. Arguments are only
//! borrowed for the duration of the call. Results are owned by the caller
//! and released with [`kiln_str_delete`]; literals (`borrowed == true`) are
//! never freed.
//!
//! # Containers
//!
//! Arrays and vectors of any built-in element type are created from a type
//! name ([`kiln_array_new`], [`kiln_vec_new`]) and used through opaque
//! handles.

use std::ffi::{c_char, c_int, CStr};
use std::io::Write;
use std::ptr::{self, NonNull};

use kiln_rts_alloc::{ElemShape, Heap, Region};
use kiln_rts_core::{scalar, ErrorKind, GrowableVec, RtError, RtResult, Str, StrParts};
use parking_lot::Mutex;

use crate::{Runtime, RuntimeConfig};

mod containers;

pub use containers::*;

static RUNTIME: Mutex<Option<Runtime>> = parking_lot::const_mutex(None);

/// Heap of the running runtime, or the untracked system heap before
/// [`kiln_rts_init`] and after [`kiln_rts_shutdown`].
fn heap() -> Heap {
    RUNTIME
        .lock()
        .as_ref()
        .map_or_else(Heap::system, |runtime| runtime.heap().clone())
}

// ============================================================================
// ABI types
// ============================================================================

/// A string as generated code sees it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KilnStr {
    /// First byte; owned buffers are followed by a zero terminator.
    pub ptr: *const u8,
    /// Length in bytes, excluding the terminator.
    pub len: usize,
    /// Size of the owned buffer, or `len` for literals.
    pub cap: usize,
    /// Whether the bytes are a literal that must never be freed.
    pub borrowed: bool,
}

impl KilnStr {
    /// The empty literal.
    pub const EMPTY: Self = Self {
        ptr: ptr::null(),
        len: 0,
        cap: 0,
        borrowed: true,
    };

    fn export(s: Str) -> Self {
        match s.into_parts() {
            StrParts::Borrowed(bytes) => Self {
                ptr: bytes.as_ptr(),
                len: bytes.len(),
                cap: bytes.len(),
                borrowed: true,
            },
            StrParts::Owned { buf, len } => {
                let (ptr, cap, _shape) = buf.into_raw_parts();
                Self {
                    ptr: ptr.as_ptr(),
                    len,
                    cap,
                    borrowed: false,
                }
            }
        }
    }

    /// Borrowed view of `s`, valid while `s` is.
    fn borrow(s: &Str) -> Self {
        let bytes = s.as_bytes();
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
            cap: bytes.len(),
            borrowed: true,
        }
    }

    /// Borrow the bytes without taking ownership.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `len` bytes for as long as the result lives.
    unsafe fn view(self) -> Str {
        unsafe { Str::from_raw_borrowed(self.ptr, self.len) }
    }

    /// Take ownership back from generated code.
    ///
    /// # Safety
    ///
    /// An owned string must have come from [`KilnStr::export`] on a buffer
    /// allocated from `heap`, and must not be used again afterwards.
    unsafe fn import(self, heap: &Heap) -> Str {
        match NonNull::new(self.ptr.cast_mut()) {
            Some(ptr) if !self.borrowed => {
                let buf = unsafe { Region::from_raw_parts(heap, ptr, self.cap, ElemShape::RAW) };
                match Str::from_parts(StrParts::Owned { buf, len: self.len }) {
                    Ok(s) => s,
                    Err(err) => kiln_rts_alloc::fatal!("kiln_str: ", err.message()),
                }
            }
            _ => unsafe { self.view() },
        }
    }
}

/// Payload written into an error slot.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KilnErrorValue {
    /// Owned error message.
    pub msg: KilnStr,
}

/// Opaque vector of strings returned by [`kiln_str_split`].
pub type KilnStrVec = GrowableVec<Str>;

type Slot = (ErrorKind, *mut KilnErrorValue);

/// Write `err` into the first slot designated for its kind.
///
/// Returns the slot's 1-based ordinal. Fatal when no slot matches.
unsafe fn deliver(err: RtError, slots: &[Slot]) -> c_int {
    let kind = err.kind();
    let Some(index) = slots
        .iter()
        .position(|(slot_kind, slot)| *slot_kind == kind && !slot.is_null())
    else {
        kiln_rts_alloc::fatal!(format!("unhandled {kind:?}: "), err.message());
    };

    let msg = match Str::from_bytes(&heap(), err.message().as_bytes()) {
        Ok(msg) => KilnStr::export(msg),
        Err(alloc) => kiln_rts_alloc::fatal!(err.message(), " (", alloc.message(), ")"),
    };
    tracing::debug!(?kind, slot = index + 1, "error delivered");
    // Safety: non-null and valid for writes per the caller's contract.
    unsafe { slots[index].1.write(KilnErrorValue { msg }) };
    index as c_int + 1
}

/// Write a success value to `out`, or deliver the error.
unsafe fn finish<T>(result: RtResult<T>, out: *mut T, slots: &[Slot]) -> c_int {
    match result {
        Ok(value) => {
            if !out.is_null() {
                unsafe { out.write(value) };
            }
            0
        }
        Err(err) => unsafe { deliver(err, slots) },
    }
}

unsafe fn finish_str(result: RtResult<Str>, out: *mut KilnStr, slots: &[Slot]) -> c_int {
    if out.is_null() {
        // Nobody takes the string; let it drop here.
        return unsafe { finish(result.map(drop), ptr::null_mut(), slots) };
    }
    unsafe { finish(result.map(KilnStr::export), out, slots) }
}

unsafe fn views(args: *const KilnStr, count: usize) -> Vec<Str> {
    if args.is_null() || count == 0 {
        return Vec::new();
    }
    let args = unsafe { std::slice::from_raw_parts(args, count) };
    args.iter().map(|arg| unsafe { arg.view() }).collect()
}

unsafe fn collect_args(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    let count = usize::try_from(argc).unwrap_or(0);
    if argv.is_null() {
        return Vec::new();
    }
    (0..count)
        .filter_map(|i| {
            let arg = unsafe { *argv.add(i) };
            (!arg.is_null()).then(|| unsafe { CStr::from_ptr(arg) }.to_string_lossy().into_owned())
        })
        .collect()
}

fn negative_as(op: &str, what: &str, value: i64) -> RtError {
    RtError::index(format!("{op}: {what} {value} cannot be negative"))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Run a lifecycle step, keeping panics from unwinding into C.
fn guarded(op: &str, step: impl FnOnce() + std::panic::UnwindSafe) -> bool {
    let finished = std::panic::catch_unwind(step).is_ok();
    if !finished {
        tracing::error!("{op} panicked; the runtime state is unchanged");
    }
    finished
}

/// Initialize the Kiln runtime with command line arguments.
///
/// `--mem-report` is removed from the arguments and turns on allocation
/// tracking. Calling this twice keeps the first runtime.
///
/// # Safety
///
/// `argv` must be a valid pointer to `argc` null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn kiln_rts_init(argc: c_int, argv: *const *const c_char) {
    guarded("kiln_rts_init", || {
        let args = unsafe { collect_args(argc, argv) };
        start_runtime(RuntimeConfig::from_args(args));
    });
}

fn start_runtime(base: RuntimeConfig) {
    let (config, env_error) = match base.clone().with_env() {
        Ok(config) => (config, None),
        Err(err) => (base, Some(err)),
    };

    let mut slot = RUNTIME.lock();
    if slot.is_some() {
        tracing::warn!("kiln_rts_init called twice; keeping the running runtime");
        return;
    }
    let runtime = Runtime::start(config);
    if let Some(err) = env_error {
        tracing::warn!("{err}; using the default log level");
    }
    *slot = Some(runtime);
}

/// Shut the runtime down, printing the leak summary under `--mem-report`.
#[no_mangle]
pub extern "C" fn kiln_rts_shutdown() {
    guarded("kiln_rts_shutdown", || {
        let runtime = RUNTIME.lock().take();
        if let Some(runtime) = runtime {
            runtime.shutdown();
        }
    });
}

/// Shut down and exit the process with `status`.
#[no_mangle]
pub extern "C" fn kiln_exit(status: c_int) -> ! {
    kiln_rts_shutdown();
    let _ = std::io::stdout().flush();
    std::process::exit(status)
}

/// Number of program arguments, runtime flags removed.
#[no_mangle]
pub extern "C" fn kiln_rts_argc() -> i64 {
    RUNTIME
        .lock()
        .as_ref()
        .map_or(0, |runtime| runtime.args().len() as i64)
}

/// Owned copy of program argument `index`.
///
/// Slots: index error, allocation error.
///
/// # Safety
///
/// Pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_rts_arg(
    out: *mut KilnStr,
    err_index: *mut KilnErrorValue,
    err_alloc: *mut KilnErrorValue,
    index: i64,
) -> c_int {
    let heap = heap();
    let arg = {
        let runtime = RUNTIME.lock();
        let args = runtime.as_ref().map_or(&[][..], |rt| rt.args());
        usize::try_from(index)
            .ok()
            .and_then(|i| args.get(i))
            .map(|arg| arg.clone().into_bytes())
            .ok_or_else(|| {
                RtError::index(format!(
                    "kiln_rts_arg: index {index} out of bounds for length {}",
                    args.len()
                ))
            })
    };
    let result = arg.and_then(|bytes| Str::from_bytes(&heap, &bytes));
    let slots = [
        (ErrorKind::IndexOutOfBounds, err_index),
        (ErrorKind::AllocFailure, err_alloc),
    ];
    unsafe { finish_str(result, out, &slots) }
}

/// Print `loc` and every message, then exit with status 1.
///
/// # Safety
///
/// `loc` and the `count` strings at `msgs` must be valid.
#[no_mangle]
pub unsafe extern "C" fn kiln_panic(loc: KilnStr, msgs: *const KilnStr, count: usize) -> ! {
    let location = unsafe { loc.view() };
    let messages = unsafe { views(msgs, count) };
    let messages: Vec<&[u8]> = messages.iter().map(Str::as_bytes).collect();
    kiln_rts_alloc::fatal::fatal_bytes(location.as_bytes(), &messages)
}

// ============================================================================
// Raw memory
// ============================================================================

/// Allocate `size` zeroed bytes.
///
/// Slots: allocation error.
///
/// # Safety
///
/// Pointers must be null or valid for writes. The block must be released
/// with [`kiln_free`] and the same size.
#[no_mangle]
pub unsafe extern "C" fn kiln_malloc(
    out: *mut *mut u8,
    err_alloc: *mut KilnErrorValue,
    size: i64,
) -> c_int {
    let result = usize::try_from(size)
        .map_err(|_| RtError::alloc(format!("malloc: invalid size {size}")))
        .and_then(|size| {
            Region::new_by_size(&heap(), size).map_err(|e| RtError::from(e).context("malloc"))
        })
        .map(|region| region.into_raw_parts().0.as_ptr());
    unsafe { finish(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Release a block from [`kiln_malloc`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must come from `kiln_malloc(size)` and not have been freed.
#[no_mangle]
pub unsafe extern "C" fn kiln_free(ptr: *mut u8, size: i64) {
    let (Some(ptr), Ok(size)) = (NonNull::new(ptr), usize::try_from(size)) else {
        return;
    };
    unsafe { Region::from_raw_parts(&heap(), ptr, size, ElemShape::RAW) }.delete();
}

/// Byte size of a built-in type. Unknown names are fatal.
///
/// # Safety
///
/// `type_name` must be a valid string.
#[no_mangle]
pub unsafe extern "C" fn kiln_size_of(type_name: KilnStr) -> i64 {
    let name = unsafe { type_name.view() }.to_string();
    ElemShape::named(&name).size as i64
}

/// Allocate `count` zeroed elements of a built-in type.
///
/// Slots: allocation error.
///
/// # Safety
///
/// As for [`kiln_malloc`]; release with [`kiln_free_array`].
#[no_mangle]
pub unsafe extern "C" fn kiln_alloc_array(
    out: *mut *mut u8,
    err_alloc: *mut KilnErrorValue,
    type_name: KilnStr,
    count: i64,
) -> c_int {
    let name = unsafe { type_name.view() }.to_string();
    let result = usize::try_from(count)
        .map_err(|_| RtError::alloc(format!("alloc_array: invalid count {count}")))
        .and_then(|count| {
            Region::new_array(&heap(), &name, count)
                .map_err(|e| RtError::from(e).context("alloc_array"))
        })
        .map(|region| region.into_raw_parts().0.as_ptr());
    unsafe { finish(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Release a block from [`kiln_alloc_array`]. Null is ignored.
///
/// # Safety
///
/// Arguments must match the allocating call.
#[no_mangle]
pub unsafe extern "C" fn kiln_free_array(ptr: *mut u8, type_name: KilnStr, count: i64) {
    let (Some(ptr), Ok(count)) = (NonNull::new(ptr), usize::try_from(count)) else {
        return;
    };
    let shape = ElemShape::named(&unsafe { type_name.view() }.to_string());
    let size = shape.size.saturating_mul(count);
    unsafe { Region::from_raw_parts(&heap(), ptr, size, shape) }.delete();
}

// ============================================================================
// Strings
// ============================================================================

/// Wrap a null-terminated literal without copying.
///
/// # Safety
///
/// `s` must be null or a null-terminated string that outlives every use of
/// the result.
#[no_mangle]
pub unsafe extern "C" fn kiln_str_from_literal(s: *const c_char) -> KilnStr {
    if s.is_null() {
        return KilnStr::EMPTY;
    }
    let bytes = unsafe { CStr::from_ptr(s) }.to_bytes();
    KilnStr {
        ptr: bytes.as_ptr(),
        len: bytes.len(),
        cap: bytes.len(),
        borrowed: true,
    }
}

/// Release an owned string. Literals are left alone.
///
/// # Safety
///
/// `s` must be a string returned by this runtime and not released before.
#[no_mangle]
pub unsafe extern "C" fn kiln_str_delete(s: KilnStr) {
    unsafe { s.import(&heap()) }.delete();
}

/// Owned copy of `s`.
///
/// Slots: allocation error.
///
/// # Safety
///
/// Strings must be valid; pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_str_clone(
    out: *mut KilnStr,
    err_alloc: *mut KilnErrorValue,
    s: KilnStr,
) -> c_int {
    let result = unsafe { s.view() }.clone_in(&heap());
    unsafe { finish_str(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// `a` followed by `b`.
///
/// Slots: I64 overflow, allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_concat(
    out: *mut KilnStr,
    err_overflow: *mut KilnErrorValue,
    err_alloc: *mut KilnErrorValue,
    a: KilnStr,
    b: KilnStr,
) -> c_int {
    let result = Str::concat(&heap(), &unsafe { a.view() }, &unsafe { b.view() });
    let slots = [
        (ErrorKind::I64Overflow, err_overflow),
        (ErrorKind::AllocFailure, err_alloc),
    ];
    unsafe { finish_str(result, out, &slots) }
}

/// `prefix` followed by the `count` strings at `args`.
///
/// Slots: I64 overflow, index error, allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`]; `args` must hold `count` strings.
#[no_mangle]
pub unsafe extern "C" fn kiln_str_format(
    out: *mut KilnStr,
    err_overflow: *mut KilnErrorValue,
    err_index: *mut KilnErrorValue,
    err_alloc: *mut KilnErrorValue,
    prefix: KilnStr,
    args: *const KilnStr,
    count: usize,
) -> c_int {
    let args = unsafe { views(args, count) };
    let result = Str::format(&heap(), &unsafe { prefix.view() }, &args);
    let slots = [
        (ErrorKind::I64Overflow, err_overflow),
        (ErrorKind::IndexOutOfBounds, err_index),
        (ErrorKind::AllocFailure, err_alloc),
    ];
    unsafe { finish_str(result, out, &slots) }
}

/// Bytes `[start, end)` of `s`.
///
/// Slots: index error, allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_get_substr(
    out: *mut KilnStr,
    err_index: *mut KilnErrorValue,
    err_alloc: *mut KilnErrorValue,
    s: KilnStr,
    start: i64,
    end: i64,
) -> c_int {
    let result = unsafe { s.view() }.get_substr(&heap(), start, end);
    let slots = [
        (ErrorKind::IndexOutOfBounds, err_index),
        (ErrorKind::AllocFailure, err_alloc),
    ];
    unsafe { finish_str(result, out, &slots) }
}

/// The byte at `pos` as a one-byte string.
///
/// Slots: index error, allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_get_char(
    out: *mut KilnStr,
    err_index: *mut KilnErrorValue,
    err_alloc: *mut KilnErrorValue,
    s: KilnStr,
    pos: i64,
) -> c_int {
    let result = unsafe { s.view() }.get_char(&heap(), pos);
    let slots = [
        (ErrorKind::IndexOutOfBounds, err_index),
        (ErrorKind::AllocFailure, err_alloc),
    ];
    unsafe { finish_str(result, out, &slots) }
}

/// Replace every occurrence of `from` with `to`.
///
/// Slots: allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_replace(
    out: *mut KilnStr,
    err_alloc: *mut KilnErrorValue,
    s: KilnStr,
    from: KilnStr,
    to: KilnStr,
) -> c_int {
    let (s, from, to) = unsafe { (s.view(), from.view(), to.view()) };
    let result = s.replace(&heap(), &from, &to);
    unsafe { finish_str(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Replace at most `n` occurrences of `from`. Negative `n` replaces nothing.
///
/// Slots: allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_replacen(
    out: *mut KilnStr,
    err_alloc: *mut KilnErrorValue,
    s: KilnStr,
    from: KilnStr,
    to: KilnStr,
    n: i64,
) -> c_int {
    let (s, from, to) = unsafe { (s.view(), from.view(), to.view()) };
    let n = usize::try_from(n).unwrap_or(0);
    let result = s.replacen(&heap(), &from, &to, n);
    unsafe { finish_str(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// ASCII lowercase copy of `s`.
///
/// Slots: allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_to_lowercase(
    out: *mut KilnStr,
    err_alloc: *mut KilnErrorValue,
    s: KilnStr,
) -> c_int {
    let result = unsafe { s.view() }.to_lowercase(&heap());
    unsafe { finish_str(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

unsafe fn step(s: *mut KilnStr, err_alloc: *mut KilnErrorValue, up: bool) -> c_int {
    if s.is_null() {
        return 0;
    }
    let heap = heap();
    // Safety: `s` is valid per the caller's contract and rewritten below.
    let mut value = unsafe { s.read().import(&heap) };
    let result = if up { value.inc(&heap) } else { value.dec(&heap) };
    unsafe { s.write(KilnStr::export(value)) };
    unsafe { finish(result, ptr::null_mut(), &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Increment the byte of a one-byte string in place, wrapping.
///
/// Slots: allocation error.
///
/// # Safety
///
/// `s` must point to a string returned by this runtime or a literal.
#[no_mangle]
pub unsafe extern "C" fn kiln_str_inc(s: *mut KilnStr, err_alloc: *mut KilnErrorValue) -> c_int {
    unsafe { step(s, err_alloc, true) }
}

/// Decrement the byte of a one-byte string in place, wrapping.
///
/// Slots: allocation error.
///
/// # Safety
///
/// As for [`kiln_str_inc`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_dec(s: *mut KilnStr, err_alloc: *mut KilnErrorValue) -> c_int {
    unsafe { step(s, err_alloc, false) }
}

macro_rules! str_query {
    ($(#[$doc:meta])* $name:ident($($arg:ident),+) -> $ret:ty = |$($bind:ident),+| $body:expr) => {
        $(#[$doc])*
        ///
        /// # Safety
        ///
        /// Every string argument must be valid.
        #[no_mangle]
        pub unsafe extern "C" fn $name($($arg: KilnStr),+) -> $ret {
            $(let $bind = unsafe { $arg.view() };)+
            $body
        }
    };
}

str_query!(
    /// Length of `s` in bytes.
    kiln_str_len(s) -> i64 = |s| s.len() as i64
);
str_query!(
    /// Bytewise equality.
    kiln_str_eq(a, b) -> bool = |a, b| a == b
);
str_query!(
    /// Three-way comparison: -1, 0 or 1.
    kiln_str_cmp(a, b) -> c_int = |a, b| a.cmp(&b) as c_int
);
str_query!(
    /// Whether `a < b`.
    kiln_str_lt(a, b) -> bool = |a, b| a < b
);
str_query!(
    /// Whether `a > b`.
    kiln_str_gt(a, b) -> bool = |a, b| a > b
);
str_query!(
    /// Whether `a <= b`.
    kiln_str_lteq(a, b) -> bool = |a, b| a.lteq(&b)
);
str_query!(
    /// Whether `a >= b`.
    kiln_str_gteq(a, b) -> bool = |a, b| a.gteq(&b)
);
str_query!(
    /// First index of `needle`, or -1.
    kiln_str_find(s, needle) -> i64 = |s, needle| s.find(&needle)
);
str_query!(
    /// Last index of `needle`, or -1.
    kiln_str_rfind(s, needle) -> i64 = |s, needle| s.rfind(&needle)
);
str_query!(
    /// Whether `needle` occurs in `s`.
    kiln_str_contains(s, needle) -> bool = |s, needle| s.contains(&needle)
);
str_query!(
    /// Whether `s` begins with `prefix`.
    kiln_str_starts_with(s, prefix) -> bool = |s, prefix| s.starts_with(&prefix)
);
str_query!(
    /// Whether `s` ends with `suffix`.
    kiln_str_ends_with(s, suffix) -> bool = |s, suffix| s.ends_with(&suffix)
);
str_query!(
    /// Whether `s` is non-empty and all `A` through `Z`.
    kiln_str_is_uppercase(s) -> bool = |s| s.is_uppercase()
);
str_query!(
    /// 64-bit FNV-1a hash.
    kiln_str_hash(s) -> u64 = |s| s.hash()
);
str_query!(
    /// Decimal value of `s`, parsed like `strtoll`.
    kiln_i64_from_str(s) -> i64 = |s| s.to_i64()
);

/// Byte at `index`, or 0 when out of range.
///
/// # Safety
///
/// `s` must be valid.
#[no_mangle]
pub unsafe extern "C" fn kiln_str_char_at(s: KilnStr, index: i64) -> u8 {
    unsafe { s.view() }.char_at(index)
}

/// Split `s` on `delimiter` into a new string vector.
///
/// Slots: allocation error.
///
/// # Safety
///
/// As for [`kiln_str_clone`]; release the vector with
/// [`kiln_strvec_delete`].
#[no_mangle]
pub unsafe extern "C" fn kiln_str_split(
    out: *mut *mut KilnStrVec,
    err_alloc: *mut KilnErrorValue,
    s: KilnStr,
    delimiter: KilnStr,
) -> c_int {
    let (s, delimiter) = unsafe { (s.view(), delimiter.view()) };
    let result = s
        .split(&heap(), &delimiter)
        .map(|parts| Box::into_raw(Box::new(parts)));
    unsafe { finish(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Number of strings in `vec`.
///
/// # Safety
///
/// `vec` must be null or come from [`kiln_str_split`].
#[no_mangle]
pub unsafe extern "C" fn kiln_strvec_len(vec: *const KilnStrVec) -> i64 {
    unsafe { vec.as_ref() }.map_or(0, |vec| vec.len() as i64)
}

/// Borrow element `index` of `vec`. The result is valid until the vector
/// is deleted and must not be passed to [`kiln_str_delete`].
///
/// Slots: index error.
///
/// # Safety
///
/// As for [`kiln_strvec_len`]; `out` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_strvec_get(
    out: *mut KilnStr,
    err_index: *mut KilnErrorValue,
    vec: *const KilnStrVec,
    index: i64,
) -> c_int {
    let result = match unsafe { vec.as_ref() } {
        None => Err(RtError::index("kiln_strvec_get: null vector")),
        Some(_) if index < 0 => Err(negative_as("kiln_strvec_get", "index", index)),
        Some(vec) => vec.get(index as usize).map(KilnStr::borrow),
    };
    unsafe { finish(result, out, &[(ErrorKind::IndexOutOfBounds, err_index)]) }
}

/// Release a vector from [`kiln_str_split`] and every string in it.
///
/// # Safety
///
/// `vec` must be null or come from [`kiln_str_split`], not deleted before.
#[no_mangle]
pub unsafe extern "C" fn kiln_strvec_delete(vec: *mut KilnStrVec) {
    if !vec.is_null() {
        drop(unsafe { Box::from_raw(vec) });
    }
}

// ============================================================================
// Scalars
// ============================================================================

/// Decimal rendering of `value`.
///
/// Slots: allocation error.
///
/// # Safety
///
/// Pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_i64_to_str(
    out: *mut KilnStr,
    err_alloc: *mut KilnErrorValue,
    value: i64,
) -> c_int {
    let result = scalar::i64_to_str(&heap(), value);
    unsafe { finish_str(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Decimal rendering of a byte.
///
/// Slots: allocation error.
///
/// # Safety
///
/// Pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_u8_to_str(
    out: *mut KilnStr,
    err_alloc: *mut KilnErrorValue,
    value: u8,
) -> c_int {
    let result = scalar::u8_to_str(&heap(), value);
    unsafe { finish_str(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Narrow an `I64` to a `U8`.
///
/// Slots: U8 overflow.
///
/// # Safety
///
/// Pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_u8_from_i64(
    out: *mut u8,
    err_overflow: *mut KilnErrorValue,
    value: i64,
) -> c_int {
    let result = scalar::u8_from_i64(value);
    unsafe { finish(result, out, &[(ErrorKind::U8Overflow, err_overflow)]) }
}

/// Parse a `U8` from a decimal string.
///
/// Slots: U8 overflow.
///
/// # Safety
///
/// `s` must be valid; pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_u8_from_str(
    out: *mut u8,
    err_overflow: *mut KilnErrorValue,
    s: KilnStr,
) -> c_int {
    let result = scalar::u8_from_str(&unsafe { s.view() });
    unsafe { finish(result, out, &[(ErrorKind::U8Overflow, err_overflow)]) }
}

/// Checked byte addition.
///
/// Slots: U8 overflow.
///
/// # Safety
///
/// Pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_u8_add(
    out: *mut u8,
    err_overflow: *mut KilnErrorValue,
    a: u8,
    b: u8,
) -> c_int {
    let result = scalar::u8_add(a, b);
    unsafe { finish(result, out, &[(ErrorKind::U8Overflow, err_overflow)]) }
}

/// Checked integer division.
///
/// Slots: divide-by-zero, I64 overflow.
///
/// # Safety
///
/// Pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_safe_div(
    out: *mut i64,
    err_zero: *mut KilnErrorValue,
    err_overflow: *mut KilnErrorValue,
    a: i64,
    b: i64,
) -> c_int {
    let slots = [
        (ErrorKind::DivideByZero, err_zero),
        (ErrorKind::I64Overflow, err_overflow),
    ];
    unsafe { finish(scalar::safe_div(a, b), out, &slots) }
}

/// Checked integer remainder.
///
/// Slots: divide-by-zero, I64 overflow.
///
/// # Safety
///
/// Pointers must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_safe_rem(
    out: *mut i64,
    err_zero: *mut KilnErrorValue,
    err_overflow: *mut KilnErrorValue,
    a: i64,
    b: i64,
) -> c_int {
    let slots = [
        (ErrorKind::DivideByZero, err_zero),
        (ErrorKind::I64Overflow, err_overflow),
    ];
    unsafe { finish(scalar::safe_rem(a, b), out, &slots) }
}

// ============================================================================
// Output
// ============================================================================

fn write_all(args: &[Str], newline: bool) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for arg in args {
        let _ = out.write_all(arg.as_bytes());
    }
    if newline {
        let _ = out.write_all(b"\n");
    }
    let _ = out.flush();
}

/// Write the `count` strings at `args` to stdout.
///
/// # Safety
///
/// `args` must be null or hold `count` valid strings.
#[no_mangle]
pub unsafe extern "C" fn kiln_print(args: *const KilnStr, count: usize) {
    write_all(&unsafe { views(args, count) }, false);
}

/// Write the `count` strings at `args` to stdout, then a newline.
///
/// # Safety
///
/// As for [`kiln_print`].
#[no_mangle]
pub unsafe extern "C" fn kiln_println(args: *const KilnStr, count: usize) {
    write_all(&unsafe { views(args, count) }, true);
}
