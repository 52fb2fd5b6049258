//! Type-erased arrays and vectors for generated code.
//!
//! A container is created from a type name and handed out as an opaque
//! pointer. Elements cross the boundary by pointer to a value of the
//! element's ABI type: `int64_t`, `uint8_t`, `bool` or [`KilnStr`].
//! Stored strings are always copies. `get` writes a borrowed view that is
//! valid until the element is replaced or the container is deleted; `pop`
//! hands over an owned string.

use std::ffi::{c_int, c_void};

use kiln_rts_alloc::{ElemShape, TypeTag};
use kiln_rts_core::{Array, Element, ErrorKind, GrowableVec, RtError, RtResult, Str};

use super::{finish, finish_str, heap, negative_as, KilnErrorValue, KilnStr};

/// An element type with a C representation.
trait AbiElement: Element {
    /// Read the value at `src`. Strings are borrowed, not copied.
    ///
    /// # Safety
    ///
    /// `src` must point to a valid value of the ABI type.
    unsafe fn read(src: *const c_void) -> Self;

    /// Write a view of `self` to `dst`.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of the ABI type.
    unsafe fn write_view(&self, dst: *mut c_void);

    /// Write `self` to `dst`, handing ownership to the caller.
    ///
    /// # Safety
    ///
    /// As for [`AbiElement::write_view`].
    unsafe fn write_owned(self, dst: *mut c_void);
}

macro_rules! scalar_abi {
    ($ty:ty) => {
        impl AbiElement for $ty {
            unsafe fn read(src: *const c_void) -> Self {
                unsafe { src.cast::<$ty>().read_unaligned() }
            }

            unsafe fn write_view(&self, dst: *mut c_void) {
                unsafe { dst.cast::<$ty>().write_unaligned(*self) }
            }

            unsafe fn write_owned(self, dst: *mut c_void) {
                unsafe { self.write_view(dst) }
            }
        }
    };
}

scalar_abi!(i64);
scalar_abi!(u8);

impl AbiElement for bool {
    unsafe fn read(src: *const c_void) -> Self {
        // Any non-zero byte is true.
        unsafe { src.cast::<u8>().read() != 0 }
    }

    unsafe fn write_view(&self, dst: *mut c_void) {
        unsafe { dst.cast::<u8>().write(u8::from(*self)) }
    }

    unsafe fn write_owned(self, dst: *mut c_void) {
        unsafe { self.write_view(dst) }
    }
}

impl AbiElement for Str {
    unsafe fn read(src: *const c_void) -> Self {
        unsafe { src.cast::<KilnStr>().read_unaligned().view() }
    }

    unsafe fn write_view(&self, dst: *mut c_void) {
        unsafe { dst.cast::<KilnStr>().write_unaligned(KilnStr::borrow(self)) }
    }

    unsafe fn write_owned(self, dst: *mut c_void) {
        unsafe { dst.cast::<KilnStr>().write_unaligned(KilnStr::export(self)) }
    }
}

/// Opaque fixed-length array returned by [`kiln_array_new`].
#[derive(Debug)]
pub enum KilnArray {
    /// `I64` elements.
    I64(Array<i64>),
    /// `U8` elements.
    U8(Array<u8>),
    /// `Bool` elements.
    Bool(Array<bool>),
    /// `Str` elements.
    Str(Array<Str>),
}

/// Opaque growable vector returned by [`kiln_vec_new`].
#[derive(Debug)]
pub enum KilnVec {
    /// `I64` elements.
    I64(GrowableVec<i64>),
    /// `U8` elements.
    U8(GrowableVec<u8>),
    /// `Bool` elements.
    Bool(GrowableVec<bool>),
    /// `Str` elements.
    Str(GrowableVec<Str>),
}

/// Run `$body` with `$inner` bound to the typed container behind `$value`.
macro_rules! with_elems {
    ($erased:ident, $value:expr, |$inner:ident| $body:expr) => {
        match $value {
            $erased::I64($inner) => $body,
            $erased::U8($inner) => $body,
            $erased::Bool($inner) => $body,
            $erased::Str($inner) => $body,
        }
    };
}

/// Element tag for a container type name. Unknown or unstorable names are
/// fatal.
unsafe fn element_tag(op: &str, type_name: KilnStr) -> TypeTag {
    let name = unsafe { type_name.view() };
    let name = String::from_utf8_lossy(name.as_bytes());
    match ElemShape::named(&name).tag {
        tag @ (TypeTag::I64 | TypeTag::U8 | TypeTag::Bool | TypeTag::Str) => tag,
        _ => kiln_rts_alloc::fatal!(op, ": '", name, "' cannot be stored in a container"),
    }
}

fn index_of(op: &str, index: i64) -> RtResult<usize> {
    usize::try_from(index).map_err(|_| negative_as(op, "index", index))
}

/// Store a copy of the value at `value` into the slot `set` selects.
unsafe fn store<T: AbiElement>(
    value: *const c_void,
    set: impl FnOnce(T) -> RtResult<()>,
) -> RtResult<()> {
    // Safety: valid per the caller's contract; strings are only viewed here.
    let view = unsafe { T::read(value) };
    set(view.clone_in(&heap())?)
}

unsafe fn holds<T: AbiElement>(value: *const c_void, contains: impl FnOnce(&T) -> bool) -> bool {
    contains(&unsafe { T::read(value) })
}

/// # Safety
///
/// `ptr` must be null or a live handle from this module.
unsafe fn handle<'a, T>(op: &str, ptr: *mut T) -> &'a mut T {
    match unsafe { ptr.as_mut() } {
        Some(handle) => handle,
        None => kiln_rts_alloc::fatal!(op, ": null container"),
    }
}

// ============================================================================
// Arrays
// ============================================================================

/// Allocate an array of `capacity` zero-valued elements of `type_name`.
///
/// Slots: allocation error.
///
/// # Safety
///
/// `type_name` must be valid; pointers must be null or valid for writes.
/// Release the array with [`kiln_array_delete`].
#[no_mangle]
pub unsafe extern "C" fn kiln_array_new(
    out: *mut *mut KilnArray,
    err_alloc: *mut KilnErrorValue,
    type_name: KilnStr,
    capacity: i64,
) -> c_int {
    let tag = unsafe { element_tag("Array.new", type_name) };
    let heap = heap();
    let result = usize::try_from(capacity)
        .map_err(|_| RtError::alloc(format!("Array.new: invalid capacity {capacity}")))
        .and_then(|capacity| match tag {
            TypeTag::I64 => Array::new(&heap, capacity).map(KilnArray::I64),
            TypeTag::U8 => Array::new(&heap, capacity).map(KilnArray::U8),
            TypeTag::Bool => Array::new(&heap, capacity).map(KilnArray::Bool),
            _ => Array::new(&heap, capacity).map(KilnArray::Str),
        })
        .map(|array| Box::into_raw(Box::new(array)));
    unsafe { finish(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Number of elements in `array`.
///
/// # Safety
///
/// `array` must be null or come from [`kiln_array_new`].
#[no_mangle]
pub unsafe extern "C" fn kiln_array_len(array: *const KilnArray) -> i64 {
    unsafe { array.as_ref() }.map_or(0, |array| with_elems!(KilnArray, array, |a| a.len() as i64))
}

/// Write element `index` to `out`.
///
/// Slots: index error.
///
/// # Safety
///
/// `array` must come from [`kiln_array_new`]; `out` must be null or valid
/// for writes of the element type.
#[no_mangle]
pub unsafe extern "C" fn kiln_array_get(
    out: *mut c_void,
    err_index: *mut KilnErrorValue,
    array: *mut KilnArray,
    index: i64,
) -> c_int {
    let array = unsafe { handle("Array.get", array) };
    let result = index_of("Array.get", index).and_then(|i| {
        with_elems!(KilnArray, array, |a| a.get(i).map(|value| {
            if !out.is_null() {
                unsafe { value.write_view(out) };
            }
        }))
    });
    unsafe { finish(result, std::ptr::null_mut(), &[(ErrorKind::IndexOutOfBounds, err_index)]) }
}

/// Store a copy of the value at `value` as element `index`.
///
/// Slots: index error, allocation error.
///
/// # Safety
///
/// `array` must come from [`kiln_array_new`]; `value` must point to a valid
/// value of the element type.
#[no_mangle]
pub unsafe extern "C" fn kiln_array_set(
    err_index: *mut KilnErrorValue,
    err_alloc: *mut KilnErrorValue,
    array: *mut KilnArray,
    index: i64,
    value: *const c_void,
) -> c_int {
    let array = unsafe { handle("Array.set", array) };
    let result = index_of("Array.set", index).and_then(|i| {
        with_elems!(KilnArray, array, |a| unsafe { store(value, |v| a.set(i, v)) })
    });
    let slots = [
        (ErrorKind::IndexOutOfBounds, err_index),
        (ErrorKind::AllocFailure, err_alloc),
    ];
    unsafe { finish(result, std::ptr::null_mut(), &slots) }
}

/// Whether `array` holds an element equal to the value at `value`.
///
/// # Safety
///
/// As for [`kiln_array_set`].
#[no_mangle]
pub unsafe extern "C" fn kiln_array_contains(array: *mut KilnArray, value: *const c_void) -> bool {
    let array = unsafe { handle("Array.contains", array) };
    with_elems!(KilnArray, array, |a| unsafe { holds(value, |v| a.contains(v)) })
}

/// Release an array and every element in it. Null is ignored.
///
/// # Safety
///
/// `array` must be null or come from [`kiln_array_new`], not deleted before.
#[no_mangle]
pub unsafe extern "C" fn kiln_array_delete(array: *mut KilnArray) {
    if !array.is_null() {
        drop(unsafe { Box::from_raw(array) });
    }
}

// ============================================================================
// Vectors
// ============================================================================

/// Create an empty vector of `type_name`. Nothing is allocated until the
/// first push.
///
/// # Safety
///
/// `type_name` must be valid. Release the vector with [`kiln_vec_delete`].
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_new(type_name: KilnStr) -> *mut KilnVec {
    let heap = heap();
    let vec = match unsafe { element_tag("Vec.new", type_name) } {
        TypeTag::I64 => KilnVec::I64(GrowableVec::new(&heap)),
        TypeTag::U8 => KilnVec::U8(GrowableVec::new(&heap)),
        TypeTag::Bool => KilnVec::Bool(GrowableVec::new(&heap)),
        _ => KilnVec::Str(GrowableVec::new(&heap)),
    };
    Box::into_raw(Box::new(vec))
}

/// Number of elements in `vec`.
///
/// # Safety
///
/// `vec` must be null or come from [`kiln_vec_new`].
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_len(vec: *const KilnVec) -> i64 {
    unsafe { vec.as_ref() }.map_or(0, |vec| with_elems!(KilnVec, vec, |v| v.len() as i64))
}

/// Current capacity of `vec`.
///
/// # Safety
///
/// As for [`kiln_vec_len`].
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_capacity(vec: *const KilnVec) -> i64 {
    unsafe { vec.as_ref() }.map_or(0, |vec| with_elems!(KilnVec, vec, |v| v.capacity() as i64))
}

/// Append a copy of the value at `value`.
///
/// Slots: allocation error.
///
/// # Safety
///
/// `vec` must come from [`kiln_vec_new`]; `value` must point to a valid
/// value of the element type.
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_push(
    err_alloc: *mut KilnErrorValue,
    vec: *mut KilnVec,
    value: *const c_void,
) -> c_int {
    let vec = unsafe { handle("Vec.push", vec) };
    let result = with_elems!(KilnVec, vec, |v| unsafe { store(value, |x| v.push(x)) });
    unsafe { finish(result, std::ptr::null_mut(), &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Write element `index` to `out`.
///
/// Slots: index error.
///
/// # Safety
///
/// `vec` must come from [`kiln_vec_new`]; `out` must be null or valid for
/// writes of the element type.
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_get(
    out: *mut c_void,
    err_index: *mut KilnErrorValue,
    vec: *mut KilnVec,
    index: i64,
) -> c_int {
    let vec = unsafe { handle("Vec.get", vec) };
    let result = index_of("Vec.get", index).and_then(|i| {
        with_elems!(KilnVec, vec, |v| v.get(i).map(|value| {
            if !out.is_null() {
                unsafe { value.write_view(out) };
            }
        }))
    });
    unsafe { finish(result, std::ptr::null_mut(), &[(ErrorKind::IndexOutOfBounds, err_index)]) }
}

/// Store a copy of the value at `value` as element `index`.
///
/// Slots: index error, allocation error.
///
/// # Safety
///
/// As for [`kiln_vec_push`].
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_set(
    err_index: *mut KilnErrorValue,
    err_alloc: *mut KilnErrorValue,
    vec: *mut KilnVec,
    index: i64,
    value: *const c_void,
) -> c_int {
    let vec = unsafe { handle("Vec.set", vec) };
    let result = index_of("Vec.set", index).and_then(|i| {
        with_elems!(KilnVec, vec, |v| unsafe { store(value, |x| v.set(i, x)) })
    });
    let slots = [
        (ErrorKind::IndexOutOfBounds, err_index),
        (ErrorKind::AllocFailure, err_alloc),
    ];
    unsafe { finish(result, std::ptr::null_mut(), &slots) }
}

/// Remove the last element and write it to `out`. A string popped this way
/// is owned by the caller.
///
/// Slots: index error.
///
/// # Safety
///
/// As for [`kiln_vec_get`].
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_pop(
    out: *mut c_void,
    err_index: *mut KilnErrorValue,
    vec: *mut KilnVec,
) -> c_int {
    let vec = unsafe { handle("Vec.pop", vec) };
    let result = with_elems!(KilnVec, vec, |v| v.pop().map(|value| {
        if !out.is_null() {
            unsafe { value.write_owned(out) };
        }
    }));
    unsafe { finish(result, std::ptr::null_mut(), &[(ErrorKind::IndexOutOfBounds, err_index)]) }
}

/// Whether `vec` holds an element equal to the value at `value`.
///
/// # Safety
///
/// As for [`kiln_vec_push`].
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_contains(vec: *mut KilnVec, value: *const c_void) -> bool {
    let vec = unsafe { handle("Vec.contains", vec) };
    with_elems!(KilnVec, vec, |v| unsafe { holds(value, |x| v.contains(x)) })
}

/// Render `vec` as `[a, b, c]`.
///
/// Slots: allocation error.
///
/// # Safety
///
/// `vec` must come from [`kiln_vec_new`]; `out` must be null or valid for
/// writes.
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_to_str(
    out: *mut KilnStr,
    err_alloc: *mut KilnErrorValue,
    vec: *mut KilnVec,
) -> c_int {
    let vec = unsafe { handle("Vec.to_str", vec) };
    let result = with_elems!(KilnVec, vec, |v| v.to_str(&heap()));
    unsafe { finish_str(result, out, &[(ErrorKind::AllocFailure, err_alloc)]) }
}

/// Release a vector and every element in it. Null is ignored.
///
/// # Safety
///
/// `vec` must be null or come from [`kiln_vec_new`], not deleted before.
#[no_mangle]
pub unsafe extern "C" fn kiln_vec_delete(vec: *mut KilnVec) {
    if !vec.is_null() {
        drop(unsafe { Box::from_raw(vec) });
    }
}
