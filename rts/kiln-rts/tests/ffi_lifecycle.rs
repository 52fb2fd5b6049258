//! The C ABI driven the way a generated program drives it.
//!
//! Everything lives in one test: the runtime behind the ABI is process-wide.

use kiln_rts::ffi::*;
use std::ffi::{c_char, c_void, CString};
use std::ptr;

fn lit(s: &'static [u8]) -> KilnStr {
    KilnStr {
        ptr: s.as_ptr(),
        len: s.len(),
        cap: s.len(),
        borrowed: true,
    }
}

fn bytes(s: KilnStr) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(s.ptr, s.len) }.to_vec()
}

fn no_error() -> KilnErrorValue {
    KilnErrorValue {
        msg: KilnStr::EMPTY,
    }
}

#[test]
fn program_lifecycle() {
    let args: Vec<CString> = ["prog", "--mem-report", "input.txt"]
        .into_iter()
        .map(|a| CString::new(a).unwrap())
        .collect();
    let argv: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
    unsafe { kiln_rts_init(argv.len() as i32, argv.as_ptr()) };

    // Runtime flags are hidden from the program.
    assert_eq!(kiln_rts_argc(), 2);
    let mut arg = KilnStr::EMPTY;
    let (mut err_index, mut err_alloc) = (no_error(), no_error());
    assert_eq!(unsafe { kiln_rts_arg(&mut arg, &mut err_index, &mut err_alloc, 1) }, 0);
    assert_eq!(bytes(arg), b"input.txt");
    unsafe { kiln_str_delete(arg) };

    assert_eq!(unsafe { kiln_rts_arg(&mut arg, &mut err_index, &mut err_alloc, 2) }, 1);
    unsafe { kiln_str_delete(err_index.msg) };

    // String work through the tracked heap.
    let mut joined = KilnStr::EMPTY;
    let (mut err_overflow, mut err_alloc) = (no_error(), no_error());
    let status = unsafe {
        kiln_str_concat(&mut joined, &mut err_overflow, &mut err_alloc, lit(b"a,b"), lit(b",c"))
    };
    assert_eq!(status, 0);

    let mut parts: *mut KilnStrVec = ptr::null_mut();
    assert_eq!(unsafe { kiln_str_split(&mut parts, &mut err_alloc, joined, lit(b",")) }, 0);
    assert_eq!(unsafe { kiln_strvec_len(parts) }, 3);

    let mut replaced = KilnStr::EMPTY;
    let status = unsafe {
        kiln_str_replacen(&mut replaced, &mut err_alloc, joined, lit(b","), lit(b";"), -3)
    };
    assert_eq!(status, 0);
    assert_eq!(bytes(replaced), b"a,b,c");

    unsafe {
        kiln_strvec_delete(parts);
        kiln_str_delete(replaced);
        kiln_str_delete(joined);
    }

    // Type-erased containers built from type names.
    let mut numbers: *mut KilnArray = ptr::null_mut();
    assert_eq!(unsafe { kiln_array_new(&mut numbers, &mut err_alloc, lit(b"I64"), 4) }, 0);
    let seven = 7i64;
    let seven_ptr: *const c_void = (&seven as *const i64).cast();
    let status = unsafe { kiln_array_set(&mut err_index, &mut err_alloc, numbers, 2, seven_ptr) };
    assert_eq!(status, 0);
    assert!(unsafe { kiln_array_contains(numbers, seven_ptr) });
    let mut read = 0i64;
    let read_ptr: *mut c_void = (&mut read as *mut i64).cast();
    assert_eq!(unsafe { kiln_array_get(read_ptr, &mut err_index, numbers, 2) }, 0);
    assert_eq!(read, 7);
    assert_eq!(unsafe { kiln_array_get(read_ptr, &mut err_index, numbers, -1) }, 1);
    assert_eq!(bytes(err_index.msg), b"Array.get: index -1 cannot be negative");
    unsafe {
        kiln_str_delete(err_index.msg);
        kiln_array_delete(numbers);
    }

    let words = unsafe { kiln_vec_new(lit(b"Str")) };
    for word in [lit(b"to"), lit(b"\xffbe")] {
        let word_ptr: *const c_void = (&word as *const KilnStr).cast();
        assert_eq!(unsafe { kiln_vec_push(&mut err_alloc, words, word_ptr) }, 0);
    }
    assert_eq!(unsafe { kiln_vec_len(words) }, 2);

    let mut listing = KilnStr::EMPTY;
    assert_eq!(unsafe { kiln_vec_to_str(&mut listing, &mut err_alloc, words) }, 0);
    assert_eq!(bytes(listing), b"[\"to\", \"\xffbe\"]");

    let mut first = KilnStr::EMPTY;
    let first_ptr: *mut c_void = (&mut first as *mut KilnStr).cast();
    assert_eq!(unsafe { kiln_vec_get(first_ptr, &mut err_index, words, 0) }, 0);
    assert!(first.borrowed);
    assert_eq!(bytes(first), b"to");

    let mut last = KilnStr::EMPTY;
    let last_ptr: *mut c_void = (&mut last as *mut KilnStr).cast();
    assert_eq!(unsafe { kiln_vec_pop(last_ptr, &mut err_index, words) }, 0);
    assert!(!last.borrowed);
    assert_eq!(bytes(last), b"\xffbe");
    unsafe {
        kiln_str_delete(last);
        kiln_str_delete(listing);
        kiln_vec_delete(words);
    }

    // Everything freed: the exit report is clean.
    kiln_rts_shutdown();
    assert_eq!(kiln_rts_argc(), 0);
}
