//! Paths that end the process.
//!
//! Each case re-runs this test binary with `KILN_FATAL_CASE` set, so the
//! child executes only `fatal_case_child`, which triggers the case and must
//! never return.

use kiln_rts::ffi::*;
use kiln_rts::{Runtime, RuntimeConfig};
use kiln_rts_alloc::Region;
use std::process::{Command, Output};
use std::ptr;

const CASE_ENV: &str = "KILN_FATAL_CASE";

fn lit(s: &'static [u8]) -> KilnStr {
    KilnStr {
        ptr: s.as_ptr(),
        len: s.len(),
        cap: s.len(),
        borrowed: true,
    }
}

fn run_case(case: &str) -> Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args(["--exact", "fatal_case_child", "--nocapture", "--test-threads=1"])
        .env(CASE_ENV, case)
        .output()
        .unwrap()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn assert_fatal(case: &str, expected: &[u8]) {
    let output = run_case(case);
    assert_eq!(output.status.code(), Some(1), "case {case}: {output:?}");
    assert!(
        contains(&output.stdout, expected),
        "case {case}: stdout was {:?}",
        String::from_utf8_lossy(&output.stdout)
    );
}

#[test]
fn fatal_case_child() {
    let Ok(case) = std::env::var(CASE_ENV) else {
        return;
    };
    match case.as_str() {
        "double_free" => {
            let runtime = Runtime::start(RuntimeConfig::from_args(["prog", "--mem-report"]));
            let (ptr, size, shape) = Region::new_by_size(runtime.heap(), 16)
                .unwrap()
                .into_raw_parts();
            unsafe {
                Region::from_raw_parts(runtime.heap(), ptr, size, shape).delete();
                Region::from_raw_parts(runtime.heap(), ptr, size, shape).delete();
            }
        }
        "unknown_type" => {
            unsafe { kiln_size_of(lit(b"F32")) };
        }
        "unstorable_type" => {
            unsafe { kiln_vec_new(lit(b"HeapEntry")) };
        }
        "unslotted_error" => {
            let mut out = 0i64;
            unsafe { kiln_safe_div(&mut out, ptr::null_mut(), ptr::null_mut(), 7, 0) };
        }
        "panic_bytes" => {
            let msgs = [lit(b"bad byte "), lit(b"\xff\xfe")];
            unsafe { kiln_panic(lit(b"main.kn:3: "), msgs.as_ptr(), msgs.len()) };
        }
        other => panic!("unknown fatal case {other}"),
    }
    unreachable!("fatal case {case} returned");
}

#[test]
fn double_free_under_mem_report_exits() {
    assert_fatal("double_free", b"heap ledger: double free or foreign pointer");
}

#[test]
fn unknown_type_name_exits() {
    assert_fatal("unknown_type", b"size_of: unknown type 'F32'");
}

#[test]
fn unstorable_container_type_exits() {
    assert_fatal(
        "unstorable_type",
        b"Vec.new: 'HeapEntry' cannot be stored in a container",
    );
}

#[test]
fn error_without_slot_exits() {
    assert_fatal("unslotted_error", b"unhandled DivideByZero: safe_div: 7 / 0");
}

#[test]
fn panic_writes_raw_bytes() {
    assert_fatal("panic_bytes", b"main.kn:3: bad byte \xff\xfe\n");
}
