//! Byte strings.
//!
//! A [`Str`] is either a borrowed literal (no allocation at all) or an owned
//! heap buffer of `len + 1` bytes whose last byte is always zero, so the
//! contents can be handed to C as a terminated string. Content is raw
//! bytes; no encoding is assumed.
//!
//! Operations that produce new strings take the [`Heap`] to allocate from
//! explicitly and never mutate their inputs.

mod edit;
mod search;

use crate::{IntDomain, RtError, RtResult};
use kiln_rts_alloc::{Heap, Region};
use std::cmp::Ordering;

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

enum Repr {
    Borrowed(&'static [u8]),
    Owned { buf: Region, len: usize },
}

/// A length-delimited byte string.
pub struct Str {
    repr: Repr,
}

/// The raw pieces of a [`Str`], for moving strings across the C ABI.
pub enum StrParts {
    /// Literal contents that are never freed.
    Borrowed(&'static [u8]),
    /// An owned buffer of at least `len + 1` bytes.
    Owned {
        /// Backing buffer.
        buf: Region,
        /// Content length, excluding the terminator.
        len: usize,
    },
}

impl Str {
    /// Wrap a literal without allocating.
    #[must_use]
    pub const fn lit(s: &'static str) -> Self {
        Self::from_static(s.as_bytes())
    }

    /// Wrap static bytes without allocating.
    #[must_use]
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self {
            repr: Repr::Borrowed(bytes),
        }
    }

    /// Wrap caller-owned bytes without copying or taking ownership.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialised bytes that stay valid and
    /// unmodified for as long as the returned string (or anything borrowed
    /// from it) is alive.
    #[must_use]
    pub unsafe fn from_raw_borrowed(ptr: *const u8, len: usize) -> Self {
        if len == 0 || ptr.is_null() {
            return Self::lit("");
        }
        // Safety: guaranteed by the caller.
        Self::from_static(unsafe { std::slice::from_raw_parts(ptr, len) })
    }

    /// Owned copy of `bytes`.
    pub fn from_bytes(heap: &Heap, bytes: &[u8]) -> RtResult<Self> {
        Self::build(heap, bytes.len(), "Str.from_bytes", |out| {
            out.copy_from_slice(bytes);
        })
    }

    /// Allocate an owned string of `len` bytes and let `fill` write them.
    ///
    /// The terminator slot is left zeroed.
    pub(crate) fn build(
        heap: &Heap,
        len: usize,
        op: &str,
        fill: impl FnOnce(&mut [u8]),
    ) -> RtResult<Self> {
        let size = len
            .checked_add(1)
            .ok_or_else(|| RtError::overflow(IntDomain::I64, format!("{op}: integer overflow")))?;
        let mut buf = Region::new_by_size(heap, size).map_err(|e| RtError::from(e).context(op))?;
        fill(&mut buf.as_bytes_mut()[..len]);
        Ok(Self {
            repr: Repr::Owned { buf, len },
        })
    }

    /// Owned deep copy with a fresh terminator, even of a literal.
    pub fn clone_in(&self, heap: &Heap) -> RtResult<Self> {
        Self::build(heap, self.len(), "Str.clone", |out| {
            out.copy_from_slice(self.as_bytes());
        })
    }

    /// Take the string apart.
    #[must_use]
    pub fn into_parts(self) -> StrParts {
        match self.repr {
            Repr::Borrowed(bytes) => StrParts::Borrowed(bytes),
            Repr::Owned { buf, len } => StrParts::Owned { buf, len },
        }
    }

    /// Put a string back together.
    ///
    /// Fails when an owned buffer has no room for `len` bytes and the
    /// terminator.
    pub fn from_parts(parts: StrParts) -> RtResult<Self> {
        match parts {
            StrParts::Borrowed(bytes) => Ok(Self::from_static(bytes)),
            StrParts::Owned { buf, len } => {
                if len >= buf.size() {
                    return Err(RtError::index(format!(
                        "Str.from_parts: length {len} does not fit a buffer of {} bytes",
                        buf.size()
                    )));
                }
                Ok(Self {
                    repr: Repr::Owned { buf, len },
                })
            }
        }
    }

    /// The contents, without the terminator.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Borrowed(bytes) => bytes,
            Repr::Owned { buf, len } => &buf.as_bytes()[..*len],
        }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Borrowed(bytes) => bytes.len(),
            Repr::Owned { len, .. } => *len,
        }
    }

    /// Whether the string has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the string is a literal that owns no memory.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        matches!(self.repr, Repr::Borrowed(_))
    }

    /// Release the buffer, if any.
    pub fn delete(self) {
        drop(self);
    }

    /// Whether `self <= other` bytewise.
    #[must_use]
    pub fn lteq(&self, other: &Self) -> bool {
        self <= other
    }

    /// Whether `self >= other` bytewise.
    #[must_use]
    pub fn gteq(&self, other: &Self) -> bool {
        self >= other
    }

    /// 64-bit FNV-1a hash of the contents.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.as_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
    }

    /// Parse a decimal integer the way C's `strtoll` does.
    ///
    /// Leading whitespace and one sign are accepted; parsing stops at the
    /// first non-digit. No digits yields 0, and out-of-range values
    /// saturate.
    #[must_use]
    pub fn to_i64(&self) -> i64 {
        let bytes = self.as_bytes();
        let mut i = bytes
            .iter()
            .position(|b| !matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r'))
            .unwrap_or(bytes.len());

        let negative = match bytes.get(i) {
            Some(b'-') => {
                i += 1;
                true
            }
            Some(b'+') => {
                i += 1;
                false
            }
            _ => false,
        };

        let mut value: i64 = 0;
        for &b in bytes[i..].iter().take_while(|b| b.is_ascii_digit()) {
            let digit = i64::from(b - b'0');
            // Accumulate towards the sign so i64::MIN is reachable.
            let next = value.checked_mul(10).and_then(|v| {
                if negative {
                    v.checked_sub(digit)
                } else {
                    v.checked_add(digit)
                }
            });
            match next {
                Some(v) => value = v,
                None => return if negative { i64::MIN } else { i64::MAX },
            }
        }
        value
    }
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Str {}

impl PartialOrd for Str {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Str {
    /// Bytewise over the shared prefix; a proper prefix sorts first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

/// Lossy: bytes that are not UTF-8 display as U+FFFD. Byte-exact output
/// goes through [`Str::as_bytes`].
impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl std::fmt::Debug for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Str(\"{}\")", self.as_bytes().escape_ascii())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use kiln_rts_alloc::HeapTracker;
    use std::sync::Arc;

    #[test]
    fn test_literal_does_not_allocate() {
        let tracker = Arc::new(HeapTracker::with_tracking());
        let _heap = Heap::tracked(Arc::clone(&tracker));
        let s = Str::lit("hello");
        assert!(s.is_borrowed());
        assert_eq!(s.len(), 5);
        assert_eq!(tracker.ledger_len(), 0);
    }

    #[test]
    fn test_owned_buffer_is_terminated() {
        let heap = Heap::system();
        let s = Str::from_bytes(&heap, b"abc").unwrap();
        let StrParts::Owned { buf, len } = s.into_parts() else {
            panic!("expected an owned string");
        };
        assert_eq!(len, 3);
        assert_eq!(buf.size(), 4);
        assert_eq!(buf.as_bytes(), b"abc\0");
    }

    #[test]
    fn test_clone_in_of_empty_literal() {
        let heap = Heap::system();
        let s = Str::lit("").clone_in(&heap).unwrap();
        assert!(s.is_empty());
        assert!(!s.is_borrowed());
    }

    #[test]
    fn test_parts_round_trip_checks_length() {
        let heap = Heap::system();
        let s = Str::from_bytes(&heap, b"kiln").unwrap();
        let StrParts::Owned { buf, .. } = s.into_parts() else {
            panic!("expected an owned string");
        };
        let err = Str::from_parts(StrParts::Owned { buf, len: 5 }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_equality_ignores_ownership() {
        let heap = Heap::system();
        let owned = Str::from_bytes(&heap, b"same").unwrap();
        assert_eq!(owned, Str::lit("same"));
        assert_ne!(owned, Str::lit("Same"));
    }

    #[test]
    fn test_ordering() {
        assert!(Str::lit("abc") < Str::lit("abd"));
        assert!(Str::lit("ab") < Str::lit("abc"));
        assert!(Str::lit("b") > Str::lit("abc"));
        assert!(Str::lit("x").lteq(&Str::lit("x")));
        assert!(Str::lit("y").gteq(&Str::lit("x")));
        assert_eq!(Str::lit("").cmp(&Str::lit("")), Ordering::Equal);
    }

    #[test]
    fn test_fnv_hash() {
        assert_eq!(Str::lit("").hash(), FNV_OFFSET_BASIS);
        assert_eq!(Str::lit("a").hash(), 0xaf63_dc4c_8601_ec8c);
        assert_ne!(Str::lit("hello").hash(), Str::lit("world").hash());
    }

    #[test]
    fn test_to_i64() {
        assert_eq!(Str::lit("42").to_i64(), 42);
        assert_eq!(Str::lit("  -17xyz").to_i64(), -17);
        assert_eq!(Str::lit("+8").to_i64(), 8);
        assert_eq!(Str::lit("abc").to_i64(), 0);
        assert_eq!(Str::lit("").to_i64(), 0);
        assert_eq!(Str::lit("-").to_i64(), 0);
        assert_eq!(Str::lit("99999999999999999999").to_i64(), i64::MAX);
        assert_eq!(Str::lit("-9223372036854775808").to_i64(), i64::MIN);
        assert_eq!(Str::lit("-99999999999999999999").to_i64(), i64::MIN);
    }

    #[test]
    fn test_display_and_debug() {
        let s = Str::lit("hi");
        assert_eq!(s.to_string(), "hi");
        assert_eq!(format!("{s:?}"), "Str(\"hi\")");
    }

    #[test]
    fn test_debug_escapes_raw_bytes() {
        let s = Str::from_static(&[0xff, b'a', b'\n']);
        assert_eq!(format!("{s:?}"), "Str(\"\\xffa\\n\")");
    }

    #[test]
    fn test_from_raw_borrowed() {
        static BYTES: [u8; 3] = *b"raw";
        let s = unsafe { Str::from_raw_borrowed(BYTES.as_ptr(), BYTES.len()) };
        assert!(s.is_borrowed());
        assert_eq!(s, Str::lit("raw"));

        let empty = unsafe { Str::from_raw_borrowed(std::ptr::null(), 0) };
        assert!(empty.is_empty());
    }
}
