//! Operations that build new strings.

use super::Str;
use crate::{GrowableVec, IntDomain, RtError, RtResult};
use kiln_rts_alloc::Heap;

/// Sum string lengths, failing once the total leaves the `I64` range.
fn checked_total(total: usize, extra: usize) -> Option<usize> {
    total
        .checked_add(extra)
        .filter(|sum| i64::try_from(*sum).is_ok())
}

impl Str {
    /// `a` followed by `b`, as a new owned string.
    pub fn concat(heap: &Heap, a: &Str, b: &Str) -> RtResult<Str> {
        let len = checked_total(a.len(), b.len())
            .ok_or_else(|| RtError::overflow(IntDomain::I64, "concat: integer overflow"))?;
        Str::build(heap, len, "concat", |out| {
            let (head, tail) = out.split_at_mut(a.len());
            head.copy_from_slice(a.as_bytes());
            tail.copy_from_slice(b.as_bytes());
        })
    }

    /// `prefix` followed by every argument in order.
    pub fn format(heap: &Heap, prefix: &Str, args: &[Str]) -> RtResult<Str> {
        let mut len = prefix.len();
        for (i, arg) in args.iter().enumerate() {
            len = checked_total(len, arg.len()).ok_or_else(|| {
                RtError::overflow(
                    IntDomain::I64,
                    format!("format: integer overflow while summing cap for arg {i}"),
                )
            })?;
        }
        Str::build(heap, len, "format", |out| {
            let mut offset = 0;
            for part in std::iter::once(prefix).chain(args) {
                let end = offset + part.len();
                out[offset..end].copy_from_slice(part.as_bytes());
                offset = end;
            }
        })
    }

    /// Owned copy of the bytes `[start, end)`.
    ///
    /// Fails unless `0 <= start < end <= len`.
    pub fn get_substr(&self, heap: &Heap, start: i64, end: i64) -> RtResult<Str> {
        let len = self.len();
        if start < 0 {
            return Err(RtError::index(format!(
                "get_substr: start index {start} cannot be negative"
            )));
        }
        if end < 0 {
            return Err(RtError::index(format!(
                "get_substr: end index {end} cannot be negative"
            )));
        }
        if start > end {
            return Err(RtError::index(format!(
                "get_substr: start index {start} is greater than end index {end}"
            )));
        }
        // Non-negative and ordered, so both fit usize whenever end fits len.
        let (start, end) = match (usize::try_from(start), usize::try_from(end)) {
            (Ok(start), Ok(end)) if end <= len => (start, end),
            _ => {
                return Err(RtError::index(format!(
                    "get_substr: end index {end} is greater than string length {len}"
                )))
            }
        };
        if start == end {
            return Err(RtError::index(format!(
                "get_substr: start and end are the same ({start}), no substring"
            )));
        }
        Str::build(heap, end - start, "get_substr", |out| {
            out.copy_from_slice(&self.as_bytes()[start..end]);
        })
    }

    /// The single byte at `pos`, as an owned string.
    pub fn get_char(&self, heap: &Heap, pos: i64) -> RtResult<Str> {
        let end = pos.checked_add(1).ok_or_else(|| {
            RtError::index(format!("get_char: position {pos} is out of range"))
        })?;
        self.get_substr(heap, pos, end)
    }

    /// Replace every non-overlapping occurrence of `from`, left to right.
    ///
    /// An empty or absent `from` yields an unchanged copy.
    pub fn replace(&self, heap: &Heap, from: &Str, to: &Str) -> RtResult<Str> {
        self.replace_matches(heap, from, to, usize::MAX, "Str.replace")
    }

    /// Replace at most `n` occurrences of `from`, left to right.
    pub fn replacen(&self, heap: &Heap, from: &Str, to: &Str, n: usize) -> RtResult<Str> {
        self.replace_matches(heap, from, to, n, "Str.replacen")
    }

    fn replace_matches(
        &self,
        heap: &Heap,
        from: &Str,
        to: &Str,
        limit: usize,
        op: &str,
    ) -> RtResult<Str> {
        let needle = from.as_bytes();
        let mut matches = Vec::new();
        let mut cursor = 0;
        while matches.len() < limit {
            let Some(pos) = self.find_from(cursor, needle) else {
                break;
            };
            matches.push(pos);
            cursor = pos + needle.len();
        }
        if matches.is_empty() {
            return self.clone_in(heap);
        }

        let kept = self.len() - matches.len() * needle.len();
        let len = to
            .len()
            .checked_mul(matches.len())
            .and_then(|added| checked_total(kept, added))
            .ok_or_else(|| RtError::overflow(IntDomain::I64, format!("{op}: integer overflow")))?;

        let src = self.as_bytes();
        Str::build(heap, len, op, |out| {
            let mut read = 0;
            let mut write = 0;
            for &pos in &matches {
                let chunk = &src[read..pos];
                out[write..write + chunk.len()].copy_from_slice(chunk);
                write += chunk.len();
                out[write..write + to.len()].copy_from_slice(to.as_bytes());
                write += to.len();
                read = pos + needle.len();
            }
            out[write..].copy_from_slice(&src[read..]);
        })
    }

    /// Split on every occurrence of `delimiter`.
    ///
    /// Empty segments are kept, including a leading or trailing one, so
    /// joining the parts with `delimiter` gives back the input. An empty
    /// delimiter yields a single copy of the whole string.
    pub fn split(&self, heap: &Heap, delimiter: &Str) -> RtResult<GrowableVec<Str>> {
        let mut parts = GrowableVec::new(heap);
        let delim = delimiter.as_bytes();
        if delim.is_empty() {
            parts.push(self.clone_in(heap)?)?;
            return Ok(parts);
        }

        let src = self.as_bytes();
        let mut start = 0;
        loop {
            let end = self.find_from(start, delim).unwrap_or(src.len());
            let part = if end > start {
                Str::from_bytes(heap, &src[start..end])?
            } else {
                Str::lit("")
            };
            parts.push(part)?;
            if end == src.len() {
                break;
            }
            start = end + delim.len();
        }
        Ok(parts)
    }

    /// ASCII lowercase copy.
    pub fn to_lowercase(&self, heap: &Heap) -> RtResult<Str> {
        Str::build(heap, self.len(), "Str.to_lowercase", |out| {
            for (dst, src) in out.iter_mut().zip(self.as_bytes()) {
                *dst = src.to_ascii_lowercase();
            }
        })
    }

    /// Increment the byte of a one-byte string, wrapping at 255.
    ///
    /// Strings of any other length are left alone.
    pub fn inc(&mut self, heap: &Heap) -> RtResult<()> {
        self.step_byte(heap, 1, "Str.inc")
    }

    /// Decrement the byte of a one-byte string, wrapping at 0.
    pub fn dec(&mut self, heap: &Heap) -> RtResult<()> {
        self.step_byte(heap, u8::MAX, "Str.dec")
    }

    fn step_byte(&mut self, heap: &Heap, delta: u8, op: &str) -> RtResult<()> {
        let &[byte] = self.as_bytes() else {
            return Ok(());
        };
        *self = Str::build(heap, 1, op, |out| out[0] = byte.wrapping_add(delta))?;
        Ok(())
    }
}
