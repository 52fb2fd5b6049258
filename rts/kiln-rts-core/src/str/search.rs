//! Read-only queries over string contents.

use super::Str;

/// Sentinel returned by [`Str::find`] and [`Str::rfind`] when nothing matches.
pub const NOT_FOUND: i64 = -1;

fn to_index(pos: usize) -> i64 {
    i64::try_from(pos).unwrap_or(i64::MAX)
}

impl Str {
    /// Byte index of the first occurrence of `needle`, or `-1`.
    ///
    /// An empty needle, or one longer than the haystack, is never found.
    #[must_use]
    pub fn find(&self, needle: &Str) -> i64 {
        self.find_from(0, needle.as_bytes())
            .map_or(NOT_FOUND, to_index)
    }

    /// Byte index of the last occurrence of `needle`, or `-1`.
    #[must_use]
    pub fn rfind(&self, needle: &Str) -> i64 {
        let (hay, needle) = (self.as_bytes(), needle.as_bytes());
        if needle.is_empty() || needle.len() > hay.len() {
            return NOT_FOUND;
        }
        hay.windows(needle.len())
            .rposition(|window| window == needle)
            .map_or(NOT_FOUND, to_index)
    }

    /// Whether `needle` occurs anywhere. An empty needle does not.
    #[must_use]
    pub fn contains(&self, needle: &Str) -> bool {
        self.find(needle) != NOT_FOUND
    }

    /// Whether the string begins with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &Str) -> bool {
        self.as_bytes().starts_with(prefix.as_bytes())
    }

    /// Whether the string ends with `suffix`.
    #[must_use]
    pub fn ends_with(&self, suffix: &Str) -> bool {
        self.as_bytes().ends_with(suffix.as_bytes())
    }

    /// Whether the string is non-empty and every byte is `A` through `Z`.
    #[must_use]
    pub fn is_uppercase(&self) -> bool {
        !self.is_empty() && self.as_bytes().iter().all(u8::is_ascii_uppercase)
    }

    /// Byte at `index`, or 0 when `index` is out of range.
    #[must_use]
    pub fn char_at(&self, index: i64) -> u8 {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.as_bytes().get(i).copied())
            .unwrap_or(0)
    }

    /// First match of `needle` at or after byte `from`.
    pub(crate) fn find_from(&self, from: usize, needle: &[u8]) -> Option<usize> {
        let hay = self.as_bytes().get(from..)?;
        if needle.is_empty() || needle.len() > hay.len() {
            return None;
        }
        hay.windows(needle.len())
            .position(|window| window == needle)
            .map(|pos| pos + from)
    }
}
