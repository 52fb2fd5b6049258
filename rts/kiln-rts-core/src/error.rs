//! Error taxonomy shared by every fallible runtime operation.

use kiln_rts_alloc::AllocError;
use thiserror::Error;

/// Result type for runtime operations.
pub type RtResult<T> = Result<T, RtError>;

/// Integer domain an overflow happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntDomain {
    /// Signed 64-bit integers.
    I64,
    /// Unsigned bytes.
    U8,
}

impl std::fmt::Display for IntDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::I64 => "I64",
            Self::U8 => "U8",
        })
    }
}

/// Discriminant of an [`RtError`], used to route errors to ABI slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad index or range.
    IndexOutOfBounds,
    /// Allocation failed or a size was invalid.
    AllocFailure,
    /// Signed 64-bit overflow.
    I64Overflow,
    /// Unsigned byte overflow.
    U8Overflow,
    /// Division or remainder by zero.
    DivideByZero,
}

/// A recoverable runtime error. The message is owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtError {
    /// Bad index or range into an array, vec or string.
    #[error("{message}")]
    IndexOutOfBounds {
        /// Description of the failed access.
        message: String,
    },

    /// The allocator failed, or a requested size was invalid.
    #[error("{message}")]
    AllocFailure {
        /// Description of the failed allocation.
        message: String,
    },

    /// An integer result did not fit its domain.
    #[error("{message}")]
    IntegerOverflow {
        /// Domain of the overflowing value.
        domain: IntDomain,
        /// Description of the overflow.
        message: String,
    },

    /// Division or remainder by zero.
    #[error("{message}")]
    DivideByZero {
        /// Description of the failed division.
        message: String,
    },
}

impl RtError {
    /// Index error with the given message.
    pub fn index(message: impl Into<String>) -> Self {
        Self::IndexOutOfBounds {
            message: message.into(),
        }
    }

    /// Allocation error with the given message.
    pub fn alloc(message: impl Into<String>) -> Self {
        Self::AllocFailure {
            message: message.into(),
        }
    }

    /// Overflow error in `domain` with the given message.
    pub fn overflow(domain: IntDomain, message: impl Into<String>) -> Self {
        Self::IntegerOverflow {
            domain,
            message: message.into(),
        }
    }

    /// Division-by-zero error with the given message.
    pub fn divide_by_zero(message: impl Into<String>) -> Self {
        Self::DivideByZero {
            message: message.into(),
        }
    }

    /// Which kind of error this is.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IndexOutOfBounds { .. } => ErrorKind::IndexOutOfBounds,
            Self::AllocFailure { .. } => ErrorKind::AllocFailure,
            Self::IntegerOverflow {
                domain: IntDomain::I64,
                ..
            } => ErrorKind::I64Overflow,
            Self::IntegerOverflow {
                domain: IntDomain::U8,
                ..
            } => ErrorKind::U8Overflow,
            Self::DivideByZero { .. } => ErrorKind::DivideByZero,
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::IndexOutOfBounds { message }
            | Self::AllocFailure { message }
            | Self::IntegerOverflow { message, .. }
            | Self::DivideByZero { message } => message,
        }
    }

    /// Prefix the message with the name of the failing operation.
    #[must_use]
    pub fn context(mut self, op: &str) -> Self {
        let message = match &mut self {
            Self::IndexOutOfBounds { message }
            | Self::AllocFailure { message }
            | Self::IntegerOverflow { message, .. }
            | Self::DivideByZero { message } => message,
        };
        *message = format!("{op}: {message}");
        self
    }
}

impl From<AllocError> for RtError {
    fn from(err: AllocError) -> Self {
        Self::alloc(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_routing() {
        assert_eq!(RtError::index("x").kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(RtError::alloc("x").kind(), ErrorKind::AllocFailure);
        assert_eq!(
            RtError::overflow(IntDomain::I64, "x").kind(),
            ErrorKind::I64Overflow
        );
        assert_eq!(
            RtError::overflow(IntDomain::U8, "x").kind(),
            ErrorKind::U8Overflow
        );
        assert_eq!(RtError::divide_by_zero("x").kind(), ErrorKind::DivideByZero);
    }

    #[test]
    fn test_display_is_message() {
        let err = RtError::index("Array.get: index out of bounds");
        assert_eq!(err.to_string(), "Array.get: index out of bounds");
        assert_eq!(err.message(), "Array.get: index out of bounds");
    }

    #[test]
    fn test_from_alloc_error() {
        let err: RtError = AllocError::OutOfMemory { requested: 64 }.into();
        assert_eq!(err.kind(), ErrorKind::AllocFailure);
        assert!(err.message().contains("64"));
    }

    #[test]
    fn test_context_prefixes_message() {
        let err = RtError::from(AllocError::ZeroSized).context("Str.clone");
        assert_eq!(err.message(), "Str.clone: cannot allocate a region of 0 bytes");
    }
}
