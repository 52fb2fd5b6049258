//! Kiln Runtime Core
//!
//! Value types and containers that compiled Kiln programs operate on.
//!
//! # Overview
//!
//! - [`Array`]: fixed-length homogeneous buffer
//! - [`GrowableVec`]: doubling vector with a hard capacity limit
//! - [`Str`]: byte string, either a borrowed literal or an owned buffer
//! - [`scalar`]: checked conversions between the built-in scalar types
//!
//! Every fallible operation returns [`RtResult`]. Storage comes from a
//! [`Heap`](kiln_rts_alloc::Heap) passed in by the caller, so a program's
//! allocations can be audited by giving it a tracked heap.

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod array;
pub mod element;
pub mod error;
pub mod scalar;
pub mod str;
pub mod vec;

pub use array::Array;
pub use element::Element;
pub use error::{ErrorKind, IntDomain, RtError, RtResult};
pub use self::str::{Str, StrParts};
pub use vec::{GrowableVec, MAX_CAPACITY};
