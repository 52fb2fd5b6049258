//! Element types storable in [`Array`](crate::Array) and
//! [`GrowableVec`](crate::GrowableVec).

use crate::{RtResult, Str};
use kiln_rts_alloc::{ElemShape, Heap, TypeTag};

/// A value the runtime containers can hold.
///
/// Besides the shape used to size storage, an element knows its zero value
/// (what a freshly allocated slot holds), how to deep-copy itself onto a
/// heap, how it compares for `contains`, and how it renders in a debug
/// listing.
pub trait Element: Sized {
    /// Runtime tag recorded in the backing region.
    const TAG: TypeTag;

    /// Value of a freshly zeroed slot.
    fn zero() -> Self;

    /// Deep copy allocated from `heap`.
    fn clone_in(&self, heap: &Heap) -> RtResult<Self>;

    /// Equality used by `contains`.
    fn same(&self, other: &Self) -> bool;

    /// Append the debug rendering of this value to `out`, byte for byte.
    fn render(&self, out: &mut Vec<u8>);

    /// Storage shape of one element.
    #[must_use]
    fn shape() -> ElemShape {
        ElemShape::of::<Self>(Self::TAG)
    }
}

macro_rules! scalar_element {
    ($ty:ty, $tag:expr, $zero:expr) => {
        impl Element for $ty {
            const TAG: TypeTag = $tag;

            fn zero() -> Self {
                $zero
            }

            fn clone_in(&self, _heap: &Heap) -> RtResult<Self> {
                Ok(*self)
            }

            fn same(&self, other: &Self) -> bool {
                self == other
            }

            fn render(&self, out: &mut Vec<u8>) {
                use std::io::Write;
                // Writing into a Vec cannot fail.
                let _ = write!(out, "{self}");
            }
        }
    };
}

scalar_element!(i64, TypeTag::I64, 0);
scalar_element!(u8, TypeTag::U8, 0);
scalar_element!(bool, TypeTag::Bool, false);

impl Element for Str {
    const TAG: TypeTag = TypeTag::Str;

    fn zero() -> Self {
        Str::lit("")
    }

    fn clone_in(&self, heap: &Heap) -> RtResult<Self> {
        Str::clone_in(self, heap)
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }

    fn render(&self, out: &mut Vec<u8>) {
        out.push(b'"');
        out.extend_from_slice(self.as_bytes());
        out.push(b'"');
    }
}
