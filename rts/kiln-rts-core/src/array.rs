//! Fixed-length arrays.

use crate::{Element, RtError, RtResult};
use kiln_rts_alloc::{Heap, Region};
use std::marker::PhantomData;

/// A fixed-length, homogeneous buffer backed by a single [`Region`].
///
/// The length is set at construction and never changes; every slot starts
/// out holding the element type's zero value.
pub struct Array<T: Element> {
    region: Region,
    /// Number of initialised slots. Equals the capacity once construction
    /// finishes; smaller only while slots are being filled.
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Element> Array<T> {
    /// Allocate an array of `capacity` zero-valued elements.
    pub fn new(heap: &Heap, capacity: usize) -> RtResult<Self> {
        let region = Region::for_elems(heap, T::shape(), capacity)
            .map_err(|e| RtError::from(e).context("Array.new"))?;
        let mut array = Self {
            region,
            len: 0,
            _marker: PhantomData,
        };
        while array.len < capacity {
            // Safety: slot `len` is within the region and not yet initialised.
            unsafe { array.base_mut().add(array.len).write(T::zero()) };
            array.len += 1;
        }
        Ok(array)
    }

    fn base(&self) -> *const T {
        self.region.as_ptr().cast()
    }

    fn base_mut(&mut self) -> *mut T {
        self.region.as_mut_ptr().cast()
    }

    fn check_index(&self, op: &str, index: usize) -> RtResult<()> {
        if index >= self.len {
            return Err(RtError::index(format!(
                "{op}: index {index} out of bounds for length {}",
                self.len
            )));
        }
        Ok(())
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the occupied storage in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len * T::shape().size
    }

    /// Borrow the element at `index`.
    pub fn get(&self, index: usize) -> RtResult<&T> {
        self.check_index("Array.get", index)?;
        Ok(&self.as_slice()[index])
    }

    /// Mutably borrow the element at `index`.
    pub fn get_mut(&mut self, index: usize) -> RtResult<&mut T> {
        self.check_index("Array.get", index)?;
        Ok(&mut self.as_mut_slice()[index])
    }

    /// Replace the element at `index`, dropping the previous value.
    pub fn set(&mut self, index: usize, value: T) -> RtResult<()> {
        self.check_index("Array.set", index)?;
        self.as_mut_slice()[index] = value;
        Ok(())
    }

    /// Whether any element equals `value`.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.iter().any(|item| item.same(value))
    }

    /// Deep copy allocated from the same heap.
    pub fn try_clone(&self) -> RtResult<Self> {
        let region = Region::for_elems(self.region.heap(), T::shape(), self.len)
            .map_err(|e| RtError::from(e).context("Array.clone"))?;
        let mut copy = Self {
            region,
            len: 0,
            _marker: PhantomData,
        };
        for item in self.iter() {
            let value = item.clone_in(self.region.heap())?;
            // Safety: slot `copy.len` is within the region and not yet initialised.
            unsafe { copy.base_mut().add(copy.len).write(value) };
            copy.len += 1;
        }
        Ok(copy)
    }

    /// Drop every element and release the storage.
    pub fn delete(self) {
        drop(self);
    }

    /// The elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // Safety: the first `len` slots are initialised.
        unsafe { std::slice::from_raw_parts(self.base(), self.len) }
    }

    /// The elements as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        // Safety: the first `len` slots are initialised.
        unsafe { std::slice::from_raw_parts_mut(self.base_mut(), len) }
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Element> Drop for Array<T> {
    fn drop(&mut self) {
        // Safety: exactly the first `len` slots are initialised; the region
        // itself is released afterwards by its own Drop.
        unsafe {
            std::ptr::drop_in_place(self.as_mut_slice() as *mut [T]);
        }
    }
}

impl<T: Element + std::fmt::Debug> std::fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
