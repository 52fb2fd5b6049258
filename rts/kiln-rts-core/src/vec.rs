//! Growable vectors with a doubling growth policy.
//!
//! Capacity starts at zero (or the requested initial capacity), doubles
//! whenever a push finds the buffer full, and never shrinks. Growth past
//! the vector's maximum capacity is reported as an allocation failure, the
//! same way an exhausted allocator is.

use crate::{Element, RtError, RtResult, Str};
use kiln_rts_alloc::{Heap, Region};
use std::marker::PhantomData;

/// Default hard limit on the number of elements a vector may hold.
pub const MAX_CAPACITY: usize = 1024;

/// A growable, homogeneous vector backed by a [`Region`].
///
/// # Invariants
///
/// - `len <= cap <= max_cap`
/// - `buf` is `None` exactly when `cap == 0`
/// - the first `len` slots of `buf` are initialised
pub struct GrowableVec<T: Element> {
    buf: Option<Region>,
    len: usize,
    cap: usize,
    max_cap: usize,
    heap: Heap,
    _marker: PhantomData<T>,
}

impl<T: Element> GrowableVec<T> {
    /// Create an empty vector without allocating.
    #[must_use]
    pub fn new(heap: &Heap) -> Self {
        Self {
            buf: None,
            len: 0,
            cap: 0,
            max_cap: MAX_CAPACITY,
            heap: heap.clone(),
            _marker: PhantomData,
        }
    }

    /// Create an empty vector with room for `capacity` elements.
    pub fn with_capacity(heap: &Heap, capacity: usize) -> RtResult<Self> {
        let mut vec = Self::new(heap);
        if capacity > vec.max_cap {
            return Err(RtError::alloc(format!(
                "Vec.with_capacity: capacity {capacity} exceeds the maximum of {}",
                vec.max_cap
            )));
        }
        if capacity > 0 {
            vec.reallocate(capacity, "Vec.with_capacity")?;
        }
        Ok(vec)
    }

    /// Replace the maximum capacity. Never lowers it below the current capacity.
    #[must_use]
    pub fn with_max_capacity(mut self, max_cap: usize) -> Self {
        self.max_cap = max_cap.max(self.cap);
        self
    }

    fn base(&self) -> *const T {
        match &self.buf {
            Some(region) => region.as_ptr().cast(),
            None => std::ptr::NonNull::dangling().as_ptr(),
        }
    }

    fn base_mut(&mut self) -> *mut T {
        match &mut self.buf {
            Some(region) => region.as_mut_ptr().cast(),
            None => std::ptr::NonNull::dangling().as_ptr(),
        }
    }

    fn reallocate(&mut self, new_cap: usize, op: &str) -> RtResult<()> {
        let mut region = Region::for_elems(&self.heap, T::shape(), new_cap)
            .map_err(|e| RtError::from(e).context(op))?;
        if let Some(old) = self.buf.take() {
            // Elements move bitwise; the old block is freed without dropping them.
            // Safety: both blocks hold at least `len` slots and are distinct.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    old.as_ptr().cast::<T>(),
                    region.as_mut_ptr().cast::<T>(),
                    self.len,
                );
            }
        }
        tracing::debug!(op, old_cap = self.cap, new_cap, "vec grow");
        self.buf = Some(region);
        self.cap = new_cap;
        Ok(())
    }

    /// Make room for one more element, doubling the capacity if needed.
    fn reserve_one(&mut self, op: &str) -> RtResult<()> {
        if self.len < self.cap {
            return Ok(());
        }
        let new_cap = if self.cap == 0 { 1 } else { self.cap.saturating_mul(2) };
        if new_cap > self.max_cap {
            return Err(RtError::alloc(format!(
                "{op}: capacity {new_cap} exceeds the maximum of {}",
                self.max_cap
            )));
        }
        self.reallocate(new_cap, op)
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

    fn append(&mut self, value: T, op: &str) -> RtResult<()> {
        self.reserve_one(op)?;
        let len = self.len;
        // Safety: `reserve_one` guarantees slot `len` exists and is free.
        unsafe { self.base_mut().add(len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current buffer can hold.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Largest capacity this vector may grow to.
    #[inline]
    #[must_use]
    pub fn max_capacity(&self) -> usize {
        self.max_cap
    }

    /// Heap the vector allocates from.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Size of the live elements in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len * T::shape().size
    }

    /// Append `value`.
    pub fn push(&mut self, value: T) -> RtResult<()> {
        self.append(value, "Vec.push")
    }

    /// Borrow the element at `index`.
    pub fn get(&self, index: usize) -> RtResult<&T> {
        self.check_index("Vec.get", index)?;
        Ok(&self.as_slice()[index])
    }

    /// Mutably borrow the element at `index`.
    pub fn get_mut(&mut self, index: usize) -> RtResult<&mut T> {
        self.check_index("Vec.get", index)?;
        Ok(&mut self.as_mut_slice()[index])
    }

    /// Replace the element at `index`, dropping the previous value.
    pub fn set(&mut self, index: usize, value: T) -> RtResult<()> {
        self.check_index("Vec.set", index)?;
        self.as_mut_slice()[index] = value;
        Ok(())
    }

    /// Remove and return the last element.
    pub fn pop(&mut self) -> RtResult<T> {
        if self.len == 0 {
            return Err(RtError::index("Vec.pop: cannot pop from an empty Vec"));
        }
        self.len -= 1;
        // Safety: slot `len` was initialised and is now outside the live prefix.
        Ok(unsafe { self.base().add(self.len).read() })
    }

    /// Remove the element at `index`, shifting everything after it left.
    pub fn remove(&mut self, index: usize) -> RtResult<T> {
        self.check_index("Vec.remove", index)?;
        let tail = self.len - index - 1;
        // Safety: `index < len`; the read slot is overwritten by the shift.
        let value = unsafe {
            let base = self.base_mut();
            let value = base.add(index).read();
            std::ptr::copy(base.add(index + 1), base.add(index), tail);
            value
        };
        self.len -= 1;
        Ok(value)
    }

    /// Insert `value` at `index`, shifting everything from `index` right.
    ///
    /// `index == len` appends.
    pub fn insert_at(&mut self, index: usize, value: T) -> RtResult<()> {
        if index > self.len {
            return Err(RtError::index(format!(
                "Vec.insert_at: index {index} out of bounds for length {}",
                self.len
            )));
        }
        self.reserve_one("Vec.insert_at")?;
        let tail = self.len - index;
        // Safety: capacity exceeds `len`, so the shifted tail stays in bounds.
        unsafe {
            let base = self.base_mut();
            std::ptr::copy(base.add(index), base.add(index + 1), tail);
            base.add(index).write(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Append deep copies of every element of `other`.
    pub fn extend(&mut self, other: &GrowableVec<T>) -> RtResult<()> {
        for item in other.iter() {
            let value = item.clone_in(&self.heap)?;
            self.append(value, "Vec.extend")?;
        }
        Ok(())
    }

    /// Append `count` deep copies of `value`.
    pub fn extend_with(&mut self, value: &T, count: usize) -> RtResult<()> {
        for _ in 0..count {
            let copy = value.clone_in(&self.heap)?;
            self.append(copy, "Vec.extend_with")?;
        }
        Ok(())
    }

    /// Whether any element equals `value`.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.iter().any(|item| item.same(value))
    }

    /// Deep copy of the live elements, with the same capacity and limit.
    pub fn try_clone(&self) -> RtResult<Self> {
        let mut copy = Self::new(&self.heap).with_max_capacity(self.max_cap);
        if self.cap > 0 {
            copy.reallocate(self.cap, "Vec.clone")?;
        }
        for item in self.iter() {
            let value = item.clone_in(&self.heap)?;
            copy.append(value, "Vec.clone")?;
        }
        Ok(copy)
    }

    /// Move the elements `[at, len)` into a new vector, keeping `[0, at)`.
    pub fn split_off(&mut self, at: usize) -> RtResult<Self> {
        if at > self.len {
            return Err(RtError::index(format!(
                "Vec.split_off: index {at} out of bounds for length {}",
                self.len
            )));
        }
        let tail = self.len - at;
        let mut other = Self::new(&self.heap).with_max_capacity(self.max_cap);
        if tail == 0 {
            return Ok(other);
        }
        other.reallocate(tail, "Vec.split_off")?;
        // Safety: `other` has room for `tail` slots; the moved slots leave
        // the live prefix of `self` below.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(at), other.base_mut(), tail);
        }
        other.len = tail;
        self.len = at;
        Ok(other)
    }

    /// Drop every element, keeping the buffer.
    pub fn clear(&mut self) {
        let live = self.as_mut_slice() as *mut [T];
        self.len = 0;
        // Safety: the slots were initialised and are no longer reachable.
        unsafe { std::ptr::drop_in_place(live) };
    }

    /// Drop every element and release the buffer.
    pub fn delete(self) {
        drop(self);
    }

    /// Render as `[a, b, c]`, quoting string elements.
    pub fn to_str(&self, heap: &Heap) -> RtResult<Str> {
        let mut out = vec![b'['];
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                out.extend_from_slice(b", ");
            }
            item.render(&mut out);
        }
        out.push(b']');
        Str::from_bytes(heap, &out)
    }

    /// The live elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // Safety: the first `len` slots are initialised; the base is
        // dangling but aligned when nothing is allocated.
        unsafe { std::slice::from_raw_parts(self.base(), self.len) }
    }

    /// The live elements as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        // Safety: as for `as_slice`.
        unsafe { std::slice::from_raw_parts_mut(self.base_mut(), len) }
    }

    /// Iterate over the live elements.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Element> Drop for GrowableVec<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Element + std::fmt::Debug> std::fmt::Debug for GrowableVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T: Element> IntoIterator for &'a GrowableVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use kiln_rts_alloc::HeapTracker;
    use std::sync::Arc;

    fn numbers(heap: &Heap, values: &[i64]) -> GrowableVec<i64> {
        let mut vec = GrowableVec::new(heap);
        for &v in values {
            vec.push(v).unwrap();
        }
        vec
    }

    #[test]
    fn test_new_does_not_allocate() {
        let tracker = Arc::new(HeapTracker::with_tracking());
        let heap = Heap::tracked(Arc::clone(&tracker));
        let vec: GrowableVec<i64> = GrowableVec::new(&heap);
        assert_eq!(vec.capacity(), 0);
        assert_eq!(tracker.ledger_len(), 0);
    }

    #[test]
    fn test_growth_doubles_from_one() {
        let heap = Heap::system();
        let mut vec = GrowableVec::new(&heap);
        let mut caps = Vec::new();
        for i in 0..5i64 {
            vec.push(i).unwrap();
            caps.push(vec.capacity());
        }
        assert_eq!(caps, vec![1, 2, 4, 4, 8]);
    }

    #[test]
    fn test_seventeen_pushes_from_sixteen() {
        let tracker = Arc::new(HeapTracker::with_tracking());
        let heap = Heap::tracked(Arc::clone(&tracker));
        let mut vec: GrowableVec<i64> = GrowableVec::with_capacity(&heap, 16).unwrap();

        for i in 0..17 {
            vec.push(i).unwrap();
        }
        assert_eq!(vec.len(), 17);
        assert_eq!(vec.capacity(), 32);
        // One allocation for the initial buffer, one for the single growth.
        assert_eq!(tracker.stats().allocation_count, 2);
        assert_eq!(tracker.report().unwrap().count, 1);
    }

    #[test]
    fn test_with_capacity_over_limit() {
        let heap = Heap::system();
        let err = GrowableVec::<i64>::with_capacity(&heap, MAX_CAPACITY + 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocFailure);
    }

    #[test]
    fn test_push_past_limit_is_alloc_failure() {
        let heap = Heap::system();
        let mut vec = GrowableVec::new(&heap).with_max_capacity(4);
        for i in 0..4i64 {
            vec.push(i).unwrap();
        }
        let err = vec.push(4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocFailure);
        assert_eq!(err.message(), "Vec.push: capacity 8 exceeds the maximum of 4");
        assert_eq!(vec.len(), 4);
    }

    #[test]
    fn test_push_pop_reverses() {
        let heap = Heap::system();
        let mut vec = numbers(&heap, &[1, 2, 3]);
        assert_eq!(vec.pop().unwrap(), 3);
        assert_eq!(vec.pop().unwrap(), 2);
        assert_eq!(vec.pop().unwrap(), 1);
        assert!(vec.is_empty());
        assert_eq!(vec.pop().unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_get_set_bounds() {
        let heap = Heap::system();
        let mut vec = numbers(&heap, &[10, 20]);
        assert_eq!(*vec.get(1).unwrap(), 20);
        vec.set(0, 11).unwrap();
        assert_eq!(vec.as_slice(), &[11, 20]);
        assert_eq!(vec.get(2).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(vec.set(2, 0).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_remove_shifts_left() {
        let heap = Heap::system();
        let mut vec = numbers(&heap, &[1, 2, 3, 4]);
        assert_eq!(vec.remove(1).unwrap(), 2);
        assert_eq!(vec.as_slice(), &[1, 3, 4]);
        assert_eq!(vec.remove(2).unwrap(), 4);
        assert_eq!(vec.as_slice(), &[1, 3]);
        assert!(vec.remove(2).is_err());
    }

    #[test]
    fn test_insert_at() {
        let heap = Heap::system();
        let mut vec = numbers(&heap, &[1, 3]);
        vec.insert_at(1, 2).unwrap();
        vec.insert_at(3, 4).unwrap();
        vec.insert_at(0, 0).unwrap();
        assert_eq!(vec.as_slice(), &[0, 1, 2, 3, 4]);
        assert_eq!(vec.insert_at(6, 9).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_insert_into_empty() {
        let heap = Heap::system();
        let mut vec = GrowableVec::new(&heap);
        vec.insert_at(0, 5i64).unwrap();
        assert_eq!(vec.as_slice(), &[5]);
        assert_eq!(vec.capacity(), 1);
    }

    #[test]
    fn test_extend_and_extend_with() {
        let heap = Heap::system();
        let mut vec = numbers(&heap, &[1]);
        let other = numbers(&heap, &[2, 3]);
        vec.extend(&other).unwrap();
        vec.extend_with(&9, 2).unwrap();
        assert_eq!(vec.as_slice(), &[1, 2, 3, 9, 9]);
        assert_eq!(other.len(), 2);
    }

    #[test]
    fn test_extend_strings_deep_copies() {
        let heap = Heap::system();
        let mut words: GrowableVec<Str> = GrowableVec::new(&heap);
        let mut other = GrowableVec::new(&heap);
        other.push(Str::lit("a")).unwrap();
        words.extend(&other).unwrap();
        assert!(!words.get(0).unwrap().is_borrowed());
        assert!(words.contains(&Str::lit("a")));
    }

    #[test]
    fn test_try_clone_copies_live_elements() {
        let heap = Heap::system();
        let mut vec: GrowableVec<i64> = GrowableVec::with_capacity(&heap, 8).unwrap();
        vec.push(1).unwrap();
        vec.push(2).unwrap();

        let copy = vec.try_clone().unwrap();
        assert_eq!(copy.as_slice(), &[1, 2]);
        assert_eq!(copy.capacity(), 8);
        vec.set(0, 5).unwrap();
        assert_eq!(copy.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_split_off() {
        let heap = Heap::system();
        let mut vec = numbers(&heap, &[1, 2, 3, 4]);
        let tail = vec.split_off(1).unwrap();
        assert_eq!(vec.as_slice(), &[1]);
        assert_eq!(tail.as_slice(), &[2, 3, 4]);

        let empty = vec.split_off(1).unwrap();
        assert!(empty.is_empty());
        assert_eq!(vec.split_off(2).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let heap = Heap::system();
        let mut vec = numbers(&heap, &[1, 2, 3]);
        let cap = vec.capacity();
        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(vec.capacity(), cap);
        vec.push(7).unwrap();
        assert_eq!(vec.as_slice(), &[7]);
    }

    #[test]
    fn test_to_str_quotes_strings() {
        let heap = Heap::system();
        let vec = numbers(&heap, &[1, -2]);
        assert_eq!(vec.to_str(&heap).unwrap(), Str::lit("[1, -2]"));

        let mut words = GrowableVec::new(&heap);
        words.push(Str::lit("a")).unwrap();
        words.push(Str::lit("b")).unwrap();
        assert_eq!(words.to_str(&heap).unwrap(), Str::lit("[\"a\", \"b\"]"));

        let empty: GrowableVec<bool> = GrowableVec::new(&heap);
        assert_eq!(empty.to_str(&heap).unwrap(), Str::lit("[]"));
    }

    #[test]
    fn test_to_str_copies_bytes_verbatim() {
        let heap = Heap::system();
        let mut words = GrowableVec::new(&heap);
        words.push(Str::from_static(&[0xff, b'a'])).unwrap();
        words.push(Str::from_static(b"\xc3")).unwrap();
        let listing = words.to_str(&heap).unwrap();
        assert_eq!(listing.as_bytes(), b"[\"\xffa\", \"\xc3\"]");
    }

    #[test]
    fn test_no_leaks_across_operations() {
        let tracker = Arc::new(HeapTracker::with_tracking());
        let heap = Heap::tracked(Arc::clone(&tracker));
        {
            let mut words: GrowableVec<Str> = GrowableVec::new(&heap);
            for _ in 0..10 {
                words.push(Str::from_bytes(&heap, b"word").unwrap()).unwrap();
            }
            let _ = words.remove(3).unwrap();
            let tail = words.split_off(5).unwrap();
            let copy = tail.try_clone().unwrap();
            words.clear();
            drop(copy);
        }
        assert!(tracker.report().unwrap().is_clean());
    }
}
