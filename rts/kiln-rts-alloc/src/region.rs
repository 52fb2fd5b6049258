//! Owned memory regions and borrowed views over them.
//!
//! A [`Region`] exclusively owns a block of heap memory together with the
//! shape of the elements stored in it. [`RegionView`] is the borrowed
//! counterpart produced by pointer arithmetic ([`Region::offset`]); it is
//! tied to the lifetime of its source and cannot free anything.
//!
//! Every copy primitive takes an explicit byte count and checks it against
//! both ends of the transfer.

use crate::{AllocError, AllocResult, Allocator, Heap};
use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// Runtime tag of the element type stored in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Signed 64-bit integer.
    I64,
    /// Unsigned byte.
    U8,
    /// Boolean.
    Bool,
    /// Byte string.
    Str,
    /// Heap ledger entry.
    HeapEntry,
    /// Untyped bytes.
    Raw,
}

impl TypeTag {
    /// Every named tag, in table order.
    pub const NAMED: [TypeTag; 5] = [
        TypeTag::I64,
        TypeTag::U8,
        TypeTag::Bool,
        TypeTag::Str,
        TypeTag::HeapEntry,
    ];

    /// Name of the type as generated code spells it.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::I64 => "I64",
            Self::U8 => "U8",
            Self::Bool => "Bool",
            Self::Str => "Str",
            Self::HeapEntry => "HeapEntry",
            Self::Raw => "Raw",
        }
    }

    /// Size of one element in the C ABI layout used by generated code.
    ///
    /// `Str` is `{ ptr, len, cap, borrowed }` padded to 32 bytes.
    #[must_use]
    pub const fn abi_size(self) -> usize {
        match self {
            Self::I64 => 8,
            Self::U8 | Self::Bool | Self::Raw => 1,
            Self::Str => 32,
            Self::HeapEntry => 16,
        }
    }

    /// Alignment of one element in the C ABI layout.
    #[must_use]
    pub const fn abi_align(self) -> usize {
        match self {
            Self::U8 | Self::Bool | Self::Raw => 1,
            Self::I64 | Self::Str | Self::HeapEntry => 8,
        }
    }

    /// Look a type up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED.into_iter().find(|tag| tag.name() == name)
    }
}

/// Resolve a type name to its byte size.
#[must_use]
pub fn size_of(type_name: &str) -> Option<usize> {
    TypeTag::from_name(type_name).map(TypeTag::abi_size)
}

/// Element metadata carried by every region and view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElemShape {
    /// Element type tag.
    pub tag: TypeTag,
    /// Size of one element in bytes.
    pub size: usize,
    /// Alignment of one element in bytes.
    pub align: usize,
}

impl ElemShape {
    /// Shape of untyped byte regions.
    pub const RAW: Self = Self {
        tag: TypeTag::Raw,
        size: 1,
        align: 1,
    };

    /// Shape of a Rust type stored under `tag`.
    #[must_use]
    pub const fn of<T>(tag: TypeTag) -> Self {
        Self {
            tag,
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }

    /// ABI shape of a built-in type.
    #[must_use]
    pub const fn abi(tag: TypeTag) -> Self {
        Self {
            tag,
            size: tag.abi_size(),
            align: tag.abi_align(),
        }
    }

    /// ABI shape of a named built-in type.
    ///
    /// Type names come from the compiler's own table, so an unknown name
    /// means the program and the runtime disagree; that is fatal.
    #[must_use]
    pub fn named(type_name: &str) -> Self {
        match TypeTag::from_name(type_name) {
            Some(tag) => Self::abi(tag),
            None => crate::fatal!("size_of: unknown type '", type_name, "'"),
        }
    }
}

fn check_range(offset: usize, len: usize, size: usize) -> AllocResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(AllocError::OutOfBounds { offset, len, size }),
    }
}

/// An owned, zero-initialised block of heap memory.
///
/// The block is released exactly once, through the [`Heap`] it was
/// allocated from, when the region is deleted or dropped.
pub struct Region {
    ptr: NonNull<u8>,
    layout: Layout,
    shape: ElemShape,
    heap: Heap,
}

// Safety: a Region uniquely owns its block, like a Box<[u8]>.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Allocate `size` untyped bytes.
    pub fn new_by_size(heap: &Heap, size: usize) -> AllocResult<Self> {
        Self::allocate(heap, size, ElemShape::RAW)
    }

    /// Allocate room for one value of the named built-in type.
    pub fn new(heap: &Heap, type_name: &str) -> AllocResult<Self> {
        Self::new_array(heap, type_name, 1)
    }

    /// Allocate room for `count` values of the named built-in type.
    pub fn new_array(heap: &Heap, type_name: &str, count: usize) -> AllocResult<Self> {
        Self::for_elems(heap, ElemShape::named(type_name), count)
    }

    /// Allocate room for `count` elements of `shape`.
    pub fn for_elems(heap: &Heap, shape: ElemShape, count: usize) -> AllocResult<Self> {
        let size = shape.size.checked_mul(count).ok_or_else(|| {
            AllocError::InvalidLayout(format!(
                "{count} elements of {} bytes overflow the address space",
                shape.size
            ))
        })?;
        Self::allocate(heap, size, shape)
    }

    fn allocate(heap: &Heap, size: usize, shape: ElemShape) -> AllocResult<Self> {
        if size == 0 {
            return Err(AllocError::ZeroSized);
        }
        let layout = Layout::from_size_align(size, shape.align.max(1))?;

        // Safety: layout is non-zero; the block is released in Drop.
        let ptr = unsafe { heap.allocate_zeroed(layout)? };

        Ok(Self {
            ptr,
            layout,
            shape,
            heap: heap.clone(),
        })
    }

    /// Rebuild a region from parts produced by [`Region::into_raw_parts`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw_parts` on a region with the same
    /// `size` and `shape`, allocated from `heap`, and must not have been
    /// rebuilt before.
    pub unsafe fn from_raw_parts(heap: &Heap, ptr: NonNull<u8>, size: usize, shape: ElemShape) -> Self {
        // Safety: the caller guarantees this is the layout the block was allocated with.
        let layout = unsafe { Layout::from_size_align_unchecked(size, shape.align.max(1)) };
        Self {
            ptr,
            layout,
            shape,
            heap: heap.clone(),
        }
    }

    /// Give up ownership of the block without freeing it.
    #[must_use]
    pub fn into_raw_parts(self) -> (NonNull<u8>, usize, ElemShape) {
        let this = ManuallyDrop::new(self);
        // Release the heap handle; the block itself stays allocated.
        // Safety: `this` is never touched again, so the handle is read once.
        drop(unsafe { std::ptr::read(&this.heap) });
        (this.ptr, this.layout.size(), this.shape)
    }

    /// Release the block.
    pub fn delete(self) {
        drop(self);
    }

    /// Owned byte-for-byte copy, allocated from the same heap.
    pub fn try_clone(&self) -> AllocResult<Self> {
        let mut copy = Self::allocate(&self.heap, self.size(), self.shape)?;
        // Safety: both blocks are `size` bytes and distinct.
        unsafe {
            std::ptr::copy_nonoverlapping(self.as_ptr(), copy.as_mut_ptr(), self.size());
        }
        Ok(copy)
    }

    /// Borrowed view of the whole region.
    #[must_use]
    pub fn view(&self) -> RegionView<'_> {
        RegionView {
            ptr: self.ptr.as_ptr(),
            len: self.size(),
            shape: self.shape,
            _marker: PhantomData,
        }
    }

    /// Borrowed view starting `bytes` into the region.
    pub fn offset(&self, bytes: usize) -> AllocResult<RegionView<'_>> {
        self.view().offset(bytes)
    }

    /// Copy `n` bytes from `src` into the start of this region.
    pub fn copy_from(&mut self, src: RegionView<'_>, n: usize) -> AllocResult<()> {
        check_range(0, n, src.len())?;
        self.copy_from_bytes(src.as_bytes(), n)
    }

    /// Copy the first `n` bytes of this region into `dst`.
    pub fn copy_to(&self, dst: &mut Region, n: usize) -> AllocResult<()> {
        dst.copy_from(self.view(), n)
    }

    /// Copy `n` bytes from a caller-owned buffer into the start of this region.
    pub fn copy_from_bytes(&mut self, src: &[u8], n: usize) -> AllocResult<()> {
        self.write_at(0, src, n)
    }

    /// Copy the first `n` bytes of this region into a caller-owned buffer.
    pub fn copy_to_bytes(&self, dst: &mut [u8], n: usize) -> AllocResult<()> {
        check_range(0, n, self.size())?;
        check_range(0, n, dst.len())?;
        // Safety: both ranges were checked; `dst` cannot alias an owned region.
        unsafe {
            std::ptr::copy_nonoverlapping(self.as_ptr(), dst.as_mut_ptr(), n);
        }
        Ok(())
    }

    /// Copy `n` bytes of `src` to `offset` bytes into this region.
    pub fn write_at(&mut self, offset: usize, src: &[u8], n: usize) -> AllocResult<()> {
        check_range(offset, n, self.size())?;
        check_range(0, n, src.len())?;
        // Safety: both ranges were checked; `&mut self` excludes aliasing.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.as_mut_ptr().add(offset), n);
        }
        Ok(())
    }

    /// Move `n` bytes from `src` to `dst` within this region; ranges may overlap.
    pub fn copy_within(&mut self, src: usize, dst: usize, n: usize) -> AllocResult<()> {
        check_range(src, n, self.size())?;
        check_range(dst, n, self.size())?;
        // Safety: both ranges lie inside the block.
        unsafe {
            let base = self.as_mut_ptr();
            std::ptr::copy(base.add(src), base.add(dst), n);
        }
        Ok(())
    }

    /// Zero the first `n` bytes.
    pub fn set_zero(&mut self, n: usize) -> AllocResult<()> {
        check_range(0, n, self.size())?;
        // Safety: range checked above.
        unsafe {
            std::ptr::write_bytes(self.as_mut_ptr(), 0, n);
        }
        Ok(())
    }

    /// Replace the block with one of `new_size` bytes, keeping the common prefix.
    pub fn resize(&mut self, new_size: usize) -> AllocResult<()> {
        let mut grown = Self::allocate(&self.heap, new_size, self.shape)?;
        let keep = self.size().min(new_size);
        // Safety: `keep` fits in both blocks, which are distinct.
        unsafe {
            std::ptr::copy_nonoverlapping(self.as_ptr(), grown.as_mut_ptr(), keep);
        }
        std::mem::swap(self, &mut grown);
        Ok(())
    }

    /// Size of the block in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.layout.size()
    }

    /// Element shape.
    #[inline]
    #[must_use]
    pub const fn shape(&self) -> ElemShape {
        self.shape
    }

    /// Number of whole elements the block holds.
    #[inline]
    #[must_use]
    pub const fn elem_capacity(&self) -> usize {
        if self.shape.size == 0 {
            0
        } else {
            self.layout.size() / self.shape.size
        }
    }

    /// Heap the block was allocated from.
    #[inline]
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Raw pointer to the first byte.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable raw pointer to the first byte.
    #[inline]
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Address of the block as an integer.
    #[inline]
    #[must_use]
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// The block as a byte slice.
    ///
    /// Blocks start zeroed, so every byte is initialised.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // Safety: the block is `size` bytes, initialised at allocation.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size()) }
    }

    /// The block as a mutable byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // Safety: as above, with exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.size()) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // Safety: the block was allocated from `heap` with `layout` and is
        // released only here.
        unsafe { self.heap.deallocate(self.ptr, self.layout) };
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("ptr", &self.ptr)
            .field("size", &self.size())
            .field("shape", &self.shape)
            .finish()
    }
}

/// A borrowed window into memory owned elsewhere.
///
/// Views never own memory; copying one is free and dropping one releases
/// nothing.
#[derive(Debug, Clone, Copy)]
pub struct RegionView<'a> {
    ptr: *const u8,
    len: usize,
    shape: ElemShape,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> RegionView<'a> {
    /// A view of nothing.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            shape: ElemShape::RAW,
            _marker: PhantomData,
        }
    }

    /// View a caller-owned byte slice.
    #[must_use]
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
            shape: ElemShape::RAW,
            _marker: PhantomData,
        }
    }

    /// Whether this view points nowhere.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Number of bytes visible through the view.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the view covers no bytes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element shape inherited from the source.
    #[inline]
    #[must_use]
    pub const fn shape(&self) -> ElemShape {
        self.shape
    }

    /// Address of the first visible byte.
    #[inline]
    #[must_use]
    pub fn address(&self) -> usize {
        self.ptr as usize
    }

    /// A narrower view starting `bytes` further in.
    pub fn offset(&self, bytes: usize) -> AllocResult<RegionView<'a>> {
        check_range(bytes, 0, self.len)?;
        if self.is_null() {
            return Ok(*self);
        }
        Ok(Self {
            // Safety: `bytes <= len`, so the result stays in (or one past) the block.
            ptr: unsafe { self.ptr.add(bytes) },
            len: self.len - bytes,
            shape: self.shape,
            _marker: PhantomData,
        })
    }

    /// The visible bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        if self.is_null() {
            return &[];
        }
        // Safety: the view borrows `len` initialised bytes for `'a`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeapTracker;
    use std::sync::Arc;

    #[test]
    fn test_type_table() {
        assert_eq!(size_of("I64"), Some(8));
        assert_eq!(size_of("U8"), Some(1));
        assert_eq!(size_of("Bool"), Some(1));
        assert_eq!(size_of("Str"), Some(32));
        assert_eq!(size_of("HeapEntry"), Some(16));
        assert_eq!(size_of("Widget"), None);
        assert_eq!(size_of("Raw"), None);
    }

    #[test]
    fn test_new_by_size_zero_fails() {
        let heap = Heap::system();
        assert_eq!(Region::new_by_size(&heap, 0).unwrap_err(), AllocError::ZeroSized);
    }

    #[test]
    fn test_new_by_size_is_zeroed() {
        let heap = Heap::system();
        let region = Region::new_by_size(&heap, 32).unwrap();
        assert_eq!(region.size(), 32);
        assert_eq!(region.shape(), ElemShape::RAW);
        assert!(region.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_new_array_uses_type_table() {
        let heap = Heap::system();
        let region = Region::new_array(&heap, "I64", 4).unwrap();
        assert_eq!(region.size(), 32);
        assert_eq!(region.shape().tag, TypeTag::I64);
        assert_eq!(region.elem_capacity(), 4);

        let single = Region::new(&heap, "U8").unwrap();
        assert_eq!(single.size(), 1);
    }

    #[test]
    fn test_for_elems_overflow() {
        let heap = Heap::system();
        let shape = ElemShape::abi(TypeTag::I64);
        let err = Region::for_elems(&heap, shape, usize::MAX).unwrap_err();
        assert!(matches!(err, AllocError::InvalidLayout(_)));
    }

    #[test]
    fn test_try_clone_copies_bytes_and_shape() {
        let heap = Heap::system();
        let mut region = Region::new_array(&heap, "U8", 4).unwrap();
        region.copy_from_bytes(&[1, 2, 3, 4], 4).unwrap();

        let copy = region.try_clone().unwrap();
        assert_ne!(copy.address(), region.address());
        assert_eq!(copy.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(copy.shape(), region.shape());
    }

    #[test]
    fn test_offset_is_borrowed_and_bounded() {
        let heap = Heap::system();
        let mut region = Region::new_by_size(&heap, 8).unwrap();
        region.copy_from_bytes(b"abcdefgh", 8).unwrap();

        let view = region.offset(3).unwrap();
        assert_eq!(view.as_bytes(), b"defgh");
        assert_eq!(view.address(), region.address() + 3);

        let nested = view.offset(5).unwrap();
        assert!(nested.is_empty());

        assert!(matches!(
            region.offset(9),
            Err(AllocError::OutOfBounds { offset: 9, .. })
        ));
    }

    #[test]
    fn test_copy_between_regions() {
        let heap = Heap::system();
        let mut src = Region::new_by_size(&heap, 4).unwrap();
        src.copy_from_bytes(b"kiln", 4).unwrap();
        let mut dst = Region::new_by_size(&heap, 6).unwrap();

        src.copy_to(&mut dst, 4).unwrap();
        assert_eq!(&dst.as_bytes()[..4], b"kiln");

        let mut small = Region::new_by_size(&heap, 2).unwrap();
        assert!(src.copy_to(&mut small, 4).is_err());
        assert!(dst.copy_from(src.view(), 5).is_err());
    }

    #[test]
    fn test_copy_to_bytes() {
        let heap = Heap::system();
        let mut region = Region::new_by_size(&heap, 3).unwrap();
        region.copy_from_bytes(b"xyz", 3).unwrap();

        let mut out = [0u8; 3];
        region.copy_to_bytes(&mut out, 3).unwrap();
        assert_eq!(&out, b"xyz");

        let mut short = [0u8; 2];
        assert!(region.copy_to_bytes(&mut short, 3).is_err());
    }

    #[test]
    fn test_copy_within_overlapping() {
        let heap = Heap::system();
        let mut region = Region::new_by_size(&heap, 5).unwrap();
        region.copy_from_bytes(b"abcde", 5).unwrap();
        region.copy_within(0, 1, 4).unwrap();
        assert_eq!(region.as_bytes(), b"aabcd");
    }

    #[test]
    fn test_set_zero() {
        let heap = Heap::system();
        let mut region = Region::new_by_size(&heap, 4).unwrap();
        region.copy_from_bytes(&[9, 9, 9, 9], 4).unwrap();
        region.set_zero(2).unwrap();
        assert_eq!(region.as_bytes(), &[0, 0, 9, 9]);
        assert!(region.set_zero(5).is_err());
    }

    #[test]
    fn test_resize_keeps_prefix() {
        let heap = Heap::system();
        let mut region = Region::new_by_size(&heap, 2).unwrap();
        region.copy_from_bytes(&[7, 8], 2).unwrap();
        region.resize(4).unwrap();
        assert_eq!(region.as_bytes(), &[7, 8, 0, 0]);
    }

    #[test]
    fn test_null_view() {
        let view = RegionView::null();
        assert!(view.is_null());
        assert!(view.as_bytes().is_empty());
        assert!(view.offset(0).unwrap().is_null());
        assert!(view.offset(1).is_err());
    }

    #[test]
    fn test_views_never_free() {
        let tracker = Arc::new(HeapTracker::with_tracking());
        let heap = Heap::tracked(Arc::clone(&tracker));

        let region = Region::new_by_size(&heap, 16).unwrap();
        {
            let view = region.view();
            let copy = view;
            let _ = copy.offset(8).unwrap();
        }
        assert_eq!(tracker.report().unwrap().count, 1);

        region.delete();
        assert_eq!(tracker.report().unwrap().count, 0);
    }

    #[test]
    fn test_raw_parts_round_trip() {
        let tracker = Arc::new(HeapTracker::with_tracking());
        let heap = Heap::tracked(Arc::clone(&tracker));

        let region = Region::new_by_size(&heap, 8).unwrap();
        let (ptr, size, shape) = region.into_raw_parts();
        assert_eq!(tracker.report().unwrap().count, 1);

        let rebuilt = unsafe { Region::from_raw_parts(&heap, ptr, size, shape) };
        assert_eq!(rebuilt.size(), 8);
        drop(rebuilt);
        assert_eq!(tracker.report().unwrap().bytes, 0);
    }
}
