//! Low-level primitives over the region's backing buffer.
//!
//! This is the only module in the workspace with `unsafe` code. Every
//! function here is safe to call: each checks its byte range against the
//! buffer's full capacity before touching memory, so the host process stays
//! memory safe whatever addresses guest code computes. Whether an address is
//! inside the *currently accessible* part of the region is the caller's
//! concern (see [`LinearMemory`](crate::LinearMemory)).
//!
//! The buffer is shared between threads without locking. Plain loads and
//! stores from several threads to the same bytes are a data race that the
//! contract of the crate leaves to the caller to avoid; atomics go through
//! `Atomic*::from_ptr` on naturally aligned cells.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8};

/// Alignment of the buffer base; large enough for every atomic cell.
pub(crate) const BUFFER_ALIGN: usize = 8;

/// A fixed-capacity, zero-initialised, 8-byte-aligned byte buffer.
pub(crate) struct RawBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
}

// SAFETY: RawBuffer owns its allocation and exposes it only through the
// bounds-checked methods below. Concurrent plain access to overlapping
// bytes is excluded by contract; atomics are genuinely atomic.
unsafe impl Send for RawBuffer {}
// SAFETY: see above.
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    /// Reserve and zero `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not representable as a layout.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "raw buffer capacity must be non-zero");
        let layout = Self::layout(capacity);
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout)
        };
        Self { ptr, capacity }
    }

    fn layout(capacity: usize) -> Layout {
        match Layout::from_size_align(capacity, BUFFER_ALIGN) {
            Ok(layout) => layout,
            Err(_) => panic!("raw buffer capacity {capacity} overflows a layout"),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn check(&self, offset: usize, len: usize) {
        let end = offset.checked_add(len);
        assert!(
            matches!(end, Some(end) if end <= self.capacity),
            "raw access [{offset}, +{len}) outside buffer of {} bytes",
            self.capacity
        );
    }

    #[inline]
    fn at(&self, offset: usize) -> *mut u8 {
        // SAFETY: callers check offset <= capacity first, so the result is
        // within (or one past) the allocation.
        unsafe { self.ptr.as_ptr().add(offset) }
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub(crate) fn load(&self, offset: usize, dst: &mut [u8]) {
        self.check(offset, dst.len());
        // SAFETY: source range checked above; `dst` is a distinct Rust
        // allocation so the ranges cannot overlap.
        unsafe { std::ptr::copy_nonoverlapping(self.at(offset), dst.as_mut_ptr(), dst.len()) }
    }

    /// Copy `src` into the buffer starting at `offset`.
    pub(crate) fn store(&self, offset: usize, src: &[u8]) {
        self.check(offset, src.len());
        // SAFETY: destination range checked above; `src` is a distinct Rust
        // allocation so the ranges cannot overlap.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.at(offset), src.len()) }
    }

    /// Set `len` bytes starting at `offset` to `byte`.
    pub(crate) fn fill(&self, offset: usize, byte: u8, len: usize) {
        self.check(offset, len);
        // SAFETY: range checked above.
        unsafe { std::ptr::write_bytes(self.at(offset), byte, len) }
    }

    /// Copy `len` bytes from `src` to `dst`; the ranges may overlap.
    pub(crate) fn copy_within(&self, dst: usize, src: usize, len: usize) {
        self.check(dst, len);
        self.check(src, len);
        // SAFETY: both ranges checked above; `ptr::copy` is memmove.
        unsafe { std::ptr::copy(self.at(src), self.at(dst), len) }
    }

    #[inline]
    fn check_atomic(&self, offset: usize, size: usize) {
        self.check(offset, size);
        assert!(
            offset % size == 0,
            "atomic access at {offset:#x} is not {size}-byte aligned"
        );
    }

    pub(crate) fn atomic_u8(&self, offset: usize) -> &AtomicU8 {
        self.check_atomic(offset, 1);
        // SAFETY: in bounds; the buffer outlives the returned reference;
        // all bytes are valid AtomicU8 values.
        unsafe { AtomicU8::from_ptr(self.at(offset)) }
    }

    pub(crate) fn atomic_u16(&self, offset: usize) -> &AtomicU16 {
        self.check_atomic(offset, 2);
        // SAFETY: in bounds and 2-aligned (the base is 8-aligned).
        unsafe { AtomicU16::from_ptr(self.at(offset).cast()) }
    }

    pub(crate) fn atomic_u32(&self, offset: usize) -> &AtomicU32 {
        self.check_atomic(offset, 4);
        // SAFETY: in bounds and 4-aligned (the base is 8-aligned).
        unsafe { AtomicU32::from_ptr(self.at(offset).cast()) }
    }

    pub(crate) fn atomic_u64(&self, offset: usize) -> &AtomicU64 {
        self.check_atomic(offset, 8);
        // SAFETY: in bounds and 8-aligned (the base is 8-aligned).
        unsafe { AtomicU64::from_ptr(self.at(offset).cast()) }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.capacity)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn starts_zeroed() {
        let buf = RawBuffer::new(64);
        let mut out = [0xAAu8; 64];
        buf.load(0, &mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn store_then_load() {
        let buf = RawBuffer::new(16);
        buf.store(3, &[1, 2, 3, 4]);
        let mut out = [0u8; 6];
        buf.load(2, &mut out);
        assert_eq!(out, [0, 1, 2, 3, 4, 0]);
    }

    #[test]
    fn overlapping_copy_is_memmove() {
        let buf = RawBuffer::new(16);
        buf.store(0, &[1, 2, 3, 4, 5]);
        buf.copy_within(2, 0, 5);
        let mut out = [0u8; 7];
        buf.load(0, &mut out);
        assert_eq!(out, [1, 2, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn atomics_share_bytes_with_plain_access() {
        let buf = RawBuffer::new(16);
        buf.atomic_u32(8).store(0xDEAD_BEEF, Ordering::SeqCst);
        let mut out = [0u8; 4];
        buf.load(8, &mut out);
        assert_eq!(u32::from_le_bytes(out), 0xDEAD_BEEF);
        assert_eq!(buf.atomic_u64(8).load(Ordering::SeqCst), 0xDEAD_BEEF);
    }

    #[test]
    #[should_panic(expected = "outside buffer")]
    fn load_past_end_panics() {
        let buf = RawBuffer::new(8);
        let mut out = [0u8; 2];
        buf.load(7, &mut out);
    }

    #[test]
    #[should_panic(expected = "not 4-byte aligned")]
    fn misaligned_atomic_panics() {
        let buf = RawBuffer::new(16);
        let _ = buf.atomic_u32(2);
    }
}
