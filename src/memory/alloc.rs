//! Native byte allocator for paged raw partitions
//!
//! Paged partitions live outside the pooled block store: each one gets a
//! single native buffer sized to its blob and returns it explicitly through
//! [`NativeAllocator::free`]. The allocator tracks outstanding allocations so
//! a batch can assert that teardown returned everything.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::MemoryError;

const BUF_ALIGN: usize = 8;

/// An owned native buffer
///
/// Has no `Drop` implementation on purpose: the memory is released only by
/// handing the buffer back to the allocator that produced it, which keeps the
/// outstanding-allocation accounting exact. A buffer that is dropped without
/// being freed leaks its memory.
#[derive(Debug)]
pub struct NativeBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is an exclusively owned heap allocation; nothing about
// it is tied to the thread that allocated it.
unsafe impl Send for NativeBuf {}

impl NativeBuf {
    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty (never true for allocator-produced buffers)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the buffer as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len come from a successful zeroed allocation owned by
        // this value, and the allocation stays live until `free` consumes it.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the buffer as a mutable byte slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: same as `as_slice`, plus &mut self guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Native allocator with outstanding-allocation accounting
///
/// Thread-affine: one allocator per worker arena, no internal locking.
#[derive(Debug, Default)]
pub struct NativeAllocator {
    outstanding_allocs: usize,
    outstanding_bytes: usize,
    total_allocs: u64,
}

impl NativeAllocator {
    /// Create a new allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-initialized native buffer of `len` bytes
    pub fn alloc(&mut self, len: usize) -> Result<NativeBuf, MemoryError> {
        if len == 0 {
            return Err(MemoryError::ZeroLengthAllocation);
        }
        let layout = Layout::from_size_align(len, BUF_ALIGN)
            .map_err(|_| MemoryError::AllocationFailed { bytes: len })?;
        // SAFETY: layout has non-zero size, checked above.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(MemoryError::AllocationFailed { bytes: len })?;

        self.outstanding_allocs += 1;
        self.outstanding_bytes += len;
        self.total_allocs += 1;
        Ok(NativeBuf { ptr, len })
    }

    /// Return a buffer to the system
    pub fn free(&mut self, buf: NativeBuf) {
        let layout = Layout::from_size_align(buf.len, BUF_ALIGN)
            .expect("layout was valid at allocation time");
        // SAFETY: buf was produced by `alloc` with this layout and ownership
        // of the allocation travels with the NativeBuf value.
        unsafe { dealloc(buf.ptr.as_ptr(), layout) };

        self.outstanding_allocs -= 1;
        self.outstanding_bytes -= buf.len;
    }

    /// Number of buffers currently handed out
    pub fn outstanding_allocations(&self) -> usize {
        self.outstanding_allocs
    }

    /// Bytes currently handed out
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes
    }

    /// Total allocations over the allocator's lifetime
    pub fn total_allocations(&self) -> u64 {
        self.total_allocs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_accounting() {
        let mut a = NativeAllocator::new();
        let b1 = a.alloc(128).unwrap();
        let b2 = a.alloc(64).unwrap();
        assert_eq!(a.outstanding_allocations(), 2);
        assert_eq!(a.outstanding_bytes(), 192);

        a.free(b1);
        assert_eq!(a.outstanding_allocations(), 1);
        assert_eq!(a.outstanding_bytes(), 64);

        a.free(b2);
        assert_eq!(a.outstanding_allocations(), 0);
        assert_eq!(a.outstanding_bytes(), 0);
        assert_eq!(a.total_allocations(), 2);
    }

    #[test]
    fn test_zeroed_and_writable() {
        let mut a = NativeAllocator::new();
        let mut buf = a.alloc(16).unwrap();
        assert!(buf.as_slice().iter().all(|&b| b == 0));

        buf.as_mut_slice()[3] = 0xAB;
        assert_eq!(buf.as_slice()[3], 0xAB);
        a.free(buf);
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut a = NativeAllocator::new();
        assert!(matches!(
            a.alloc(0),
            Err(MemoryError::ZeroLengthAllocation)
        ));
    }
}
