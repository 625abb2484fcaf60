//! The page-granular heap provider.
//!
//! A thin, concrete implementation of the provider interface the core
//! needs (`extend`/`heap_low`/`heap_high`/`heap_size`), grounded directly
//! in `bump.rs::BumpAllocator::allocate`'s own use of `libc::sbrk`: extend
//! the process break, check for the `(void*)-1` failure sentinel, and
//! hand back the old break as the base of the newly available bytes.

use libc::{c_void, intptr_t, sbrk};
use std::cell::Cell;
use std::ptr;

/// Grows the process heap tail via `sbrk` and tracks the span handed out
/// so far.
///
/// Not thread-safe: `sbrk` itself mutates global process state, and
/// nothing here synchronizes concurrent callers.
pub struct SbrkHeap {
    lo: Cell<*mut u8>,
    hi: Cell<*mut u8>,
}

impl SbrkHeap {
    pub const fn new() -> Self {
        Self {
            lo: Cell::new(ptr::null_mut()),
            hi: Cell::new(ptr::null_mut()),
        }
    }

    /// Extends the heap tail by `bytes` and returns the base address of the
    /// newly available region, or `None` if the provider refused (mirrors
    /// `sbrk` returning `(void*)-1`).
    pub fn extend(&self, bytes: usize) -> Option<*mut u8> {
        let old_break = unsafe { sbrk(bytes as intptr_t) };
        if old_break == usize::MAX as *mut c_void {
            return None;
        }
        let base = old_break as *mut u8;
        if self.lo.get().is_null() {
            self.lo.set(base);
        }
        self.hi.set(unsafe { base.add(bytes).sub(1) });
        Some(base)
    }

    /// Lower byte address of the managed region (inclusive). Constant once
    /// the first `extend` succeeds.
    pub fn heap_low(&self) -> *mut u8 {
        self.lo.get()
    }

    /// Upper byte address of the managed region (inclusive). Moves forward
    /// after every successful `extend`.
    pub fn heap_high(&self) -> *mut u8 {
        self.hi.get()
    }

    /// Current byte span of the managed region, `0` before the first
    /// successful `extend`.
    pub fn heap_size(&self) -> usize {
        if self.lo.get().is_null() {
            return 0;
        }
        (self.hi.get() as usize) - (self.lo.get() as usize) + 1
    }
}

impl Default for SbrkHeap {
    fn default() -> Self {
        Self::new()
    }
}
