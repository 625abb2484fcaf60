//! Coalesce/split/place state machine.
//!
//! Grounded line-for-line on `mm.c`'s `extend_heap`/`coalesce`/`place`/
//! `find_fit`, re-expressed over the `block`/`free_list` modules instead
//! of raw macros.

use crate::block;
use crate::constants::{LIST_COUNT, MIN_BLOCK, WORD};
use crate::error::Violation;
use crate::free_list::FreeListRegistry;
use crate::heap::SbrkHeap;
use crate::size_class;

/// Address of the current epilogue header: the last word of the
/// contiguous region the provider has handed out so far. Holds as an
/// invariant after `init` and after every `extend_heap` call.
fn epilogue_addr(heap: &SbrkHeap) -> *mut u8 {
    unsafe { heap.heap_high().add(1).sub(WORD) }
}

/// Grows the heap by (an even number of) `words`, lays down a new free
/// block over the old epilogue slot, writes a fresh epilogue after it, and
/// coalesces with the physical predecessor if it's free.
///
/// Returns the payload address of the resulting free block, or `None` if
/// the provider refused to grow.
///
/// # Safety
/// `base` must be the heap's base address and `registry` must describe the
/// same heap.
pub unsafe fn extend_heap(
    heap: &SbrkHeap,
    registry: &FreeListRegistry,
    base: *mut u8,
    words: usize,
) -> Option<*mut u8> {
    let words = if words % 2 != 0 { words + 1 } else { words };
    let size_bytes = words * WORD;

    let old_epilogue = epilogue_addr(heap);
    let raw_base = heap.extend(size_bytes)?;
    debug_assert_eq!(
        raw_base,
        unsafe { old_epilogue.add(WORD) },
        "extend must grow the heap tail contiguously"
    );

    unsafe {
        let new_block = old_epilogue.add(WORD);
        block::set_header(old_epilogue, size_bytes, false);
        block::set_footer(block::footer_of(new_block), size_bytes, false);

        let new_epilogue = old_epilogue.add(size_bytes);
        block::set_header(new_epilogue, 0, true);
        block::set_prev_alloc(new_epilogue, false);

        block::set_pred_link(base, new_block, None);
        block::set_succ_link(base, new_block, None);

        coalesce(base, registry, new_block).ok()
    }
}

/// Merges a newly-free block with its physical neighbors (four cases:
/// prev/next each allocated or free), updates the `prev_alloc` bit of
/// whatever now follows the merged block, inserts it into its free list,
/// and returns its (possibly shifted) payload address.
///
/// # Safety
/// `bp` must be a free block not currently linked into any free list.
pub unsafe fn coalesce(
    base: *mut u8,
    registry: &FreeListRegistry,
    bp: *mut u8,
) -> Result<*mut u8, Violation> {
    unsafe {
        let prev_alloc = block::block_prev_alloc(block::header_of(bp));
        let next = block::next_block(bp);
        let next_alloc = block::block_alloc(block::header_of(next));

        let merged = match (prev_alloc, next_alloc) {
            (true, true) => bp,
            (true, false) => {
                let new_size = block::block_size(block::header_of(bp)) + block::block_size(block::header_of(next));
                registry.remove(next)?;
                block::set_header(block::header_of(bp), new_size, false);
                block::set_footer(block::footer_of(bp), new_size, false);
                bp
            }
            (false, true) => {
                let prev = block::prev_block(bp);
                let footer_addr = block::footer_of(bp);
                let new_size = block::block_size(block::header_of(prev)) + block::block_size(block::header_of(bp));
                registry.remove(prev)?;
                block::set_header(block::header_of(prev), new_size, false);
                block::set_footer(footer_addr, new_size, false);
                prev
            }
            (false, false) => {
                let prev = block::prev_block(bp);
                let footer_addr = block::footer_of(next);
                let new_size = block::block_size(block::header_of(prev))
                    + block::block_size(block::header_of(bp))
                    + block::block_size(block::header_of(next));
                registry.remove(prev)?;
                registry.remove(next)?;
                block::set_header(block::header_of(prev), new_size, false);
                block::set_footer(footer_addr, new_size, false);
                prev
            }
        };

        block::set_prev_alloc(block::header_of(block::next_block(merged)), false);
        registry.insert(merged)?;
        Ok(merged)
    }
}

/// Shared split-or-consume logic behind `place` and `shrink_in_place`.
///
/// `remove_from_list` distinguishes "`bp` is currently free and listed"
/// (the `place` case) from "`bp` is already allocated and not listed" (a
/// `resize` shrink-in-place: exactly as `place`, but without removing from
/// a list).
unsafe fn place_common(
    base: *mut u8,
    registry: &FreeListRegistry,
    bp: *mut u8,
    asize: usize,
    remove_from_list: bool,
) -> Result<(), Violation> {
    unsafe {
        let csize = block::block_size(block::header_of(bp));
        debug_assert!(csize >= asize);
        let remainder_size = csize - asize;

        if remove_from_list {
            registry.remove(bp)?;
        }

        if remainder_size >= MIN_BLOCK {
            block::set_header(block::header_of(bp), asize, true);

            let remainder = block::next_block(bp);
            block::set_header(block::header_of(remainder), remainder_size, false);
            block::set_prev_alloc(block::header_of(remainder), true);
            block::set_footer(block::footer_of(remainder), remainder_size, false);
            block::set_prev_alloc(block::header_of(block::next_block(remainder)), false);
            block::set_pred_link(base, remainder, None);
            block::set_succ_link(base, remainder, None);

            coalesce(base, registry, remainder)?;
        } else if remove_from_list {
            block::set_header(block::header_of(bp), csize, true);
            block::set_prev_alloc(block::header_of(block::next_block(bp)), true);
        }
        Ok(())
    }
}

/// Converts a free block (in whole or part) into an allocated block of
/// `asize` bytes, splitting off and coalescing a remainder when the split
/// would leave at least `MIN_BLOCK` bytes.
///
/// # Safety
/// `bp` must be a free, listed block with `block_size(bp) >= asize`.
pub unsafe fn place(
    base: *mut u8,
    registry: &FreeListRegistry,
    bp: *mut u8,
    asize: usize,
) -> Result<(), Violation> {
    unsafe { place_common(base, registry, bp, asize, true) }
}

/// Shrinks an already-allocated block to `asize` bytes in place, as
/// [`place`] would, but without touching any free list for `bp` itself
/// (it was never listed).
///
/// # Safety
/// `bp` must be an allocated block with `block_size(bp) >= asize`.
pub unsafe fn shrink_in_place(
    base: *mut u8,
    registry: &FreeListRegistry,
    bp: *mut u8,
    asize: usize,
) -> Result<(), Violation> {
    unsafe { place_common(base, registry, bp, asize, false) }
}

/// Scans size classes from `class_of(asize)` upward, returning the first
/// block in the first non-empty-enough class whose size is at least
/// `asize`. Intra-list sorting makes this best-fit within its class.
pub fn find_fit(registry: &FreeListRegistry, asize: usize) -> Option<*mut u8> {
    for index in size_class::class_of(asize)..LIST_COUNT {
        let mut cursor = registry.list_head(index);
        while let Some(bp) = cursor {
            if unsafe { block::block_size(block::header_of(bp)) } >= asize {
                return Some(bp);
            }
            cursor = unsafe { block::succ_link(registry.base(), bp) };
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DWORD, PROLOGUE_HEADER_OFFSET};

    /// A scratch region addressed the same way the real heap is:
    /// everything relative to `base`, blocks laid out by hand at chosen
    /// offsets so each coalesce/place case can be set up directly.
    struct Scratch {
        region: Vec<u8>,
    }

    impl Scratch {
        fn new() -> Self {
            Self {
                region: vec![0u8; 8192],
            }
        }

        fn base(&mut self) -> *mut u8 {
            self.region.as_mut_ptr()
        }

        fn registry(&mut self) -> FreeListRegistry {
            unsafe { FreeListRegistry::new(self.base()) }
        }

        fn write_allocated(&mut self, header_offset: usize, size: usize, prev_alloc: bool) -> *mut u8 {
            let base = self.base();
            let header = unsafe { base.add(header_offset) };
            unsafe {
                block::set_header(header, size, true);
                block::set_prev_alloc(header, prev_alloc);
                header.add(WORD)
            }
        }

        fn write_free(&mut self, header_offset: usize, size: usize, prev_alloc: bool) -> *mut u8 {
            let base = self.base();
            let header = unsafe { base.add(header_offset) };
            unsafe {
                block::set_header(header, size, false);
                block::set_prev_alloc(header, prev_alloc);
                let bp = header.add(WORD);
                block::set_footer(block::footer_of(bp), size, false);
                block::set_pred_link(base, bp, None);
                block::set_succ_link(base, bp, None);
                bp
            }
        }
    }

    #[test]
    fn extend_heap_lays_down_a_free_block_and_a_new_epilogue() {
        let heap = SbrkHeap::new();
        let setup_bytes = (LIST_COUNT + 4) * WORD;
        let base = heap.extend(setup_bytes).expect("sbrk should succeed");

        let registry = unsafe { FreeListRegistry::new(base) };
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

        let bp = unsafe { extend_heap(&heap, &registry, base, 8) }.expect("heap provider should grow");
        unsafe {
            assert!(!block::block_alloc(block::header_of(bp)));
            assert_eq!(block::block_size(block::header_of(bp)), 32);
            assert!(block::block_prev_alloc(block::header_of(bp)));
        }
        assert_eq!(find_fit(&registry, 16), Some(bp));
    }

    #[test]
    fn coalesce_case_alloc_alloc_inserts_as_is() {
        let mut scratch = Scratch::new();
        scratch.write_allocated(200, 32, true);
        let bp = scratch.write_free(232, 32, true);
        scratch.write_allocated(264, 32, false);
        let registry = scratch.registry();

        let merged = unsafe { coalesce(scratch.base(), &registry, bp) }.unwrap();
        assert_eq!(merged, bp);
        unsafe {
            assert_eq!(block::block_size(block::header_of(merged)), 32);
            assert!(!block::block_prev_alloc(block::header_of(block::next_block(merged))));
        }
        assert_eq!(find_fit(&registry, 16), Some(bp));
    }

    #[test]
    fn coalesce_case_alloc_free_merges_with_next() {
        let mut scratch = Scratch::new();
        scratch.write_allocated(200, 32, true);
        let bp = scratch.write_free(232, 32, true);
        let next = scratch.write_free(264, 32, false);
        let registry = scratch.registry();
        unsafe { registry.insert(next).unwrap() };

        let merged = unsafe { coalesce(scratch.base(), &registry, bp) }.unwrap();
        assert_eq!(merged, bp);
        unsafe {
            assert_eq!(block::block_size(block::header_of(merged)), 64);
            assert!(!block::block_alloc(block::header_of(merged)));
        }
        assert_eq!(find_fit(&registry, 64), Some(bp));
    }

    #[test]
    fn coalesce_case_free_alloc_merges_with_prev() {
        let mut scratch = Scratch::new();
        let prev = scratch.write_free(200, 32, true);
        let bp = scratch.write_free(232, 32, false);
        scratch.write_allocated(264, 32, false);
        let registry = scratch.registry();
        unsafe { registry.insert(prev).unwrap() };

        let merged = unsafe { coalesce(scratch.base(), &registry, bp) }.unwrap();
        assert_eq!(merged, prev);
        unsafe {
            assert_eq!(block::block_size(block::header_of(merged)), 64);
            assert!(!block::block_prev_alloc(block::header_of(block::next_block(merged))));
        }
        assert_eq!(find_fit(&registry, 64), Some(prev));
    }

    #[test]
    fn coalesce_case_free_free_merges_both_neighbors() {
        let mut scratch = Scratch::new();
        let prev = scratch.write_free(200, 32, true);
        let bp = scratch.write_free(232, 32, false);
        let next = scratch.write_free(264, 32, false);
        let registry = scratch.registry();
        unsafe {
            registry.insert(prev).unwrap();
            registry.insert(next).unwrap();
        }

        let merged = unsafe { coalesce(scratch.base(), &registry, bp) }.unwrap();
        assert_eq!(merged, prev);
        unsafe {
            assert_eq!(block::block_size(block::header_of(merged)), 96);
        }
        assert_eq!(find_fit(&registry, 96), Some(prev));
    }

    #[test]
    fn place_splits_off_a_remainder_when_it_meets_the_minimum() {
        let mut scratch = Scratch::new();
        let bp = scratch.write_free(200, 64, true);
        scratch.write_allocated(264, 16, false);
        let registry = scratch.registry();
        unsafe { registry.insert(bp).unwrap() };

        unsafe { place(scratch.base(), &registry, bp, 32).unwrap() };

        unsafe {
            assert!(block::block_alloc(block::header_of(bp)));
            assert_eq!(block::block_size(block::header_of(bp)), 32);
            let remainder = block::next_block(bp);
            assert!(!block::block_alloc(block::header_of(remainder)));
            assert_eq!(block::block_size(block::header_of(remainder)), 32);
            assert!(block::block_prev_alloc(block::header_of(remainder)));
            assert_eq!(find_fit(&registry, 16), Some(remainder));
        }
    }

    #[test]
    fn place_consumes_the_whole_block_when_the_remainder_is_too_small() {
        let mut scratch = Scratch::new();
        let bp = scratch.write_free(200, 32, true);
        scratch.write_allocated(232, 16, false);
        let registry = scratch.registry();
        unsafe { registry.insert(bp).unwrap() };

        unsafe { place(scratch.base(), &registry, bp, 32).unwrap() };

        unsafe {
            assert!(block::block_alloc(block::header_of(bp)));
            assert_eq!(block::block_size(block::header_of(bp)), 32);
            assert!(block::block_prev_alloc(block::header_of(block::next_block(bp))));
        }
        assert_eq!(find_fit(&registry, 1), None);
    }

    #[test]
    fn shrink_in_place_splits_without_touching_any_list_for_the_shrunk_block() {
        let mut scratch = Scratch::new();
        let bp = scratch.write_allocated(200, 64, true);
        scratch.write_allocated(264, 16, false);
        let registry = scratch.registry();

        unsafe { shrink_in_place(scratch.base(), &registry, bp, 32).unwrap() };

        unsafe {
            assert!(block::block_alloc(block::header_of(bp)));
            assert_eq!(block::block_size(block::header_of(bp)), 32);
            let remainder = block::next_block(bp);
            assert!(!block::block_alloc(block::header_of(remainder)));
            assert_eq!(block::block_size(block::header_of(remainder)), 32);
            assert_eq!(find_fit(&registry, 16), Some(remainder));
        }
    }

    #[test]
    fn find_fit_scans_upward_through_empty_classes() {
        let mut scratch = Scratch::new();
        let bp = scratch.write_free(200, 512, true);
        let registry = scratch.registry();
        unsafe { registry.insert(bp).unwrap() };

        assert_eq!(find_fit(&registry, 40), Some(bp));
        assert_eq!(find_fit(&registry, 600), None);
    }
}
