//! Consistency checker.
//!
//! Walks the heap from the prologue to the epilogue, then every free list,
//! verifying block layout and free-list invariants and reporting (with a
//! caller-supplied tag) the first violation found. Never mutates state.
//! Grounded on `mm.c`'s `mm_checkheap`, including its heap-size sanity
//! bound ahead of the main walk.

use std::collections::HashSet;

use crate::block;
use crate::constants::{DWORD, LIST_COUNT, MIN_BLOCK, PROLOGUE_HEADER_OFFSET, WORD};
use crate::error::Violation;
use crate::free_list::FreeListRegistry;
use crate::heap::SbrkHeap;
use crate::size_class;

const MAX_HEAP_SIZE: usize = 0x1_0000_0000;

fn in_heap(heap: &SbrkHeap, addr: *mut u8) -> bool {
    addr >= heap.heap_low() && addr <= heap.heap_high()
}

fn dword_aligned(addr: *mut u8) -> bool {
    (addr as usize) % DWORD == 0
}

fn violation(tag: &str, detail: impl Into<String>) -> Violation {
    Violation::new("check_heap", format!("{tag}: {}", detail.into()))
}

/// Walks the whole heap and free-list structure, returning the first
/// invariant violation found, if any. `tag` identifies the call site in
/// the report (mirrors `mm_checkheap(int lineno)`'s `lineno` parameter).
pub fn check_heap(heap: &SbrkHeap, registry: &FreeListRegistry, tag: &str) -> Option<Violation> {
    if let Some(v) = check_heap_inner(heap, registry, tag) {
        eprintln!("{v}");
        Some(v)
    } else {
        None
    }
}

fn check_heap_inner(heap: &SbrkHeap, registry: &FreeListRegistry, tag: &str) -> Option<Violation> {
    if heap.heap_size() >= MAX_HEAP_SIZE {
        return Some(violation(tag, "heap size exceeds the sanity bound"));
    }

    let base = heap.heap_low();
    if base.is_null() {
        return None;
    }

    let prologue_header = unsafe { base.add(PROLOGUE_HEADER_OFFSET) };
    let prologue_bp = unsafe { prologue_header.add(WORD) };
    unsafe {
        if block::block_size(prologue_header) != DWORD || !block::block_alloc(prologue_header) {
            return Some(violation(tag, "prologue header malformed"));
        }
    }

    let mut bp = unsafe { block::next_block(prologue_bp) };
    let mut prev_alloc = true;
    let mut free_blocks_seen: HashSet<usize> = HashSet::new();

    loop {
        let size = unsafe { block::block_size(block::header_of(bp)) };
        if size == 0 {
            break;
        }

        if !in_heap(heap, bp) {
            return Some(violation(tag, "block escapes heap bounds"));
        }
        if !dword_aligned(bp) {
            return Some(violation(tag, "payload address is not dword-aligned"));
        }
        if size < MIN_BLOCK {
            return Some(violation(tag, "block smaller than the minimum block size"));
        }

        let alloc = unsafe { block::block_alloc(block::header_of(bp)) };
        if !alloc {
            let footer_size = unsafe { block::block_size(block::footer_of(bp)) };
            let footer_alloc = unsafe { block::block_alloc(block::footer_of(bp)) };
            if size != footer_size || alloc != footer_alloc {
                return Some(violation(tag, "free block header/footer size or alloc bit mismatch"));
            }
            if !prev_alloc {
                return Some(violation(tag, "two consecutive free blocks"));
            }
            free_blocks_seen.insert(bp as usize);
        }

        let observed_prev_alloc = unsafe { block::block_prev_alloc(block::header_of(bp)) };
        if observed_prev_alloc != prev_alloc {
            return Some(violation(tag, "prev_alloc bit disagrees with predecessor's actual state"));
        }

        prev_alloc = alloc;
        bp = unsafe { block::next_block(bp) };
    }

    if !unsafe { block::block_alloc(block::header_of(bp)) } {
        return Some(violation(tag, "epilogue is not marked allocated"));
    }

    let mut listed_blocks: HashSet<usize> = HashSet::new();

    for index in 0..LIST_COUNT {
        let mut cursor = registry.list_head(index);
        let mut last_size: Option<usize> = None;
        let mut pred_of_cursor: Option<*mut u8> = None;

        while let Some(node) = cursor {
            if unsafe { block::block_alloc(block::header_of(node)) } {
                return Some(violation(tag, format!("allocated block found in free list {index}")));
            }
            if !in_heap(heap, node) {
                return Some(violation(tag, format!("free-list node out of heap bounds in list {index}")));
            }

            let size = unsafe { block::block_size(block::header_of(node)) };
            if size_class::class_of(size) != index {
                return Some(violation(tag, format!("block in list {index} belongs to a different size class")));
            }
            if let Some(prev_size) = last_size {
                if size < prev_size {
                    return Some(violation(tag, format!("list {index} is not sorted by non-decreasing size")));
                }
            }
            last_size = Some(size);

            let pred = unsafe { block::pred_link(registry.base(), node) };
            if pred != pred_of_cursor {
                return Some(violation(tag, format!("back-link mismatch in list {index}")));
            }
            let succ = unsafe { block::succ_link(registry.base(), node) };
            if let Some(s) = succ {
                let succ_pred = unsafe { block::pred_link(registry.base(), s) };
                if succ_pred != Some(node) {
                    return Some(violation(tag, format!("forward/back link disagreement in list {index}")));
                }
            }

            listed_blocks.insert(node as usize);
            pred_of_cursor = Some(node);
            cursor = succ;
        }
    }

    if !free_blocks_seen.is_subset(&listed_blocks) {
        return Some(violation(tag, "a free block found during the heap walk is not linked into any free list"));
    }

    None
}
