//! Segregated free-list registry.
//!
//! Ten list-head slots live at fixed offsets from the heap base
//! (offsets 4, 8, ..., 40). Each list is a doubly-linked chain of free
//! blocks sorted by increasing size, so that first-fit within a class is
//! best-fit within that class. Grounded on `mm.c`'s
//! `insert_list`/`delete_list`.

use crate::block;
use crate::constants::{LIST_COUNT, WORD};
use crate::error::Violation;
use crate::size_class;

/// A thin handle onto the ten list-head slots stored at the base of the
/// managed heap. Cheap to construct; carries no state of its own beyond
/// the base pointer.
#[derive(Clone, Copy)]
pub struct FreeListRegistry {
    base: *mut u8,
}

impl FreeListRegistry {
    /// # Safety
    /// `base` must be the address returned by the heap provider's first
    /// `extend` call (the start of the managed region).
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }

    fn slot_addr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < LIST_COUNT);
        unsafe { self.base.add(WORD + index * WORD) }
    }

    /// Head of size-class list `index`, or `None` if empty.
    pub fn list_head(&self, index: usize) -> Option<*mut u8> {
        let raw = unsafe { std::ptr::read(self.slot_addr(index) as *const u32) };
        block::decode_link(self.base, raw)
    }

    /// Sets the head of size-class list `index`.
    pub fn set_list_head(&self, index: usize, target: Option<*mut u8>) {
        let encoded = block::encode_link(self.base, target);
        unsafe { std::ptr::write(self.slot_addr(index) as *mut u32, encoded) };
    }

    /// Inserts a free block into its size class, keeping the class sorted
    /// by non-decreasing size.
    ///
    /// # Safety
    /// `bp` must be a free block not currently in any list.
    pub unsafe fn insert(&self, bp: *mut u8) -> Result<(), Violation> {
        unsafe {
            if block::block_alloc(block::header_of(bp)) {
                return Err(Violation::new(
                    "free_list::insert",
                    "attempted to insert an allocated block into a free list",
                ));
            }
            let size = block::block_size(block::header_of(bp));
            let index = size_class::class_of(size);

            let mut prev = None;
            let mut cursor = self.list_head(index);
            while let Some(node) = cursor {
                if block::block_size(block::header_of(node)) < size {
                    prev = Some(node);
                    cursor = block::succ_link(self.base, node);
                } else {
                    break;
                }
            }
            let next = cursor;

            block::set_pred_link(self.base, bp, prev);
            block::set_succ_link(self.base, bp, next);
            match prev {
                Some(p) => block::set_succ_link(self.base, p, Some(bp)),
                None => self.set_list_head(index, Some(bp)),
            }
            if let Some(n) = next {
                block::set_pred_link(self.base, n, Some(bp));
            }
            Ok(())
        }
    }

    /// Removes a free block from its size class.
    ///
    /// # Safety
    /// `bp` must be a free block currently in its class's list.
    pub unsafe fn remove(&self, bp: *mut u8) -> Result<(), Violation> {
        unsafe {
            if block::block_alloc(block::header_of(bp)) {
                return Err(Violation::new(
                    "free_list::remove",
                    "attempted to remove an allocated block from a free list",
                ));
            }
            let size = block::block_size(block::header_of(bp));
            let index = size_class::class_of(size);
            if self.list_head(index).is_none() {
                return Err(Violation::new("free_list::remove", "list is empty"));
            }

            let pred = block::pred_link(self.base, bp);
            let succ = block::succ_link(self.base, bp);
            match pred {
                Some(p) => block::set_succ_link(self.base, p, succ),
                None => self.set_list_head(index, succ),
            }
            if let Some(s) = succ {
                block::set_pred_link(self.base, s, pred);
            }
            block::set_pred_link(self.base, bp, None);
            block::set_succ_link(self.base, bp, None);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scratch region big enough to hold the ten list heads plus a
    /// handful of small free blocks, addressed the same way the real heap
    /// is: everything relative to `base`.
    struct Scratch {
        region: Vec<u8>,
    }

    impl Scratch {
        fn new() -> Self {
            Self {
                region: vec![0u8; 4096],
            }
        }

        fn base(&mut self) -> *mut u8 {
            self.region.as_mut_ptr()
        }

        fn registry(&mut self) -> FreeListRegistry {
            unsafe { FreeListRegistry::new(self.base()) }
        }

        /// Writes a standalone free block of `size` bytes at `offset` from
        /// the base and returns its payload address.
        fn free_block(&mut self, offset: usize, size: usize) -> *mut u8 {
            let base = self.base();
            let bp = unsafe { base.add(offset) };
            unsafe {
                block::set_header(block::header_of(bp), size, false);
                block::set_footer(block::footer_of(bp), size, false);
                block::set_pred_link(base, bp, None);
                block::set_succ_link(base, bp, None);
            }
            bp
        }
    }

    fn list_sizes(registry: &FreeListRegistry, index: usize) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut cursor = registry.list_head(index);
        while let Some(bp) = cursor {
            sizes.push(unsafe { block::block_size(block::header_of(bp)) });
            cursor = unsafe { block::succ_link(registry.base(), bp) };
        }
        sizes
    }

    #[test]
    fn insert_keeps_class_sorted_by_size() {
        let mut scratch = Scratch::new();
        let a = scratch.free_block(200, 64);
        let b = scratch.free_block(300, 40);
        let c = scratch.free_block(400, 56);
        let registry = scratch.registry();

        unsafe {
            registry.insert(a).unwrap();
            registry.insert(b).unwrap();
            registry.insert(c).unwrap();
        }

        assert_eq!(list_sizes(&registry, size_class::class_of(64)), vec![40, 56, 64]);
    }

    #[test]
    fn remove_head_promotes_successor() {
        let mut scratch = Scratch::new();
        let a = scratch.free_block(200, 40);
        let b = scratch.free_block(300, 48);
        let registry = scratch.registry();

        unsafe {
            registry.insert(a).unwrap();
            registry.insert(b).unwrap();
            registry.remove(a).unwrap();
        }

        assert_eq!(list_sizes(&registry, size_class::class_of(40)), vec![48]);
    }

    #[test]
    fn remove_middle_reconnects_neighbors() {
        let mut scratch = Scratch::new();
        let a = scratch.free_block(200, 32);
        let b = scratch.free_block(300, 40);
        let c = scratch.free_block(400, 48);
        let registry = scratch.registry();

        unsafe {
            registry.insert(a).unwrap();
            registry.insert(b).unwrap();
            registry.insert(c).unwrap();
            registry.remove(b).unwrap();
        }

        assert_eq!(list_sizes(&registry, size_class::class_of(32)), vec![32, 48]);
    }

    #[test]
    fn insert_rejects_allocated_block() {
        let mut scratch = Scratch::new();
        let base = scratch.base();
        let bp = unsafe { base.add(200) };
        unsafe {
            block::set_header(block::header_of(bp), 32, true);
        }
        let registry = scratch.registry();
        assert!(unsafe { registry.insert(bp) }.is_err());
    }
}
