//! Error types surfaced by the allocator.
//!
//! No external error crate: the rest of the corpus this crate is grown
//! from never reaches for one in this domain either, and both cases here
//! are small enough that hand-written `Display` impls are less machinery
//! than pulling in a dependency for them.

use std::fmt;

/// The underlying page-granular provider refused to grow the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapError;

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("heap provider refused to extend the managed region")
    }
}

impl std::error::Error for HeapError {}

/// A detected violation of a free-list or block-layout precondition.
///
/// Used both as the (testing-aid) error returned by [`crate::free_list`]
/// insert/remove on a misused block, and as the report produced by
/// [`crate::check::check_heap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub call_site: &'static str,
    pub detail: String,
}

impl Violation {
    pub fn new(call_site: &'static str, detail: impl Into<String>) -> Self {
        Self {
            call_site,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.call_site, self.detail)
    }
}

impl std::error::Error for Violation {}
