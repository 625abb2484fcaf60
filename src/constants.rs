//! Tuning constants for the heap layout.
//!
//! Mirrors the `#define`s at the top of the reference `mm.c`
//! (`WSIZE`, `DSIZE`, `CHUNKSIZE`, `LISTNUM`): everything here is a
//! compile-time knob, not something a caller adjusts at runtime.

/// Size of a header, footer, or free-list link word, in bytes.
pub const WORD: usize = 4;

/// Alignment and minimum split granularity, in bytes.
pub const DWORD: usize = 8;

/// Smallest allowable block size, in bytes (header + at least one link word
/// pair, or header + footer for a degenerate zero-payload block).
pub const MIN_BLOCK: usize = 2 * DWORD;

/// Initial and floor heap-extension size, in bytes. One page on a typical
/// Linux system.
pub const CHUNK: usize = 1 << 12;

/// Number of segregated size-class free lists.
pub const LIST_COUNT: usize = 10;

/// Byte offset from the heap base to the first free-list head slot.
pub const LIST_HEADS_OFFSET: usize = WORD;

/// Byte offset from the heap base to the prologue header.
pub const PROLOGUE_HEADER_OFFSET: usize = WORD + LIST_COUNT * WORD;
