//! Block header/footer/link encoding.
//!
//! Pure address arithmetic, no global state. Every function here reads or
//! writes one word at an address the caller has already proven to be a
//! valid header, footer, or free-block link slot, the same way `mm.c`'s
//! `GET`/`PUT`/`HDRP`/`FTRP`/`GET_PTR`/`PUT_PTR` macros do: out-of-range
//! inputs are undefined behavior, not a checked error.
//!
//! Bit layout of a header/footer word:
//! bits 31..3 size, bit 2 `prev_alloc` (header only), bit 1 reserved,
//! bit 0 `alloc`.

use crate::constants::{DWORD, WORD};

const SIZE_MASK: u32 = !0x7;
const ALLOC_BIT: u32 = 0x1;
const PREV_ALLOC_BIT: u32 = 0x4;

/// # Safety
/// `addr` must be a valid, word-aligned, readable `u32`-sized location.
unsafe fn get_word(addr: *mut u8) -> u32 {
    unsafe { std::ptr::read(addr as *const u32) }
}

/// # Safety
/// `addr` must be a valid, word-aligned, writable `u32`-sized location.
unsafe fn put_word(addr: *mut u8, value: u32) {
    unsafe { std::ptr::write(addr as *mut u32, value) }
}

fn pack(size: usize, alloc: bool) -> u32 {
    debug_assert_eq!(size & 0x7, 0, "block size must be a multiple of 8");
    size as u32 | (alloc as u32)
}

/// Reads the size field of a header or footer word.
///
/// # Safety
/// `addr` must point at a valid header or footer.
pub unsafe fn block_size(addr: *mut u8) -> usize {
    (unsafe { get_word(addr) } & SIZE_MASK) as usize
}

/// Reads the `alloc` bit of a header or footer word.
///
/// # Safety
/// `addr` must point at a valid header or footer.
pub unsafe fn block_alloc(addr: *mut u8) -> bool {
    (unsafe { get_word(addr) }) & ALLOC_BIT != 0
}

/// Reads the `prev_alloc` bit of a header word.
///
/// # Safety
/// `addr` must point at a valid header.
pub unsafe fn block_prev_alloc(addr: *mut u8) -> bool {
    (unsafe { get_word(addr) }) & PREV_ALLOC_BIT != 0
}

/// Writes a header word, preserving whatever `prev_alloc` bit is already
/// stored there. Use this when `addr` is an existing, valid header whose
/// `prev_alloc` bit already reflects reality (the common case: flipping a
/// block's own size/alloc state in place). For a header slot that has
/// never held a valid value (a split remainder, a freshly mapped epilogue),
/// follow this with an explicit [`set_prev_alloc`] call instead of relying
/// on the preserved bit.
///
/// # Safety
/// `addr` must point at a writable header word.
pub unsafe fn set_header(addr: *mut u8, size: usize, alloc: bool) {
    unsafe {
        let prev_alloc = get_word(addr) & PREV_ALLOC_BIT;
        put_word(addr, pack(size, alloc) | prev_alloc);
    }
}

/// Writes a footer word. Bit 2 is always zero in a footer.
///
/// # Safety
/// `addr` must point at a writable footer word.
pub unsafe fn set_footer(addr: *mut u8, size: usize, alloc: bool) {
    unsafe { put_word(addr, pack(size, alloc)) }
}

/// Sets (or clears) the `prev_alloc` bit of a header without touching its
/// size or `alloc` bits. Must be called on the block immediately *after*
/// any block whose allocation state just changed.
///
/// # Safety
/// `addr` must point at a writable header word.
pub unsafe fn set_prev_alloc(addr: *mut u8, bit: bool) {
    unsafe {
        let cleared = get_word(addr) & !PREV_ALLOC_BIT;
        put_word(addr, cleared | ((bit as u32) << 2));
    }
}

/// Header address for a payload pointer.
///
/// # Safety
/// `payload` must be a valid payload address (header lives at `payload - WORD`).
pub unsafe fn header_of(payload: *mut u8) -> *mut u8 {
    unsafe { payload.sub(WORD) }
}

/// Footer address for a payload pointer, computed from the block's current
/// header size. Only meaningful for free blocks (allocated blocks carry no
/// footer).
///
/// # Safety
/// `payload` must be a valid payload address whose header is readable.
pub unsafe fn footer_of(payload: *mut u8) -> *mut u8 {
    unsafe { payload.add(block_size(header_of(payload)) - DWORD) }
}

/// Payload address of the next physical block.
///
/// # Safety
/// `payload` must be a valid payload address whose header is readable.
pub unsafe fn next_block(payload: *mut u8) -> *mut u8 {
    unsafe { payload.add(block_size(header_of(payload))) }
}

/// Payload address of the previous physical block. Only legal when the
/// predecessor is free (an allocated predecessor has no footer to read).
///
/// # Safety
/// `payload`'s predecessor must be a free block with a valid footer at
/// `payload - DWORD`. Callers must gate on `block_prev_alloc` first.
pub unsafe fn prev_block(payload: *mut u8) -> *mut u8 {
    unsafe {
        let prev_footer = payload.sub(DWORD);
        payload.sub(block_size(prev_footer))
    }
}

/// Encodes a payload address as a 4-byte heap-base-relative offset, or `0`
/// for `None`. More portable than subtracting a hardcoded address bias,
/// since `sbrk`'s base is not a fixed constant.
pub fn encode_link(base: *mut u8, target: Option<*mut u8>) -> u32 {
    match target {
        None => 0,
        Some(p) => (p as usize - base as usize) as u32,
    }
}

/// Decodes a 4-byte heap-base-relative offset back into a payload address.
pub fn decode_link(base: *mut u8, raw: u32) -> Option<*mut u8> {
    if raw == 0 {
        None
    } else {
        Some(unsafe { base.add(raw as usize) })
    }
}

/// Reads the predecessor free-list link stored in a free block's body.
///
/// # Safety
/// `payload` must be a valid free block.
pub unsafe fn pred_link(base: *mut u8, payload: *mut u8) -> Option<*mut u8> {
    decode_link(base, unsafe { get_word(payload) })
}

/// Reads the successor free-list link stored in a free block's body.
///
/// # Safety
/// `payload` must be a valid free block.
pub unsafe fn succ_link(base: *mut u8, payload: *mut u8) -> Option<*mut u8> {
    decode_link(base, unsafe { get_word(payload.add(WORD)) })
}

/// Writes the predecessor free-list link in a free block's body.
///
/// # Safety
/// `payload` must be a valid free block with at least `2 * WORD` bytes of
/// payload.
pub unsafe fn set_pred_link(base: *mut u8, payload: *mut u8, target: Option<*mut u8>) {
    unsafe { put_word(payload, encode_link(base, target)) }
}

/// Writes the successor free-list link in a free block's body.
///
/// # Safety
/// `payload` must be a valid free block with at least `2 * WORD` bytes of
/// payload.
pub unsafe fn set_succ_link(base: *mut u8, payload: *mut u8, target: Option<*mut u8>) {
    unsafe { put_word(payload.add(WORD), encode_link(base, target)) }
}
