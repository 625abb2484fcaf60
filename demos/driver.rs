use std::io::Read;
use std::ptr;

use libc::sbrk;
use rustmalloc::Allocator;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

unsafe fn print_alloc(label: &str, size: usize, addr: *mut u8) {
  println!(
    "{label}: requested {size} bytes, address = {:?}, program break = {:?}",
    addr,
    unsafe { sbrk(0) }
  );
}

fn main() {
  // The allocator lazily lays down its heap layout (list heads, prologue,
  // epilogue) on first use, then reuses freed blocks instead of only
  // growing monotonically.
  let allocator = Allocator::new();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 1) Allocate 24 bytes.
    // ------------------------------------------------------------------
    let first_block = allocator.allocate(24);
    println!("\n[1] Allocate 24 bytes");
    print_alloc("[1]", 24, first_block);
    (first_block as *mut u32).write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", (first_block as *mut u32).read());
    assert!(allocator.check_heap("driver:1").is_none());
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 2) Allocate 96 bytes, a different size class than [1].
    // ------------------------------------------------------------------
    let second_block = allocator.allocate(96);
    println!("\n[2] Allocate 96 bytes");
    print_alloc("[2]", 96, second_block);
    ptr::write_bytes(second_block, 0xAB, 96);
    println!("[2] Initialized second block with 0xAB");
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 3) Free the first block, then allocate 24 bytes again: the
    //    segregated list should hand back the same address.
    // ------------------------------------------------------------------
    allocator.free(first_block);
    println!("\n[3] Freed first_block at {:?}", first_block);
    let third_block = allocator.allocate(24);
    println!(
      "[3] third_block == first_block? {}",
      if third_block == first_block {
        "Yes, the freed block was reused"
      } else {
        "No, it allocated somewhere else"
      }
    );
    assert!(allocator.check_heap("driver:3").is_none());
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 4) Grow the third block past its current size via resize, and
    //    confirm the original bytes survive the move.
    // ------------------------------------------------------------------
    (third_block as *mut u32).write(0xCAFEF00D);
    let grown = allocator.resize(third_block, 256);
    println!("\n[4] Resized 24 -> 256 bytes, new address = {:?}", grown);
    println!("[4] Preserved value = 0x{:X}", (grown as *mut u32).read());
    assert!(allocator.check_heap("driver:4").is_none());
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 5) Allocate a large block to observe heap growth.
    // ------------------------------------------------------------------
    print_program_break("before large alloc");
    let big_block = allocator.allocate(64 * 1024);
    println!("\n[5] Allocate large 64 KiB block");
    print_alloc("[5]", 64 * 1024, big_block);
    print_program_break("after large alloc");
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 6) Zero-allocate an array of 16 u32s and confirm it reads back zero.
    // ------------------------------------------------------------------
    let zeroed = allocator.zero_allocate(16, 4) as *mut u32;
    println!("\n[6] zero_allocate(16, 4) = {:?}", zeroed);
    let all_zero = (0..16).all(|i| zeroed.add(i).read() == 0);
    println!("[6] all bytes zero? {all_zero}");
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 7) Clean up and run the checker one last time.
    // ------------------------------------------------------------------
    allocator.free(second_block);
    allocator.free(grown);
    allocator.free(big_block);
    allocator.free(zeroed as *mut u8);
    println!("\n[7] Freed every remaining block");
    println!("[7] check_heap = {:?}", allocator.check_heap("driver:end"));

    println!("\n[8] End of demo. Process will exit and the OS will reclaim all memory.");
  }
}
