//! Bootable entry binary.
//!
//! All kernel logic lives in the `mos_kernel` library crate. This binary
//! exists only because the bootable ELF the bootloader tooling packages
//! needs to be a `[[bin]]` target; the real entry point
//! (`entry_point!`/`_start_rust`) is defined in `mos_kernel::arch` and is
//! pulled in by the linker as the program's entry symbol. The one thing the
//! library cannot supply for a non-test build is the panic handler, since
//! providing one there would conflict with the test harness's own handler.

#![no_std]
#![no_main]

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    mos_kernel::println!("[KERNEL PANIC] {}", info);
    mos_kernel::arch::halt();
}
