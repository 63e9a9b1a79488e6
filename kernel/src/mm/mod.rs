//! Memory management: physical frames (C1), kernel heap (C2), paging (C3),
//! per-process address spaces (C4), and the demand-paging/COW machinery that
//! ties them together.
//!
//! [`frame_allocator`] owns the only [`FrameAllocator`] instance
//! ([`FRAME_ALLOCATOR`]); every other submodule allocates and frees physical
//! memory through it rather than touching hardware directly.

#![allow(dead_code)]

use core::sync::atomic::{AtomicU64, Ordering};

#[allow(unused_imports)]
use crate::println;

pub mod bootloader;
pub mod demand_paging;
pub mod frame_allocator;
pub mod heap;
pub mod page_cache;
pub mod page_fault;
pub mod page_table;
pub mod user_validation;
pub mod vas;

pub use bootloader::MemoryRegionType;
pub use frame_allocator::{
    FrameAllocator, FrameAllocatorError, FrameAllocatorStats, FrameNumber, MemoryZone,
    PhysicalAddress, PhysicalFrame, ReservedRegion, FRAME_ALLOCATOR, FRAME_SIZE,
};
pub use vas::{MappingType, VirtualAddressSpace};

/// Page size used throughout the kernel; kept as a separate alias from
/// [`FRAME_SIZE`] because callers reach for whichever name reads better at
/// the call site (frame accounting vs. page-table/VAS code).
pub const PAGE_SIZE: usize = FRAME_SIZE;

/// Virtual memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(pub u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn add(&self, offset: usize) -> Self {
        Self(self.0 + offset as u64)
    }
}

/// Page size options for mappings that span more than one base page.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    /// 4 KiB pages
    Small = 4096,
    /// 2 MiB pages
    Large = 2 * 1024 * 1024,
    /// 1 GiB pages
    Huge = 1024 * 1024 * 1024,
}

/// Page table entry flags. Stored as a raw bitmask so architecture code can
/// read `.0` directly when building or inspecting hardware page table
/// entries; [`contains`](PageFlags::contains) is the usual way to test them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageFlags(pub u64);

impl PageFlags {
    pub const PRESENT: Self = Self(1 << 0);
    pub const WRITABLE: Self = Self(1 << 1);
    pub const USER: Self = Self(1 << 2);
    pub const WRITE_THROUGH: Self = Self(1 << 3);
    pub const NO_CACHE: Self = Self(1 << 4);
    pub const ACCESSED: Self = Self(1 << 5);
    pub const DIRTY: Self = Self(1 << 6);
    pub const HUGE: Self = Self(1 << 7);
    pub const GLOBAL: Self = Self(1 << 8);
    pub const NO_EXECUTE: Self = Self(1 << 63);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for PageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for PageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A simplified, bootloader-agnostic memory region as handed to the frame
/// allocator once `bootloader::process_memory_map` has classified it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    pub size: u64,
    pub usable: bool,
}

/// Point-in-time snapshot of kernel memory usage, surfaced via `/proc/meminfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStats {
    pub total_frames: u64,
    pub free_frames: u64,
    /// Frames held by the page cache. No page cache module exists yet (see
    /// DESIGN.md C5), so this is always 0 until one lands.
    pub cached_frames: u64,
}

/// Read current frame-allocator statistics for `/proc/meminfo` and friends.
pub fn get_memory_stats() -> MemoryStats {
    let stats = FRAME_ALLOCATOR.lock().get_stats();
    MemoryStats {
        total_frames: stats.total_frames,
        free_frames: stats.free_frames,
        cached_frames: 0,
    }
}

/// Offset added to a physical address to reach its identity mapping in the
/// kernel's virtual address space. Set once at boot from the bootloader's
/// physical memory mapping and never changed afterwards.
static PHYS_MEM_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Record the physical-memory offset the bootloader mapped the whole of RAM
/// at. Must be called exactly once, before any call to
/// [`phys_to_virt_addr`].
pub fn set_phys_mem_offset(offset: u64) {
    PHYS_MEM_OFFSET.store(offset, Ordering::Release);
}

/// Translate a physical address to its identity-mapped kernel virtual
/// address using the offset recorded by [`set_phys_mem_offset`].
pub fn phys_to_virt_addr(phys: u64) -> u64 {
    PHYS_MEM_OFFSET.load(Ordering::Acquire) + phys
}

/// Physical address of the kernel's root page table (the table installed by
/// [`vas::map_kernel_space`] and shared, via its upper-half entries, by every
/// process address space).
static KERNEL_PAGE_TABLE: AtomicU64 = AtomicU64::new(0);

/// Record the kernel root page table's physical address. Called once from
/// [`init_default`] after the boot page tables have been set up.
pub fn set_kernel_page_table(phys_addr: u64) {
    KERNEL_PAGE_TABLE.store(phys_addr, Ordering::Release);
}

/// Physical address of the kernel's root page table, as a `usize` for
/// pointer arithmetic convenience at call sites.
pub fn get_kernel_page_table() -> usize {
    KERNEL_PAGE_TABLE.load(Ordering::Acquire) as usize
}

/// Initialize memory management: frame allocator reserved regions, kernel
/// heap, and demand-paging state. The frame allocator itself is seeded
/// earlier, directly from the bootloader's memory map (see
/// `arch::x86_64::boot::kernel_main`), since it must be usable before any
/// allocation-backed subsystem (including this function's own heap setup)
/// can run.
pub fn init_default() -> Result<(), &'static str> {
    println!("[MM] Initializing memory management...");

    bootloader::reserve_standard_regions()
        .map_err(|_| "failed to reserve standard memory regions")?;

    heap::init()?;

    demand_paging::init();

    let current_cr3 = vas::current_page_table_root();
    set_kernel_page_table(current_cr3);

    println!("[MM] Memory management initialized");
    Ok(())
}
