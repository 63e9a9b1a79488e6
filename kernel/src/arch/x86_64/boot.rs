// Boot entry point for x86_64

use bootloader_api::{
    config::Mapping, entry_point, info::MemoryRegionKind, BootInfo, BootloaderConfig,
};

use crate::mm::bootloader::{BootloaderMemoryRegion, MemoryRegionType};

/// Map the whole of physical memory at a bootloader-chosen virtual offset so
/// `mm::phys_to_virt_addr` has an identity window to translate through.
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

const MAX_BOOT_REGIONS: usize = 64;

/// The `BootInfo` handed to us by the bootloader, stashed for later lookups
/// (physical memory offset, framebuffer, RSDP address) by code that runs
/// well after `kernel_main` itself has returned control to `bootstrap::run`.
pub static mut BOOT_INFO: Option<&'static BootInfo> = None;

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    // SAFETY: single-threaded boot context, written exactly once before any
    // other code (including other CPUs) can observe it.
    unsafe {
        BOOT_INFO = Some(&*boot_info);
    }

    if let Some(offset) = boot_info.physical_memory_offset.into_option() {
        crate::mm::set_phys_mem_offset(offset);
    }

    let mut regions = [BootloaderMemoryRegion::new(0, 0, MemoryRegionType::Reserved); MAX_BOOT_REGIONS];
    let mut count = 0;
    for region in boot_info.memory_regions.iter() {
        if count >= MAX_BOOT_REGIONS {
            break;
        }
        let region_type = match region.kind {
            MemoryRegionKind::Usable => MemoryRegionType::Usable,
            MemoryRegionKind::Bootloader => MemoryRegionType::BootloaderReclaimable,
            _ => MemoryRegionType::Reserved,
        };
        regions[count] = BootloaderMemoryRegion::new(region.start, region.end - region.start, region_type);
        count += 1;
    }

    if let Err(e) = crate::mm::bootloader::process_memory_map(&regions[..count]) {
        crate::println!("[BOOT] memory map processing failed: {:?}", e);
        crate::arch::halt();
    }

    if let Err(e) = crate::bootstrap::kernel_init() {
        crate::println!("[BOOT] kernel_init failed: {:?}", e);
        crate::arch::halt();
    }

    crate::bootstrap::run()
}
