//! User program loader
//!
//! Loads user programs from ELF binaries into process memory, used by both
//! process creation (`create_process_from_elf`) and the exec system call
//! (`exec_program`).

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::{string::String, vec::Vec};

use crate::elf::ElfLoader;
use crate::process::{pcb::Process, ProcessId};

/// Load a user program from ELF binary data into a process's address space.
#[cfg(feature = "alloc")]
pub fn load_user_program(process: &mut Process, elf_data: &[u8]) -> Result<u64, &'static str> {
    let vas = process.memory_space_mut().ok_or("No memory space")?;
    ElfLoader::load(elf_data, vas)
}

/// Create a new process from an ELF binary.
#[cfg(feature = "alloc")]
pub fn create_process_from_elf(
    name: String,
    elf_data: &[u8],
    _parent_pid: ProcessId,
) -> Result<ProcessId, &'static str> {
    use crate::process::lifecycle::create_process;

    // Create the process (entry_point is temporary, will be replaced).
    let pid = create_process(name, 0)?;

    let process = crate::process::table::get_process_mut(pid).ok_or("Process not found")?;

    let entry_point = load_user_program(process, elf_data)?;

    if let Some(thread) = process.get_main_thread_mut() {
        thread.set_entry_point(entry_point as usize);
    }

    Ok(pid)
}

/// Execute a program by replacing the current process image.
#[cfg(feature = "alloc")]
pub fn exec_program(
    process: &mut Process,
    elf_data: &[u8],
    args: Vec<String>,
) -> Result<(), &'static str> {
    if let Some(vas) = process.memory_space_mut() {
        vas.clear_user_space().map_err(|_| "Failed to clear address space")?;
    }

    let entry_point = load_user_program(process, elf_data)?;

    process.set_name(args.first().cloned().unwrap_or_else(|| String::from("unknown")));

    if let Some(thread) = process.get_main_thread_mut() {
        thread.set_entry_point(entry_point as usize);
        thread.reset_context();
    }

    Ok(())
}
