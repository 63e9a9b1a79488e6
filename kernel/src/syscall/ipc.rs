//! IPC system calls: named servers, connect/accept, and blocking
//! read/write over the accepted channel's shared-memory rings.
//!
//! Handles are addressed the same way file descriptors are -- a small
//! integer private to the calling process, returned by `ipc_server_create`
//! / `ipc_connect` / `ipc_accept` and valid until `ipc_close`. Mirrors
//! `syscall::filesystem`'s "copy the C string out of user space, then call
//! into the real subsystem" shape.

#![allow(clippy::unnecessary_cast)]

use super::{SyscallError, SyscallResult};
use crate::{
    ipc::{self, IpcHandle},
    process,
};

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

/// Maximum server name length accepted from user space.
const MAX_NAME_LEN: usize = 256;

/// Copy a NUL-terminated string out of user space.
///
/// # Safety
/// `ptr` must point at a NUL-terminated string in mapped, readable user
/// memory. Callers validate `ptr != 0` before calling this.
unsafe fn copy_user_cstr(ptr: usize, max_len: usize) -> Result<Vec<u8>, SyscallError> {
    let mut bytes = Vec::new();
    let mut cursor = ptr as *const u8;
    for _ in 0..max_len {
        let byte = *cursor;
        if byte == 0 {
            return Ok(bytes);
        }
        bytes.push(byte);
        cursor = cursor.add(1);
    }
    Err(SyscallError::InvalidArgument)
}

fn name_from_user(name_ptr: usize) -> Result<alloc::string::String, SyscallError> {
    if name_ptr == 0 {
        return Err(SyscallError::InvalidPointer);
    }
    // SAFETY: name_ptr checked non-null above; caller contract per the
    // syscall ABI is a NUL-terminated string in mapped user memory.
    let bytes = unsafe { copy_user_cstr(name_ptr, MAX_NAME_LEN)? };
    core::str::from_utf8(&bytes)
        .map(alloc::string::String::from)
        .map_err(|_| SyscallError::InvalidArgument)
}

/// `ipc_server_create(name_ptr, name_len, max_pending) -> server fd`
pub fn sys_ipc_server_create(name_ptr: usize, _name_len: usize, max_pending: usize) -> SyscallResult {
    let name = name_from_user(name_ptr)?;
    let process = process::current_process().ok_or(SyscallError::InvalidState)?;

    let server = ipc::server_create(&name, max_pending).map_err(SyscallError::from)?;
    Ok(process.ipc_table.insert(IpcHandle::Server(server)))
}

/// `ipc_connect(name_ptr, name_len) -> channel fd`, blocking while the
/// server's accept queue is full.
pub fn sys_ipc_connect(name_ptr: usize, _name_len: usize) -> SyscallResult {
    let name = name_from_user(name_ptr)?;
    let process = process::current_process().ok_or(SyscallError::InvalidState)?;

    let desc = ipc::connect(&name).map_err(SyscallError::from)?;
    Ok(process.ipc_table.insert(IpcHandle::Channel(desc)))
}

/// `ipc_accept(server_fd) -> channel fd`, blocking until a client connects.
pub fn sys_ipc_accept(server_fd: usize) -> SyscallResult {
    let process = process::current_process().ok_or(SyscallError::InvalidState)?;
    let server = process
        .ipc_table
        .get_server(server_fd)
        .map_err(SyscallError::from)?;

    let desc = server.accept().map_err(SyscallError::from)?;
    Ok(process.ipc_table.insert(IpcHandle::Channel(desc)))
}

/// `ipc_read(channel_fd, buf, len) -> bytes read`, blocking while the
/// ring is empty; returns 0 at EOF once the peer has closed its write end.
pub fn sys_ipc_read(channel_fd: usize, buf: usize, len: usize) -> SyscallResult {
    if buf == 0 {
        return Err(SyscallError::InvalidPointer);
    }
    let process = process::current_process().ok_or(SyscallError::InvalidState)?;
    let channel = process
        .ipc_table
        .get_channel(channel_fd)
        .map_err(SyscallError::from)?;

    // SAFETY: buf checked non-null above; caller contract per the syscall
    // ABI is a writable user-space buffer of at least `len` bytes.
    let slice = unsafe { core::slice::from_raw_parts_mut(buf as *mut u8, len) };
    channel.read(slice).map_err(SyscallError::from)
}

/// `ipc_write(channel_fd, buf, len) -> bytes written`, blocking while the
/// ring is full; fails with `EPIPE` once the peer has closed its read end.
pub fn sys_ipc_write(channel_fd: usize, buf: usize, len: usize) -> SyscallResult {
    if buf == 0 {
        return Err(SyscallError::InvalidPointer);
    }
    let process = process::current_process().ok_or(SyscallError::InvalidState)?;
    let channel = process
        .ipc_table
        .get_channel(channel_fd)
        .map_err(SyscallError::from)?;

    // SAFETY: buf checked non-null above; caller contract per the syscall
    // ABI is a readable user-space buffer of at least `len` bytes.
    let slice = unsafe { core::slice::from_raw_parts(buf as *const u8, len) };
    channel.write(slice).map_err(SyscallError::from)
}

/// `ipc_close(fd)`: drop a server or channel handle.
pub fn sys_ipc_close(fd: usize) -> SyscallResult {
    let process = process::current_process().ok_or(SyscallError::InvalidState)?;
    process.ipc_table.close(fd).map_err(SyscallError::from)?;
    Ok(0)
}
