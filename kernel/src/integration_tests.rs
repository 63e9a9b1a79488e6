//! Integration tests for inter-subsystem communication
//!
//! This module provides tests that verify proper interaction between
//! different kernel subsystems.

#![cfg(test)]

use crate::{fs, ipc, process};

/// Test IPC named-server connect/accept round trip.
#[test_case]
fn test_ipc_connect_accept_roundtrip() {
    let server = ipc::server_create("integration.echo", 4).expect("server_create failed");

    let client = ipc::connect("integration.echo").expect("connect failed");
    let conn = ipc::accept(&server).expect("accept failed");

    client.write(b"ping").expect("client write failed");
    let mut buf = [0u8; 4];
    let n = conn.read(&mut buf).expect("server read failed");
    assert_eq!(&buf[..n], b"ping");

    conn.write(b"pong").expect("server write failed");
    let mut buf = [0u8; 4];
    let n = client.read(&mut buf).expect("client read failed");
    assert_eq!(&buf[..n], b"pong");
}

/// Test that closing one side of a connection surfaces EOF/EPIPE on the
/// other.
#[test_case]
fn test_ipc_close_semantics() {
    let server = ipc::server_create("integration.close", 1).expect("server_create failed");
    let client = ipc::connect("integration.close").expect("connect failed");
    let conn = ipc::accept(&server).expect("accept failed");

    client.close();

    let mut buf = [0u8; 8];
    assert_eq!(conn.read(&mut buf), Ok(0));
    assert_eq!(conn.write(b"x"), Err(ipc::IpcError::BrokenPipe));
}

/// Test process creation integrates with the scheduler's process table.
#[test_case]
fn test_process_with_scheduler() {
    use alloc::string::String;

    process::table::init();
    let pid =
        process::lifecycle::create_process(String::from("itest"), 0).expect("create failed");
    assert!(process::table::get_process(pid).is_some());
}

/// Test VFS root mount and basic file creation.
#[test_case]
fn test_vfs_operations() {
    fs::init();

    assert!(fs::write_file("/itest.txt", b"hello").is_ok());
    assert!(fs::file_exists("/itest.txt"));
}

#[cfg(test)]
mod module_tests {
    use super::*;

    /// Run all integration tests
    pub fn run_all() {
        test_ipc_connect_accept_roundtrip();
        test_ipc_close_semantics();
        test_process_with_scheduler();
        test_vfs_operations();

        println!("[INTEGRATION] All integration tests passed!");
    }
}
