//! Inter-process communication.
//!
//! IPC is built around named servers rather than capability tokens: a
//! listener registers under a name with [`server_create`], clients
//! [`connect`] by that name, and each successful connect/accept pair hands
//! both sides an [`IPCDescriptor`] backed by a pair of bidirectional shared
//! rings (see [`ring`] and [`server`]). [`rpc`] layers a typed request/reply
//! protocol on top of a descriptor for the userspace filesystem bridge, and
//! [`shared_memory`] provides zero-copy large-transfer regions alongside the
//! byte-stream rings.

pub mod error;
pub mod ring;
pub mod rpc;
pub mod server;
pub mod shared_memory;
pub mod table;

pub use error::{IpcError, Result};
pub use ring::Ring;
pub use rpc::{RpcClient, RpcDirEntry, RpcError, UserFsOp};
pub use server::{connect, lookup, server_create, IPCDescriptor, IpcServer};
pub use shared_memory::{Permission, SharedRegion, TransferMode};
pub use table::{IpcHandle, IpcTable};

use alloc::sync::Arc;

/// Accept a pending connection on `server`, blocking until one arrives.
#[allow(dead_code)]
pub fn accept(server: &Arc<IpcServer>) -> Result<IPCDescriptor> {
    server.accept()
}

/// IPC system initialization
#[allow(dead_code)]
pub fn init() {
    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: uart_write_str performs raw MMIO writes to the PL011 UART at
        // 0x09000000 (QEMU virt machine). This is safe during early boot because:
        // 1. The UART is memory-mapped at a fixed, known address on the virt platform.
        // 2. Writing to the UART transmit register is a side-effect-free output
        //    operation that does not corrupt any kernel state.
        // 3. This runs during single-threaded initialization, so no concurrent access.
        unsafe {
            use crate::arch::aarch64::direct_uart::uart_write_str;
            uart_write_str("[IPC] Initializing IPC system...\n");
        }
    }
    #[cfg(target_arch = "x86_64")]
    println!("[IPC] Initializing IPC system...");

    // Skip println for RISC-V to avoid potential serial deadlock

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: Same as above.
        unsafe {
            use crate::arch::aarch64::direct_uart::uart_write_str;
            uart_write_str("[IPC] IPC system initialized\n");
        }
    }
    #[cfg(target_arch = "x86_64")]
    println!("[IPC] IPC system initialized");
}
