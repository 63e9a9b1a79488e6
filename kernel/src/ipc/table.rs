//! Per-process IPC descriptor table.
//!
//! Mirrors [`crate::fs::file::FileTable`]'s dense, slot-reusing `Vec`
//! layout: a process's IPC handles (listening servers and accepted/
//! connected channels) are addressed by a small integer the syscall layer
//! hands back to user space, the same way file descriptors work. Kept
//! separate from [`FileTable`](crate::fs::file::FileTable) because an IPC
//! handle is not a [`VfsNode`](crate::fs::VfsNode): it has no path, no
//! metadata, no directory semantics.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::error::IpcError;
use super::server::{IPCDescriptor, IpcServer};
use crate::sync::spinlock::SpinLock;

/// A slot in a process's IPC table: either the listening side of a named
/// server, or one accepted/connected channel.
#[derive(Clone)]
pub enum IpcHandle {
    Server(Arc<IpcServer>),
    Channel(IPCDescriptor),
}

/// Dense, slot-reusing table of a process's IPC handles.
pub struct IpcTable {
    handles: SpinLock<Vec<Option<IpcHandle>>>,
}

impl IpcTable {
    pub fn new() -> Self {
        Self {
            handles: SpinLock::new(Vec::new()),
        }
    }

    /// Insert a handle, returning its descriptor id.
    pub fn insert(&self, handle: IpcHandle) -> usize {
        let mut handles = self.handles.acquire();
        for (id, slot) in handles.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(handle);
                return id;
            }
        }
        handles.push(Some(handle));
        handles.len() - 1
    }

    /// Fetch a clone of the handle at `id`.
    pub fn get(&self, id: usize) -> Result<IpcHandle, IpcError> {
        self.handles
            .acquire()
            .get(id)
            .and_then(|slot| slot.clone())
            .ok_or(IpcError::EndpointNotFound)
    }

    /// Fetch the channel at `id`, failing if the slot holds a server instead.
    pub fn get_channel(&self, id: usize) -> Result<IPCDescriptor, IpcError> {
        match self.get(id)? {
            IpcHandle::Channel(desc) => Ok(desc),
            IpcHandle::Server(_) => Err(IpcError::InvalidMessage),
        }
    }

    /// Fetch the server at `id`, failing if the slot holds a channel instead.
    pub fn get_server(&self, id: usize) -> Result<Arc<IpcServer>, IpcError> {
        match self.get(id)? {
            IpcHandle::Server(server) => Ok(server),
            IpcHandle::Channel(_) => Err(IpcError::InvalidMessage),
        }
    }

    /// Close and drop the handle at `id`. Dropping an [`IPCDescriptor`]
    /// closes both rings; dropping the last `Arc<IpcServer>` tears the
    /// server down via its own `Drop` impl.
    pub fn close(&self, id: usize) -> Result<(), IpcError> {
        let mut handles = self.handles.acquire();
        match handles.get_mut(id) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(IpcError::EndpointNotFound),
        }
    }

    /// Drop every handle, closing all channels and tearing down any
    /// servers this process was the last owner of. Called on process exit.
    pub fn close_all(&self) -> usize {
        let mut handles = self.handles.acquire();
        let count = handles.iter().filter(|slot| slot.is_some()).count();
        handles.clear();
        count
    }
}

impl Default for IpcTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::server::{connect, server_create};

    #[test]
    fn insert_get_close_roundtrip() {
        let table = IpcTable::new();
        let server = server_create("test.table.1", 1).unwrap();
        let id = table.insert(IpcHandle::Server(server));
        assert!(table.get_server(id).is_ok());
        table.close(id).unwrap();
        assert!(table.get(id).is_err());
    }

    #[test]
    fn channel_slot_rejects_server_accessor() {
        let table = IpcTable::new();
        let _server = server_create("test.table.2", 1).unwrap();
        let client = connect("test.table.2").unwrap();
        let id = table.insert(IpcHandle::Channel(client));
        assert!(table.get_server(id).is_err());
        assert!(table.get_channel(id).is_ok());
    }
}
