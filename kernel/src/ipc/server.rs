//! Named IPC servers: bounded accept queue + connect/accept handshake.
//!
//! A server is registered under a name (`ipc_server_create`). Clients
//! `connect` by name; each connection attempt enqueues a freshly allocated
//! pair of [`Ring`]s onto the server's accept queue (capped at
//! `max_pending`) and blocks until the server side calls `accept`, which
//! dequeues the pending connection and hands both ends their
//! [`IPCDescriptor`]. This mirrors a Unix-domain-socket listen/accept
//! handshake rather than a capability-token model.

#![allow(dead_code)]

extern crate alloc;

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::sync::Arc;

use super::error::{IpcError, Result};
use super::ring::Ring;
use crate::sync::{spinlock::SpinLock, waitlist::WaitList};

/// One bidirectional end of an accepted/connected channel.
///
/// `read`/`write` are from this handle's point of view: the client's `read`
/// ring is the server's `write` ring and vice versa. Cheaply `Clone`-able
/// (both fields are `Arc<Ring>`) so a descriptor can be shared into a
/// process's IPC table without holding the table's lock across a blocking
/// read/write.
#[derive(Clone)]
pub struct IPCDescriptor {
    read: Arc<Ring>,
    write: Arc<Ring>,
}

impl IPCDescriptor {
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read.read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.write.write(buf)
    }

    /// Close both halves owned by this endpoint: further reads on the peer
    /// return EOF (0) once drained, further writes on the peer return
    /// `BrokenPipe`.
    pub fn close(&self) {
        self.write.close_write();
        self.read.close_read();
    }
}

impl Drop for IPCDescriptor {
    fn drop(&mut self) {
        self.close();
    }
}

struct PendingConnection {
    /// Ring the server will read from (the client writes here).
    to_server: Arc<Ring>,
    /// Ring the server will write to (the client reads here).
    to_client: Arc<Ring>,
}

struct ServerInner {
    queue: VecDeque<PendingConnection>,
    max_pending: usize,
    closed: bool,
}

/// A named server: the accept side of the handshake.
pub struct IpcServer {
    name: String,
    inner: SpinLock<ServerInner>,
    /// Signaled when a new connection is enqueued; `accept` waits here.
    accept_wait: WaitList,
    /// Signaled when the queue has room; blocked `connect`s wait here.
    room_wait: WaitList,
}

impl IpcServer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until a pending connection is available, then hand back the
    /// server-side descriptor.
    pub fn accept(&self) -> Result<IPCDescriptor> {
        loop {
            {
                let mut inner = self.inner.acquire();
                if let Some(pending) = inner.queue.pop_front() {
                    drop(inner);
                    self.room_wait.wake_all();
                    return Ok(IPCDescriptor {
                        read: pending.to_server,
                        write: pending.to_client,
                    });
                }
                if inner.closed {
                    return Err(IpcError::ServerNotFound);
                }
            }
            if !self.accept_wait.wait() {
                return Err(IpcError::ServerNotFound);
            }
        }
    }

    /// Tear the server down: further `connect`s fail, and any already
    /// blocked in `accept` wake with an error.
    pub fn close(&self) {
        self.inner.acquire().closed = true;
        self.accept_wait.close();
        self.room_wait.close();
        REGISTRY.acquire().remove(&self.name);
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.inner.acquire().closed = true;
        self.accept_wait.close();
        self.room_wait.close();
    }
}

static REGISTRY: SpinLock<BTreeMap<String, Arc<IpcServer>>> = SpinLock::new(BTreeMap::new());

/// Register a new named server with a bounded accept queue.
pub fn server_create(name: &str, max_pending: usize) -> Result<Arc<IpcServer>> {
    let mut registry = REGISTRY.acquire();
    if registry.contains_key(name) {
        return Err(IpcError::NameInUse);
    }
    let server = Arc::new(IpcServer {
        name: String::from(name),
        inner: SpinLock::new(ServerInner {
            queue: VecDeque::new(),
            max_pending,
            closed: false,
        }),
        accept_wait: WaitList::new(),
        room_wait: WaitList::new(),
    });
    registry.insert(String::from(name), server.clone());
    Ok(server)
}

/// Connect to a named server, blocking while its accept queue is full.
/// Returns the client-side descriptor once a matching `accept` dequeues the
/// pending connection.
pub fn connect(name: &str) -> Result<IPCDescriptor> {
    let server = REGISTRY
        .acquire()
        .get(name)
        .cloned()
        .ok_or(IpcError::ServerNotFound)?;

    let to_server = Arc::new(Ring::new());
    let to_client = Arc::new(Ring::new());

    loop {
        let mut inner = server.inner.acquire();
        if inner.closed {
            return Err(IpcError::ServerNotFound);
        }
        if inner.queue.len() < inner.max_pending {
            inner.queue.push_back(PendingConnection {
                to_server: to_server.clone(),
                to_client: to_client.clone(),
            });
            drop(inner);
            server.accept_wait.wake(1);
            return Ok(IPCDescriptor {
                read: to_client,
                write: to_server,
            });
        }
        drop(inner);
        if !server.room_wait.wait() {
            return Err(IpcError::ServerNotFound);
        }
    }
}

/// Look up a registered server by name without connecting.
pub fn lookup(name: &str) -> Option<Arc<IpcServer>> {
    REGISTRY.acquire().get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_accept_then_exchange() {
        let server = server_create("test.echo.1", 2).unwrap();
        let client = connect("test.echo.1").unwrap();
        let conn = server.accept().unwrap();

        client.write(b"hi").unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(conn.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn duplicate_name_rejected() {
        let _s1 = server_create("test.dup.1", 1).unwrap();
        assert_eq!(server_create("test.dup.1", 1), Err(IpcError::NameInUse));
    }

    #[test]
    fn connect_unknown_server_fails() {
        assert_eq!(connect("test.nonexistent"), Err(IpcError::ServerNotFound));
    }

    #[test]
    fn close_wakes_blocked_accept_with_error() {
        let server = server_create("test.close.1", 1).unwrap();
        server.close();
        assert_eq!(server.accept(), Err(IpcError::ServerNotFound));
    }
}
