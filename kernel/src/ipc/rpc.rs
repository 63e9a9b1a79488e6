//! UserFS RPC bridge client stub.
//!
//! Each mounted userspace filesystem instance gets one [`RpcClient`] wrapping
//! an [`super::server::IPCDescriptor`] connected to that server's named
//! endpoint. Calls are correlated by a monotonically increasing request id:
//! the client writes a fixed-size header (request id, opcode, target
//! handle, a single `u64` argument, and a trailing payload length) followed
//! by the variable-length payload, then blocks reading back a header+payload
//! reply. Because the underlying ring is a strict FIFO between exactly two
//! parties, a reply is always the response to the oldest outstanding
//! request -- there is no need for a pending-request table on this side.

#![allow(dead_code)]

extern crate alloc;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use super::error::IpcError;
use super::server::IPCDescriptor;

/// RPC operations understood by a userspace filesystem server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UserFsOp {
    Mount = 1,
    Lookup = 2,
    Readdir = 3,
    Readlink = 4,
    Getpage = 5,
    /// Sent when the in-kernel inode's refcount reaches zero, so the
    /// server can drop its own bookkeeping for that handle.
    Release = 6,
}

impl UserFsOp {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Mount),
            2 => Some(Self::Lookup),
            3 => Some(Self::Readdir),
            4 => Some(Self::Readlink),
            5 => Some(Self::Getpage),
            6 => Some(Self::Release),
            _ => None,
        }
    }
}

/// RPC-level error, distinct from [`IpcError`] (transport failures) --
/// `Remote` carries an errno-ish code the server reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    Transport(IpcError),
    Remote(i32),
    Protocol,
}

impl From<IpcError> for RpcError {
    fn from(e: IpcError) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = core::result::Result<T, RpcError>;

const HEADER_LEN: usize = 32;
const GETPAGE_SIZE: usize = 4096;

struct Header {
    request_id: u64,
    op: u8,
    status: u8,
    handle: u64,
    arg0: u64,
    payload_len: u32,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&self.request_id.to_le_bytes());
        buf[8] = self.op;
        buf[9] = self.status;
        buf[10..18].copy_from_slice(&self.handle.to_le_bytes());
        buf[18..26].copy_from_slice(&self.arg0.to_le_bytes());
        buf[26..30].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            request_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            op: buf[8],
            status: buf[9],
            handle: u64::from_le_bytes(buf[10..18].try_into().unwrap()),
            arg0: u64::from_le_bytes(buf[18..26].try_into().unwrap()),
            payload_len: u32::from_le_bytes(buf[26..30].try_into().unwrap()),
        }
    }
}

/// One directory entry as returned by a `readdir` RPC.
pub struct RpcDirEntry {
    pub name: String,
    pub handle: u64,
    pub is_dir: bool,
}

/// Client stub for a single mounted userspace filesystem instance.
pub struct RpcClient {
    desc: IPCDescriptor,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(desc: IPCDescriptor) -> Self {
        Self {
            desc,
            next_id: AtomicU64::new(1),
        }
    }

    fn write_exact(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.desc.write(buf)?;
            buf = &buf[n..];
        }
        Ok(())
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.desc.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(RpcError::Protocol);
            }
            filled += n;
        }
        Ok(())
    }

    fn call(&self, op: UserFsOp, handle: u64, arg0: u64, payload: &[u8]) -> Result<(u64, Vec<u8>)> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let header = Header {
            request_id,
            op: op as u8,
            status: 0,
            handle,
            arg0,
            payload_len: payload.len() as u32,
        };
        self.write_exact(&header.encode())?;
        if !payload.is_empty() {
            self.write_exact(payload)?;
        }

        let mut reply_header = [0u8; HEADER_LEN];
        self.read_exact(&mut reply_header)?;
        let reply = Header::decode(&reply_header);
        if reply.request_id != request_id {
            return Err(RpcError::Protocol);
        }
        let mut reply_payload = vec![0u8; reply.payload_len as usize];
        if !reply_payload.is_empty() {
            self.read_exact(&mut reply_payload)?;
        }
        if reply.status != 0 {
            return Err(RpcError::Remote(reply.status as i32));
        }
        Ok((reply.arg0, reply_payload))
    }

    /// Mount the remote filesystem, returning the server-assigned handle of
    /// its root inode.
    pub fn mount(&self, path: &str) -> Result<u64> {
        let (handle, _) = self.call(UserFsOp::Mount, 0, 0, path.as_bytes())?;
        Ok(handle)
    }

    /// Look up `name` under `parent`, returning the child's handle.
    pub fn lookup(&self, parent: u64, name: &str) -> Result<u64> {
        let (handle, _) = self.call(UserFsOp::Lookup, parent, 0, name.as_bytes())?;
        Ok(handle)
    }

    /// List the entries of a directory handle.
    pub fn readdir(&self, handle: u64) -> Result<Vec<RpcDirEntry>> {
        let (_, payload) = self.call(UserFsOp::Readdir, handle, 0, &[])?;
        decode_dir_entries(&payload).ok_or(RpcError::Protocol)
    }

    /// Read a symlink's target.
    pub fn readlink(&self, handle: u64) -> Result<String> {
        let (_, payload) = self.call(UserFsOp::Readlink, handle, 0, &[])?;
        String::from_utf8(payload).map_err(|_| RpcError::Protocol)
    }

    /// Fetch one page's worth of file data at `offset`.
    pub fn getpage(&self, handle: u64, offset: u64) -> Result<[u8; GETPAGE_SIZE]> {
        let (_, payload) = self.call(UserFsOp::Getpage, handle, offset, &[])?;
        let mut page = [0u8; GETPAGE_SIZE];
        let n = payload.len().min(GETPAGE_SIZE);
        page[..n].copy_from_slice(&payload[..n]);
        Ok(page)
    }

    /// Tell the server the in-kernel inode for `handle` has been dropped.
    pub fn release(&self, handle: u64) -> Result<()> {
        self.call(UserFsOp::Release, handle, 0, &[])?;
        Ok(())
    }
}

/// `name_len:u16 le | name bytes | handle:u64 le | is_dir:u8` repeated.
fn decode_dir_entries(payload: &[u8]) -> Option<Vec<RpcDirEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let name_len = u16::from_le_bytes(payload.get(pos..pos + 2)?.try_into().ok()?) as usize;
        pos += 2;
        let name = String::from_utf8(payload.get(pos..pos + name_len)?.to_vec()).ok()?;
        pos += name_len;
        let handle = u64::from_le_bytes(payload.get(pos..pos + 8)?.try_into().ok()?);
        pos += 8;
        let is_dir = *payload.get(pos)? != 0;
        pos += 1;
        entries.push(RpcDirEntry {
            name,
            handle,
            is_dir,
        });
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = Header {
            request_id: 7,
            op: UserFsOp::Lookup as u8,
            status: 0,
            handle: 42,
            arg0: 0,
            payload_len: 5,
        };
        let decoded = Header::decode(&h.encode());
        assert_eq!(decoded.request_id, 7);
        assert_eq!(decoded.op, UserFsOp::Lookup as u8);
        assert_eq!(decoded.handle, 42);
        assert_eq!(decoded.payload_len, 5);
    }

    #[test]
    fn dir_entries_roundtrip() {
        let mut payload = Vec::new();
        let name = b"foo";
        payload.extend_from_slice(&(name.len() as u16).to_le_bytes());
        payload.extend_from_slice(name);
        payload.extend_from_slice(&(7u64).to_le_bytes());
        payload.push(1);

        let entries = decode_dir_entries(&payload).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "foo");
        assert_eq!(entries[0].handle, 7);
        assert!(entries[0].is_dir);
    }
}
