//! Bidirectional shared-memory ring buffers.
//!
//! A [`Ring`] is a single-producer/single-consumer byte queue: one side
//! writes, the other reads. Two rings wired in opposite directions form the
//! full-duplex pipe handed out by [`super::server`] on accept/connect. Each
//! ring has its own spinlock protecting the byte queue plus a pair of
//! waitlists so blocked readers/writers park on the scheduler instead of
//! spinning.

#![allow(dead_code)]

extern crate alloc;

use alloc::collections::VecDeque;

use super::error::{IpcError, Result};
use crate::sync::{spinlock::SpinLock, waitlist::WaitList};

/// Ring capacity in bytes. Matches the teacher's page-sized IPC buffers.
pub const RING_CAPACITY: usize = 4096;

struct Inner {
    buf: VecDeque<u8>,
    /// Set once the writer has called `close_write`; readers see EOF once
    /// the queue drains.
    write_closed: bool,
    /// Set once the reader has called `close_read`; writers see EPIPE
    /// immediately.
    read_closed: bool,
}

/// A single-direction byte channel: one writer, one reader.
pub struct Ring {
    inner: SpinLock<Inner>,
    readable: WaitList,
    writable: WaitList,
}

impl Ring {
    pub fn new() -> Self {
        Self {
            inner: SpinLock::new(Inner {
                buf: VecDeque::with_capacity(RING_CAPACITY),
                write_closed: false,
                read_closed: false,
            }),
            readable: WaitList::new(),
            writable: WaitList::new(),
        }
    }

    /// Write as much of `data` as fits, blocking while the ring is full.
    /// Returns the number of bytes written, or `Err(BrokenPipe)` if the
    /// reader has already closed its end.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        loop {
            {
                let mut inner = self.inner.acquire();
                if inner.read_closed {
                    return Err(IpcError::BrokenPipe);
                }
                let room = RING_CAPACITY - inner.buf.len();
                if room > 0 {
                    let n = room.min(data.len());
                    inner.buf.extend(data[..n].iter().copied());
                    drop(inner);
                    self.readable.wake_all();
                    return Ok(n);
                }
            }
            if !self.writable.wait() {
                // Woken because the ring was closed from under us.
                let inner = self.inner.acquire();
                if inner.read_closed {
                    return Err(IpcError::BrokenPipe);
                }
            }
        }
    }

    /// Read up to `buf.len()` bytes, blocking while the ring is empty.
    /// Returns `Ok(0)` once the writer has closed and the queue is drained
    /// (EOF); never returns an error for a clean close.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            {
                let mut inner = self.inner.acquire();
                if !inner.buf.is_empty() {
                    let n = buf.len().min(inner.buf.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = inner.buf.pop_front().unwrap();
                    }
                    drop(inner);
                    self.writable.wake_all();
                    return Ok(n);
                }
                if inner.write_closed {
                    return Ok(0);
                }
            }
            self.readable.wait();
        }
    }

    /// Close the writing half: pending readers drain the buffer, then see
    /// EOF.
    pub fn close_write(&self) {
        self.inner.acquire().write_closed = true;
        self.readable.wake_all();
    }

    /// Close the reading half: pending/future writers get EPIPE immediately.
    pub fn close_read(&self) {
        self.inner.acquire().read_closed = true;
        self.writable.wake_all();
    }

    pub fn is_write_closed(&self) -> bool {
        self.inner.acquire().write_closed
    }

    pub fn is_read_closed(&self) -> bool {
        self.inner.acquire().read_closed
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let ring = Ring::new();
        assert_eq!(ring.write(b"hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(ring.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_after_write_close_drains_then_eof() {
        let ring = Ring::new();
        ring.write(b"hi").unwrap();
        ring.close_write();
        let mut buf = [0u8; 2];
        assert_eq!(ring.read(&mut buf).unwrap(), 2);
        let mut buf = [0u8; 1];
        assert_eq!(ring.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_after_read_close_is_epipe() {
        let ring = Ring::new();
        ring.close_read();
        assert_eq!(ring.write(b"x"), Err(IpcError::BrokenPipe));
    }

    #[test]
    fn partial_write_when_nearly_full() {
        let ring = Ring::new();
        let filler = alloc::vec![0u8; RING_CAPACITY - 2];
        assert_eq!(ring.write(&filler).unwrap(), filler.len());
        assert_eq!(ring.write(b"abcd").unwrap(), 2);
    }
}
