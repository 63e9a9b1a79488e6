//! Waitlists: bounded ordered sequences of blocked threads.
//!
//! A waitlist is the sole primitive through which threads suspend
//! themselves awaiting an event (mutex contention, IPC ring full/empty,
//! filesystem RPC reply, ...). Once `close()`'d, further waits fail fast and
//! `wake()` becomes a no-op.

#![allow(dead_code)]

extern crate alloc;

use alloc::collections::VecDeque;

use super::spinlock::SpinLock;
use crate::sched::ThreadId;

/// FIFO queue of thread IDs parked on a single event.
pub struct WaitList {
    inner: SpinLock<Inner>,
}

struct Inner {
    queue: VecDeque<ThreadId>,
    closed: bool,
}

impl WaitList {
    pub const fn new() -> Self {
        Self {
            inner: SpinLock::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.acquire().closed
    }

    /// Mark the waitlist closed. Idempotent; once true, `closed` never
    /// clears again.
    pub fn close(&self) {
        let mut inner = self.inner.acquire();
        inner.closed = true;
        // Drain and wake everyone so no one waits forever on a dead list.
        while let Some(tid) = inner.queue.pop_front() {
            crate::sched::wake_closed(tid);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.acquire().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.acquire().queue.is_empty()
    }

    /// Block the current thread on this waitlist until woken or the list is
    /// closed. Returns `true` if woken normally, `false` if the waitlist was
    /// (or became) closed. This is the kernel-side half of
    /// `reschedule_for_waitlist`: it performs the
    /// lock/verify/enqueue/unlock/reschedule sequence atomically with
    /// respect to concurrent `wake`/`close` calls because the enqueue and
    /// the scheduler state transition happen while `inner` is held.
    pub fn wait(&self) -> bool {
        let current = crate::sched::current_thread_id();
        {
            // Hold the waitlist lock across enqueue *and* the Blocked state
            // transition so a concurrent `wake`/`close` cannot observe the
            // thread enqueued-but-still-Runnable.
            let mut inner = self.inner.acquire();
            if inner.closed {
                return false;
            }
            inner.queue.push_back(current);
            crate::sched::mark_current_blocked();
        }
        crate::sched::reschedule();
        crate::sched::take_wake_result(current)
    }

    /// Remove up to `n` threads and mark them Runnable. Returns the number
    /// woken. No-op once closed because `close`
    /// already drained the queue and any subsequent `wait` bails out before
    /// enqueuing.
    pub fn wake(&self, n: usize) -> usize {
        let mut woken = 0;
        let mut inner = self.inner.acquire();
        if inner.closed {
            return 0;
        }
        for _ in 0..n {
            match inner.queue.pop_front() {
                Some(tid) => {
                    crate::sched::wake_thread(tid);
                    woken += 1;
                }
                None => break,
            }
        }
        woken
    }

    pub fn wake_all(&self) -> usize {
        self.wake(usize::MAX)
    }

    /// Remove `tid` from the queue without waking it through the scheduler
    /// (used when a blocked wait is being abandoned because of signal
    /// delivery: the interrupted syscall returns EINTR instead of
    /// completing normally).
    pub fn remove(&self, tid: ThreadId) {
        let mut inner = self.inner.acquire();
        inner.queue.retain(|&t| t != tid);
    }
}

impl Default for WaitList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_sticky() {
        let wl = WaitList::new();
        assert!(!wl.is_closed());
        wl.close();
        assert!(wl.is_closed());
        wl.close();
        assert!(wl.is_closed());
    }

    #[test]
    fn wake_on_closed_is_noop() {
        let wl = WaitList::new();
        wl.close();
        assert_eq!(wl.wake(1), 0);
    }
}
