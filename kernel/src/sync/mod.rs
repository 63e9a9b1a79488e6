//! Synchronization primitives.
//!
//! [`spinlock`] gives spinlocks (plain and recursive) with IRQ-mask
//! discipline; [`waitlist`] is the sole suspension primitive; [`mutex`] is
//! a sleeping mutex built on a waitlist.

pub mod mutex;
pub mod once_lock;
pub mod spinlock;
pub mod waitlist;

pub use mutex::{Mutex, MutexGuard};
pub use once_lock::{GlobalState, LazyLock, OnceLock};
pub use spinlock::{IrqFlags, RecursiveGuard, RecursiveSpinLock, SpinLock, SpinLockGuard};
pub use waitlist::WaitList;
