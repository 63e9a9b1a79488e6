//! A sleeping mutex backed by a [`WaitList`].
//!
//! Fast-paths on an uncontended compare-and-swap; on contention the caller
//! blocks via the scheduler instead of spinning. Unlike [`SpinLock`], a
//! thread may safely hold a `Mutex` across a suspension point.
//!
//! [`SpinLock`]: super::spinlock::SpinLock

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use super::waitlist::WaitList;

pub struct Mutex<T: ?Sized> {
    locked: AtomicBool,
    waiters: WaitList,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: WaitList::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn acquire(&self) -> MutexGuard<'_, T> {
        loop {
            if self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return MutexGuard { mutex: self };
            }
            // Contended: block until whoever holds it releases and wakes us.
            // A spurious wake (racing with another waiter) just loops back
            // to the CAS above.
            if !self.waiters.wait() {
                // Waitlist closed underneath us (mutex being torn down) --
                // still attempt one last CAS so a legitimate unlock right
                // before close isn't missed.
                if self
                    .locked
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return MutexGuard { mutex: self };
                }
            }
        }
    }

    pub fn try_acquire(&self) -> Option<MutexGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| MutexGuard { mutex: self })
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        self.mutex.waiters.wake(1);
    }
}
