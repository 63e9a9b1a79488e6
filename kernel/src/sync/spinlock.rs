//! Spinlocks with IRQ masking and a recursive variant.
//!
//! Explicit kernel types wrapping `spin`'s primitives with IRQ-mask
//! discipline: `acquire_irq` disables interrupts and returns the prior
//! flags, `release_irq` restores them. On uniprocessor builds (no `smp`
//! feature) the lock degrades to an IRQ mask only.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::arch;

/// Saved interrupt-enable state, returned by [`SpinLock::acquire_irq`] and
/// consumed by [`SpinLock::release_irq`].
#[derive(Debug, Clone, Copy)]
pub struct IrqFlags(bool);

/// A spinlock that never sleeps. Acquiring while already held by the current
/// CPU deadlocks immediately (spin forever) -- this is intentional: a thread
/// must not recursively acquire a plain `SpinLock` (see [`RecursiveSpinLock`]
/// for the sanctioned recursive variant).
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, spinning with `pause` while contended.
    pub fn acquire(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Acquire the lock with interrupts disabled, returning the prior IRQ
    /// state so the caller can restore it via [`release_irq`].
    ///
    /// [`release_irq`]: SpinLock::release_irq
    pub fn acquire_irq(&self) -> (SpinLockGuard<'_, T>, IrqFlags) {
        let was_enabled = arch::interrupts_enabled();
        arch::disable_interrupts();
        (self.acquire(), IrqFlags(was_enabled))
    }

    /// Release a lock taken with [`acquire_irq`], restoring the prior IRQ
    /// state. The guard must be dropped (or passed in) before interrupts are
    /// re-enabled so no interrupt can observe the lock still held.
    ///
    /// [`acquire_irq`]: SpinLock::acquire_irq
    pub fn release_irq(guard: SpinLockGuard<'_, T>, flags: IrqFlags) {
        drop(guard);
        if flags.0 {
            arch::enable_interrupts();
        }
    }

    pub fn try_acquire(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    /// # Safety
    /// The caller must guarantee no other CPU holds a live guard to this
    /// lock's data; used only by the panic pipeline to dump locked state.
    pub unsafe fn force_unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// A recursive spinlock: the same CPU may re-acquire it without deadlocking.
/// "Owner" is the current-thread pointer (as a raw `usize`), or
/// `EARLY_BOOT_OWNER` before the scheduler is initialized.
pub struct RecursiveSpinLock<T: ?Sized> {
    owner: AtomicUsize,
    depth: AtomicUsize,
    data: UnsafeCell<T>,
}

const NO_OWNER: usize = 0;
/// Sentinel owner used for acquisitions that happen before the scheduler has
/// a notion of "current thread" (early boot code on the BSP).
pub const EARLY_BOOT_OWNER: usize = usize::MAX;

unsafe impl<T: ?Sized + Send> Send for RecursiveSpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for RecursiveSpinLock<T> {}

pub struct RecursiveGuard<'a, T: ?Sized> {
    lock: &'a RecursiveSpinLock<T>,
}

impl<T> RecursiveSpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            owner: AtomicUsize::new(NO_OWNER),
            depth: AtomicUsize::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Returns the calling thread's identity as used for ownership tracking:
    /// the current thread's pointer value, or [`EARLY_BOOT_OWNER`] if the
    /// scheduler has no current thread yet.
    fn self_id() -> usize {
        crate::sched::current_thread_ptr().unwrap_or(EARLY_BOOT_OWNER)
    }

    pub fn acquire(&self) -> RecursiveGuard<'_, T> {
        let me = Self::self_id();
        loop {
            match self
                .owner
                .compare_exchange_weak(NO_OWNER, me, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.depth.store(1, Ordering::Relaxed);
                    break;
                }
                Err(current) if current == me => {
                    self.depth.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(_) => core::hint::spin_loop(),
            }
        }
        RecursiveGuard { lock: self }
    }
}

impl<T: ?Sized> Deref for RecursiveGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RecursiveGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RecursiveGuard<'_, T> {
    fn drop(&mut self) {
        if self.lock.depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.lock.owner.store(NO_OWNER, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinlock_basic() {
        let lock = SpinLock::new(5usize);
        {
            let mut g = lock.acquire();
            *g += 1;
        }
        assert_eq!(*lock.acquire(), 6);
    }

    #[test]
    fn spinlock_try_acquire_fails_when_held() {
        let lock = SpinLock::new(0);
        let _g = lock.acquire();
        assert!(lock.try_acquire().is_none());
    }
}
