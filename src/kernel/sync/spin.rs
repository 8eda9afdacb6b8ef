// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Interrupt-Disabling Spinlocks
//!
//! Spinlocks used by the scheduler. Acquiring one disables interrupts on
//! the calling CPU and records whether they were enabled before; the
//! normal release path restores that state.
//!
//! # Design
//!
//! - [`RawSpinlock`]: the bare lock word plus the recorded interrupt
//!   state. Thread scheduler locks are raw locks, held across context
//!   switches through [`LockToken`](crate::kernel::thread::LockToken).
//! - [`IrqSpinlock<T>`]: a raw lock protecting data, with an RAII guard.
//! - [`HeldLock`]: a guard surrendered to the scheduler. The scheduler
//!   releases it mid-switch without re-enabling interrupts and inherits
//!   the recorded interrupt state instead.
//!
//! # Usage
//!
//! ```rust,ignore
//! let guard = queue_lock.lock(kernel.machine());
//! if guard.is_empty() {
//!     // Sleep and drop the lock atomically with going to sleep
//!     kernel.current_scheduler().sleep(kernel, Some(guard.into_held()));
//! }
//! ```

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::kernel::arch::ArchInterrupts;

/// A spinlock that disables interrupts while held
pub struct RawSpinlock {
    locked: AtomicBool,
    /// Interrupt state of the acquiring CPU before acquisition
    interrupts: AtomicBool,
}

impl RawSpinlock {
    /// Create a new, unlocked spinlock
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            interrupts: AtomicBool::new(false),
        }
    }

    /// Disable interrupts and spin until the lock is ours
    pub fn acquire(&self, irq: &dyn ArchInterrupts) {
        let was = irq.interrupts_enabled();
        irq.set_interrupts(false);

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }

        self.interrupts.store(was, Ordering::Relaxed);
    }

    /// Try to take the lock without spinning
    ///
    /// Interrupts are left untouched when the lock is busy.
    pub fn try_acquire(&self, irq: &dyn ArchInterrupts) -> bool {
        let was = irq.interrupts_enabled();
        irq.set_interrupts(false);

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.interrupts.store(was, Ordering::Relaxed);
            true
        } else {
            irq.set_interrupts(was);
            false
        }
    }

    /// Release the lock and restore the recorded interrupt state
    pub fn release(&self, irq: &dyn ArchInterrupts) {
        // SAFETY: callers only release locks they hold.
        let was = unsafe { self.release_raw() };
        if was {
            irq.set_interrupts(true);
        }
    }

    /// Release the lock without touching interrupts
    ///
    /// Returns the interrupt state recorded at acquisition.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock.
    pub unsafe fn release_raw(&self) -> bool {
        let was = self.interrupts.load(Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        was
    }

    /// Acquire the lock and hand it straight to the scheduler
    pub fn hold<'a>(&'a self, irq: &'a dyn ArchInterrupts) -> HeldLock<'a> {
        self.acquire(irq);
        HeldLock { raw: self, irq }
    }

    /// Whether some CPU currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// An interrupt-disabling spinlock protecting a value
pub struct IrqSpinlock<T> {
    raw: RawSpinlock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for IrqSpinlock<T> {}
unsafe impl<T: Send> Sync for IrqSpinlock<T> {}

impl<T> IrqSpinlock<T> {
    /// Create a new spinlock
    pub const fn new(data: T) -> Self {
        Self {
            raw: RawSpinlock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, disabling interrupts on this CPU
    pub fn lock<'a>(&'a self, irq: &'a dyn ArchInterrupts) -> IrqSpinlockGuard<'a, T> {
        self.raw.acquire(irq);
        IrqSpinlockGuard { lock: self, irq }
    }

    /// Try to acquire the lock without spinning
    pub fn try_lock<'a>(&'a self, irq: &'a dyn ArchInterrupts) -> Option<IrqSpinlockGuard<'a, T>> {
        if self.raw.try_acquire(irq) {
            Some(IrqSpinlockGuard { lock: self, irq })
        } else {
            None
        }
    }

    /// Whether the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

/// RAII guard for an [`IrqSpinlock`]
pub struct IrqSpinlockGuard<'a, T> {
    lock: &'a IrqSpinlock<T>,
    irq: &'a dyn ArchInterrupts,
}

impl<'a, T> IrqSpinlockGuard<'a, T> {
    /// Hand the held lock over to the scheduler
    pub fn into_held(self) -> HeldLock<'a> {
        let held = HeldLock { raw: &self.lock.raw, irq: self.irq };
        core::mem::forget(self);
        held
    }
}

impl<'a, T> Drop for IrqSpinlockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.raw.release(self.irq);
    }
}

impl<'a, T> Deref for IrqSpinlockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for IrqSpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

/// A held spinlock whose release has been delegated to the scheduler
///
/// Dropping it releases the lock normally and restores interrupts.
#[must_use]
pub struct HeldLock<'a> {
    raw: &'a RawSpinlock,
    irq: &'a dyn ArchInterrupts,
}

impl<'a> HeldLock<'a> {
    /// Release during a context switch, leaving interrupts disabled
    ///
    /// Returns whether interrupts were enabled when the lock was taken.
    pub fn release_in_switch(self) -> bool {
        let raw = self.raw;
        core::mem::forget(self);
        // SAFETY: a HeldLock only exists for a held lock.
        unsafe { raw.release_raw() }
    }

    /// Whether this is `lock`
    pub fn is(&self, lock: &RawSpinlock) -> bool {
        core::ptr::eq(self.raw, lock)
    }
}

impl<'a> Drop for HeldLock<'a> {
    fn drop(&mut self) {
        self.raw.release(self.irq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FakeIrq(AtomicBool);

    impl ArchInterrupts for FakeIrq {
        fn interrupts_enabled(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        fn set_interrupts(&self, enabled: bool) {
            self.0.store(enabled, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_restores_interrupts() {
        let irq = FakeIrq(AtomicBool::new(true));
        let lock = IrqSpinlock::new(5u32);
        {
            let mut guard = lock.lock(&irq);
            assert!(!irq.interrupts_enabled());
            *guard += 1;
        }
        assert!(irq.interrupts_enabled());
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(&irq), 6);
    }

    #[test]
    fn test_guard_keeps_interrupts_off_if_they_were_off() {
        let irq = FakeIrq(AtomicBool::new(false));
        let lock = IrqSpinlock::new(());
        drop(lock.lock(&irq));
        assert!(!irq.interrupts_enabled());
    }

    #[test]
    fn test_try_lock_busy() {
        let irq = FakeIrq(AtomicBool::new(true));
        let lock = IrqSpinlock::new(());
        let _guard = lock.lock(&irq);
        irq.set_interrupts(true);
        assert!(lock.try_lock(&irq).is_none());
        assert!(irq.interrupts_enabled());
    }

    #[test]
    fn test_held_lock_release_in_switch() {
        let irq = FakeIrq(AtomicBool::new(true));
        let lock = IrqSpinlock::new(());
        let held = lock.lock(&irq).into_held();
        assert!(held.is(&lock.raw));
        assert!(held.release_in_switch());
        assert!(!lock.is_locked());
        // Interrupts stay off; the scheduler restores them after the switch.
        assert!(!irq.interrupts_enabled());
    }

    #[test]
    fn test_held_lock_drop_releases() {
        let irq = FakeIrq(AtomicBool::new(true));
        let lock = IrqSpinlock::new(());
        drop(lock.lock(&irq).into_held());
        assert!(!lock.is_locked());
        assert!(irq.interrupts_enabled());
    }

    #[test]
    fn test_mutual_exclusion() {
        let irq = Arc::new(FakeIrq(AtomicBool::new(false)));
        let lock = Arc::new(IrqSpinlock::new(0usize));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let irq = irq.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock(&*irq) += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(&*irq), 4000);
    }
}
