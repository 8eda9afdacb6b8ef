// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Counting Semaphore
//!
//! A counting wait primitive built on the scheduler's `sleep()`. Waiters
//! queue in FIFO order and are woken one per `release()`.
//!
//! # Usage
//!
//! ```rust,ignore
//! let items = Semaphore::new(0);
//!
//! // Producer, any CPU
//! queue.lock(irq).push_back(item);
//! items.release(kernel);
//!
//! // Consumer thread
//! items.acquire(kernel);
//! let item = queue.lock(irq).pop_front();
//! ```

use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};

use crate::kernel::context::KernelContext;
use crate::kernel::sync::spin::IrqSpinlock;
use crate::kernel::thread::Thread;

use crate::fatal;

struct SemaphoreState {
    count: usize,
    waiters: VecDeque<Weak<Thread>>,
}

/// Counting semaphore
pub struct Semaphore {
    state: IrqSpinlock<SemaphoreState>,
}

impl Semaphore {
    pub const fn new(count: usize) -> Self {
        Self {
            state: IrqSpinlock::new(SemaphoreState {
                count,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Current count
    pub fn count(&self, kernel: &KernelContext) -> usize {
        self.state.lock(kernel.irq()).count
    }

    /// Number of threads blocked in [`acquire`](Self::acquire)
    pub fn waiters(&self, kernel: &KernelContext) -> usize {
        self.state.lock(kernel.irq()).waiters.len()
    }

    /// Take one unit if available
    pub fn try_acquire(&self, kernel: &KernelContext) -> bool {
        let mut state = self.state.lock(kernel.irq());
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Take one unit, sleeping until one is available
    ///
    /// A sleep cut short by an event goes back to waiting without
    /// queueing the thread a second time.
    pub fn acquire(&self, kernel: &KernelContext) {
        let Some(current) = kernel.current_thread() else {
            fatal!("semaphore: acquire with no current thread");
        };

        loop {
            let mut state = self.state.lock(kernel.irq());
            if state.count > 0 {
                state.count -= 1;
                state.waiters.retain(|waiter| !is_thread(waiter, &current));
                return;
            }

            if !state.waiters.iter().any(|waiter| is_thread(waiter, &current)) {
                state.waiters.push_back(Arc::downgrade(&current));
            }
            kernel.current_scheduler().sleep(kernel, Some(state.into_held()));
        }
    }

    /// Add one unit and wake the longest waiter
    ///
    /// Waiters that are no longer asleep are skipped, so the unit always
    /// reaches a thread that is still blocked here.
    pub fn release(&self, kernel: &KernelContext) {
        let mut state = self.state.lock(kernel.irq());
        state.count += 1;
        while let Some(weak) = state.waiters.pop_front() {
            if let Some(thread) = weak.upgrade() {
                if thread.wake(kernel) {
                    break;
                }
            }
        }
    }
}

fn is_thread(waiter: &Weak<Thread>, thread: &Arc<Thread>) -> bool {
    core::ptr::eq(waiter.as_ptr(), Arc::as_ptr(thread))
}
