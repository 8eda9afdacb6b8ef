// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduling Algorithm Interface
//!
//! The policy half of a per-CPU scheduler. The per-processor scheduler
//! performs switches; an algorithm only decides which ready thread runs
//! next. Implementations do their own locking with interrupt-disabling
//! locks, since they are reached from the timer tick as well as from
//! thread context.

use alloc::sync::Arc;

use crate::kernel::arch::ArchInterrupts;
use crate::kernel::thread::{LockToken, Thread};

/// Policy deciding the next thread on one CPU
pub trait SchedulingAlgorithm: Send + Sync {
    /// Start tracking a thread homed on this CPU
    fn add_thread(&self, thread: Arc<Thread>, irq: &dyn ArchInterrupts);

    /// Stop tracking a thread
    fn remove_thread(&self, thread: &Thread, irq: &dyn ArchInterrupts);

    /// Pick the next thread to run instead of `current`
    ///
    /// The returned thread's scheduler lock is already held. `current`
    /// itself is never returned.
    fn get_next(&self, current: &Thread, irq: &dyn ArchInterrupts) -> Option<LockToken>;

    /// React to a status change of a tracked thread
    fn thread_status_changed(&self, thread: &Arc<Thread>, irq: &dyn ArchInterrupts);

    /// Number of threads waiting to run
    fn ready_count(&self, irq: &dyn ArchInterrupts) -> usize;

    /// Whether `thread` is waiting to run
    fn is_queued(&self, thread: &Thread, irq: &dyn ArchInterrupts) -> bool;
}
