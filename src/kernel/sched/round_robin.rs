// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Round-Robin Scheduling
//!
//! One FIFO per priority bucket; the lowest-numbered non-empty bucket is
//! served first. A thread is queued while it is `Ready` and dequeued as
//! soon as its status changes to anything else.
//!
//! ```text
//! bucket 0  [ ]
//! bucket 1  [ B ][ C ]   <- get_next pops B
//! bucket 2  [ D ]
//! ...
//! ```

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use super::algorithm::SchedulingAlgorithm;
use crate::kernel::arch::ArchInterrupts;
use crate::kernel::config::MAX_PRIORITIES;
use crate::kernel::sync::IrqSpinlock;
use crate::kernel::thread::{LockToken, Thread, ThreadStatus};

use crate::log_trace;

/// Priority-bucketed round robin
pub struct RoundRobin {
    ready: IrqSpinlock<[VecDeque<Arc<Thread>>; MAX_PRIORITIES]>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            ready: IrqSpinlock::new(core::array::from_fn(|_| VecDeque::new())),
        }
    }

    fn bucket(thread: &Thread) -> usize {
        thread.priority().min(MAX_PRIORITIES - 1)
    }

    fn dequeue(queues: &mut [VecDeque<Arc<Thread>>; MAX_PRIORITIES], thread: &Thread) {
        for queue in queues.iter_mut() {
            queue.retain(|t| !same(t, thread));
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

fn same(queued: &Arc<Thread>, thread: &Thread) -> bool {
    core::ptr::eq(Arc::as_ptr(queued), thread)
}

impl SchedulingAlgorithm for RoundRobin {
    fn add_thread(&self, thread: Arc<Thread>, irq: &dyn ArchInterrupts) {
        self.thread_status_changed(&thread, irq);
    }

    fn remove_thread(&self, thread: &Thread, irq: &dyn ArchInterrupts) {
        Self::dequeue(&mut self.ready.lock(irq), thread);
    }

    fn get_next(&self, current: &Thread, irq: &dyn ArchInterrupts) -> Option<LockToken> {
        // Pop under the queue lock, lock the thread after dropping it.
        let next = {
            let mut queues = self.ready.lock(irq);
            let mut found = None;
            'buckets: for queue in queues.iter_mut() {
                while let Some(thread) = queue.pop_front() {
                    if !same(&thread, current) {
                        found = Some(thread);
                        break 'buckets;
                    }
                }
            }
            found
        }?;

        log_trace!("round robin: next thread {}", next.id());
        Some(next.lock_for_switch(irq))
    }

    fn thread_status_changed(&self, thread: &Arc<Thread>, irq: &dyn ArchInterrupts) {
        let mut queues = self.ready.lock(irq);
        if thread.status() == ThreadStatus::Ready {
            let queued = queues.iter().any(|q| q.iter().any(|t| Arc::ptr_eq(t, thread)));
            if !queued {
                queues[Self::bucket(thread)].push_back(thread.clone());
            }
        } else {
            Self::dequeue(&mut queues, thread);
        }
    }

    fn ready_count(&self, irq: &dyn ArchInterrupts) -> usize {
        self.ready.lock(irq).iter().map(VecDeque::len).sum()
    }

    fn is_queued(&self, thread: &Thread, irq: &dyn ArchInterrupts) -> bool {
        self.ready
            .lock(irq)
            .iter()
            .any(|queue| queue.iter().any(|t| same(t, thread)))
    }
}
