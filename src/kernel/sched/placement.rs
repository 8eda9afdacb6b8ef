// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Cross-CPU Thread Placement
//!
//! A [`ProcessorThreadAllocator`] picks the CPU a new thread starts on.
//! When that is not the calling CPU, the thread travels to its target as
//! a [`NewThreadData`] through the target's [`TransferQueue`], and the
//! target's pump thread adds it locally.
//!
//! ```text
//! CPU 0: spawn ---> select_cpu() = 1 ---> transfers[1].push(data)
//!                                               |  release(count)
//! CPU 1: pump thread <--------------------------+
//!        acquire(count); pop(); add_thread(data)   -> Running on CPU 1
//! ```

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::kernel::arch::ArchCpu;
use crate::kernel::context::KernelContext;
use crate::kernel::process::ProcessId;
use crate::kernel::sync::{IrqSpinlock, Semaphore};
use crate::kernel::thread::Thread;
use crate::rustux::types::*;

/// Chooses the CPU a new thread starts on
pub trait ProcessorThreadAllocator: Send + Sync {
    fn select_cpu(&self, kernel: &KernelContext, parent: ProcessId) -> CpuId;
}

/// Start every thread on the CPU that creates it
#[derive(Debug, Default)]
pub struct CurrentCpuPlacement;

impl ProcessorThreadAllocator for CurrentCpuPlacement {
    fn select_cpu(&self, kernel: &KernelContext, _parent: ProcessId) -> CpuId {
        kernel.machine().cpu_id()
    }
}

/// Rotate new threads over all CPUs
#[derive(Debug, Default)]
pub struct RoundRobinPlacement {
    next: AtomicU32,
}

impl RoundRobinPlacement {
    pub const fn new() -> Self {
        Self { next: AtomicU32::new(0) }
    }
}

impl ProcessorThreadAllocator for RoundRobinPlacement {
    fn select_cpu(&self, kernel: &KernelContext, _parent: ProcessId) -> CpuId {
        let cpus = kernel.cpu_count().max(1) as CpuId;
        self.next.fetch_add(1, Ordering::Relaxed) % cpus
    }
}

/// A thread on its way to another CPU
#[derive(Debug)]
pub struct NewThreadData {
    pub thread: Arc<Thread>,
    pub entry: VAddr,
    pub param: usize,
    pub user_mode: bool,
    pub stack: VAddr,
}

/// Inbound thread transfers for one CPU
pub struct TransferQueue {
    pending: IrqSpinlock<VecDeque<NewThreadData>>,
    count: Semaphore,
}

impl TransferQueue {
    pub const fn new() -> Self {
        Self {
            pending: IrqSpinlock::new(VecDeque::new()),
            count: Semaphore::new(0),
        }
    }

    /// Queue a transfer and wake the pump
    pub fn push(&self, kernel: &KernelContext, data: NewThreadData) {
        self.pending.lock(kernel.irq()).push_back(data);
        self.count.release(kernel);
    }

    /// Take the next transfer, sleeping until there is one
    pub fn pop(&self, kernel: &KernelContext) -> Option<NewThreadData> {
        self.count.acquire(kernel);
        self.pending.lock(kernel.irq()).pop_front()
    }

    /// Take the next transfer if one is queued
    pub fn try_pop(&self, kernel: &KernelContext) -> Option<NewThreadData> {
        if !self.count.try_acquire(kernel) {
            return None;
        }
        self.pending.lock(kernel.irq()).pop_front()
    }

    pub fn len(&self, kernel: &KernelContext) -> usize {
        self.pending.lock(kernel.irq()).len()
    }

    pub fn is_empty(&self, kernel: &KernelContext) -> bool {
        self.len(kernel) == 0
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}
