// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Scheduler
//!
//! Each CPU runs its own [`PerProcessorScheduler`] around a pluggable
//! [`SchedulingAlgorithm`]. New threads are placed on a CPU by a
//! [`ProcessorThreadAllocator`] and travel there through that CPU's
//! [`TransferQueue`].
//!
//! # Design
//!
//! - **Per-CPU**: no scheduler state is shared between CPUs
//! - **Priority round robin**: FIFO within a priority, lower number first
//! - **Preemptive**: every Nth timer tick reschedules
//! - **Lock hand-off**: the outgoing thread's lock is released by the
//!   incoming side once the switch is complete
//!
//! # Usage
//!
//! ```rust,ignore
//! // Yield the CPU
//! kernel.current_scheduler().schedule(kernel, ThreadStatus::Ready, None, None);
//!
//! // Sleep, releasing a lock atomically with going to sleep
//! let guard = queue.lock(kernel.irq());
//! kernel.current_scheduler().sleep(kernel, Some(guard.into_held()));
//! ```

pub mod algorithm;
pub mod per_cpu;
pub mod placement;
pub mod round_robin;

pub use algorithm::SchedulingAlgorithm;
pub use per_cpu::{transfer_pump_entry, PerProcessorScheduler};
pub use placement::{
    CurrentCpuPlacement, NewThreadData, ProcessorThreadAllocator, RoundRobinPlacement, TransferQueue,
};
pub use round_robin::RoundRobin;
