// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Process Interface
//!
//! Threads refer to their process by [`ProcessId`] only. Everything the
//! scheduler needs to know about or tell a process goes through the
//! [`ProcessTable`] the kernel context was built with.
//!
//! # Usage
//!
//! ```rust,ignore
//! // Account the switch from one process to the next
//! processes.record_time(outgoing.parent());
//! processes.track_time(incoming.parent());
//!
//! // Address space to activate for a thread
//! let aspace = processes.address_space(thread.parent());
//! ```

use crate::rustux::errors::Result;
use crate::rustux::types::*;

/// ============================================================================
/// Process ID
/// ============================================================================

/// Process ID type
pub type ProcessId = Pid;

/// Kernel process ID (PID 0)
pub const PID_KERNEL: ProcessId = 0;

/// ============================================================================
/// Process Table
/// ============================================================================

/// Process bookkeeping the scheduler depends on
pub trait ProcessTable: Send + Sync {
    /// Register a new thread with `pid` and return its id
    fn register_thread(&self, pid: ProcessId) -> Result<Tid>;

    /// Forget a destroyed thread
    fn unregister_thread(&self, pid: ProcessId, tid: Tid);

    /// Address space threads of `pid` run in
    fn address_space(&self, pid: ProcessId) -> AddressSpaceId;

    /// Wake anything waiting for a state change of `pid`'s threads
    fn notify_waiters(&self, pid: ProcessId);

    /// Start charging CPU time to `pid`
    fn track_time(&self, pid: ProcessId);

    /// Stop charging CPU time to `pid` and record what was used
    fn record_time(&self, pid: ProcessId);

    /// Reserve a page-sized TLS slot in `pid`'s address space
    fn allocate_tls_range(&self, pid: ProcessId) -> Option<VAddr>;

    /// Give a TLS slot back
    fn free_tls_range(&self, pid: ProcessId, vaddr: VAddr);

    /// Terminate `pid` through its subsystem with `code`
    fn exit(&self, pid: ProcessId, code: i32);
}
