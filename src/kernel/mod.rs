// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Microkernel - Scheduler Core
//!
//! This module contains the per-CPU scheduler and thread lifecycle
//! management, plus the narrow interfaces they use to reach the machine,
//! the memory manager and the process table.

// Re-export commonly used types
pub use crate::rustux::types::*;

// Logging macros first so every other module can use them
#[macro_use]
pub mod debug;

// Architecture interface
pub mod arch;

pub mod config;
pub mod context;
pub mod process;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod vm;

#[cfg(test)]
pub(crate) mod tests;
