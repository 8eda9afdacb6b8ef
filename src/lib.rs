// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux per-CPU scheduler
//!
//! Thread lifecycle management and per-CPU scheduling for the Rustux
//! kernel: thread state levels and event delivery, the per-processor
//! scheduler with its pluggable algorithm, cross-CPU thread placement,
//! and join/detach/shutdown semantics.
//!
//! The crate is `no_std` and only needs `alloc`. Hardware access goes
//! through the traits in [`kernel::arch`], and page/stack management and
//! process bookkeeping go through [`kernel::vm::MemoryManager`] and
//! [`kernel::process::ProcessTable`]. All of them hang off a
//! [`kernel::context::KernelContext`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod kernel;
pub mod rustux;

pub use kernel::context::KernelContext;
pub use rustux::errors::{Error, Result};
