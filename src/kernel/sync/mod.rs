// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Synchronization Primitives
//!
//! # Primitives
//!
//! - **Spinlocks**: interrupt-disabling locks, including the raw lock
//!   behind every thread's scheduler lock
//! - **Semaphore**: counting wait primitive on top of `sleep()`

pub mod semaphore;
pub mod spin;

// Re-exports
pub use self::semaphore::Semaphore;
pub use self::spin::{HeldLock, IrqSpinlock, IrqSpinlockGuard, RawSpinlock};
