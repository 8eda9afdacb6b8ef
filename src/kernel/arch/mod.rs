// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture Abstraction Layer (AAL)
//!
//! The hardware interface of the scheduler and the native pieces of it
//! this crate can provide itself.

// Architecture traits (interface)
pub mod arch_traits;

// Native interrupt flag control
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub mod native;

pub use arch_traits::*;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub use native::NativeInterrupts;
