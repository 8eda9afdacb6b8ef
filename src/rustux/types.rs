// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common type aliases used throughout the kernel

/// Virtual address type
pub type VAddr = usize;

/// Physical address type
pub type PAddr = u64;

/// Error code type (negative values indicate errors)
pub type Status = i32;

/// Thread ID type (unique within the owning process)
pub type Tid = u64;

/// Process ID type
pub type Pid = u64;

/// CPU ID type
pub type CpuId = u32;

/// Address space identifier handed out by the memory manager
pub type AddressSpaceId = u64;

/// Time value in nanoseconds
pub type Nanoseconds = u64;
