// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Stacks
//!
//! Stacks are allocated and freed by the [`MemoryManager`]; threads only
//! keep the [`StackHandle`] it hands out. A handle is owned: exactly one
//! state level holds it, and it goes back to the memory manager when the
//! thread is destroyed.
//!
//! # Stack Layout
//!
//! ```text
//! +------------------+ <- top (initial SP)
//! |   Stack Data     |
//! |  (grows down)    |
//! +------------------+ <- base
//! |   Guard Page     |
//! +------------------+
//! ```
//!
//! [`MemoryManager`]: super::MemoryManager

use crate::rustux::types::*;

/// Default kernel stack size (64KB)
pub const DEFAULT_KERNEL_STACK_SIZE: usize = 64 * 1024;

/// Default user event stack size (64KB)
pub const DEFAULT_USER_STACK_SIZE: usize = 64 * 1024;

/// Stack alignment requirement (16 bytes for ABI)
pub const STACK_ALIGN: usize = 16;

/// Which privilege level a stack serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    /// Kernel virtual address space
    Kernel,
    /// User stack in the given address space
    User(AddressSpaceId),
}

/// Opaque owned handle to an allocated stack
#[derive(Debug, PartialEq, Eq)]
pub struct StackHandle {
    top: VAddr,
    size: usize,
    kind: StackKind,
}

impl StackHandle {
    /// Wrap a stack allocated by a memory manager
    pub const fn new(top: VAddr, size: usize, kind: StackKind) -> Self {
        Self { top, size, kind }
    }

    /// Initial stack pointer
    pub const fn top(&self) -> VAddr {
        self.top
    }

    /// Lowest usable address
    pub const fn base(&self) -> VAddr {
        self.top - self.size
    }

    /// Usable size in bytes
    pub const fn size(&self) -> usize {
        self.size
    }

    pub const fn kind(&self) -> StackKind {
        self.kind
    }

    /// Check if an address is within this stack
    pub fn contains(&self, vaddr: VAddr) -> bool {
        vaddr >= self.base() && vaddr < self.top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_bounds() {
        let stack = StackHandle::new(0x2_0000, 0x1_0000, StackKind::Kernel);
        assert_eq!(stack.base(), 0x1_0000);
        assert!(stack.contains(0x1_0000));
        assert!(stack.contains(0x1_fff0));
        assert!(!stack.contains(0x2_0000));
        assert_eq!(stack.kind(), StackKind::Kernel);
    }
}
