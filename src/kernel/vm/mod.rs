// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Virtual Memory Interface
//!
//! The scheduler does not manage memory itself. It asks a
//! [`MemoryManager`] for stacks, for physical pages backing event scratch
//! buffers and TLS, and for mappings in a process's address space.

pub mod stacks;

pub use stacks::{StackHandle, StackKind};

use crate::rustux::errors::Result;
use crate::rustux::types::*;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Round an address down to its page
#[inline]
pub const fn page_align_down(vaddr: VAddr) -> VAddr {
    vaddr & !PAGE_MASK
}

bitflags::bitflags! {
    /// Mapping attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MappingFlags: u32 {
        /// Writable
        const WRITE = 1 << 0;

        /// Executable
        const EXECUTE = 1 << 1;

        /// Only accessible from kernel mode
        const KERNEL_MODE = 1 << 2;

        /// Shared between address spaces
        const SHARED = 1 << 3;
    }
}

/// Page, mapping and stack services used by the scheduler
pub trait MemoryManager: Send + Sync {
    /// Allocate one physical page
    fn allocate_page(&self) -> Option<PAddr>;

    /// Return a physical page to the allocator
    fn free_page(&self, page: PAddr);

    /// Map `page` at `vaddr` in `aspace`
    fn map(&self, aspace: AddressSpaceId, vaddr: VAddr, page: PAddr, flags: MappingFlags) -> Result;

    /// Remove the mapping at `vaddr`, returning the page it mapped
    fn unmap(&self, aspace: AddressSpaceId, vaddr: VAddr) -> Option<PAddr>;

    /// Page and attributes mapped at `vaddr`, if any
    fn mapping(&self, aspace: AddressSpaceId, vaddr: VAddr) -> Option<(PAddr, MappingFlags)>;

    /// Whether anything is mapped at `vaddr`
    fn is_mapped(&self, aspace: AddressSpaceId, vaddr: VAddr) -> bool {
        self.mapping(aspace, vaddr).is_some()
    }

    /// Copy `bytes` to `vaddr` in `aspace`
    fn write_bytes(&self, aspace: AddressSpaceId, vaddr: VAddr, bytes: &[u8]) -> Result;

    /// Allocate a kernel stack
    fn allocate_kernel_stack(&self) -> Option<StackHandle>;

    /// Allocate a user stack in `aspace`
    fn allocate_user_stack(&self, aspace: AddressSpaceId) -> Option<StackHandle>;

    /// Free a stack from either allocator
    fn free_stack(&self, stack: StackHandle);
}
