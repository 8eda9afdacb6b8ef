// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture Abstraction Layer (AAL)
//!
//! The traits the scheduler needs from the hardware. A platform provides
//! one object implementing all of them (see [`Machine`]); every method
//! acts on the CPU that calls it.
//!
//! # Context switching
//!
//! [`ArchThreadContext::save_context`] returns twice, like `setjmp`:
//! once with [`SaveOutcome::JustSaved`] right after the registers were
//! stored, and again with [`SaveOutcome::Resumed`] when some other
//! thread later restores that context.
//!
//! ```text
//! match machine.save_context(current) {
//!     Resumed   => after_switch(),          // someone switched back to us
//!     JustSaved => {
//!         machine.restore_context(next, token);   // never returns on hardware
//!         after_switch()                          // hosted machines only
//!     }
//! }
//! ```
//!
//! Restore and jump primitives receive the outgoing thread's
//! [`LockToken`] and release it only once they are running on the
//! incoming thread's stack. On hardware they never return. A hosted
//! implementation (simulators, unit tests) returns once the incoming
//! thread is considered live, and the caller then runs the post-switch
//! work the `Resumed` branch would run.

use memoffset::offset_of;

use crate::kernel::context::Reaper;
use crate::kernel::thread::LockToken;
use crate::rustux::types::*;

/// Number of callee-saved general purpose registers in a context
pub const CALLEE_SAVED_REGS: usize = 12;

/// Number of syscall argument registers preserved in a [`SyscallState`]
pub const SYSCALL_ARGS: usize = 6;

/// Result of [`ArchThreadContext::save_context`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The context was just stored; execution continues on this thread
    JustSaved,
    /// Another thread restored the saved context
    Resumed,
}

/// Saved kernel register state of a thread at one state level
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub sp: usize,
    pub ip: usize,
    pub flags: usize,
    /// First argument register, used by freshly initialised contexts
    pub arg: usize,
    pub callee: [usize; CALLEE_SAVED_REGS],
}

/// Register frame saved on syscall entry
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyscallState {
    pub ip: usize,
    pub sp: usize,
    pub flags: usize,
    pub result: usize,
    pub args: [usize; SYSCALL_ARGS],
}

/// Register frame passed to interrupt handlers
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptState {
    pub ip: usize,
    pub sp: usize,
    pub flags: usize,
    pub vector: usize,
}

/// Field offsets used by the context switch assembly
pub const CONTEXT_SP_OFFSET: usize = offset_of!(SavedContext, sp);
pub const CONTEXT_IP_OFFSET: usize = offset_of!(SavedContext, ip);
pub const CONTEXT_FLAGS_OFFSET: usize = offset_of!(SavedContext, flags);
pub const CONTEXT_ARG_OFFSET: usize = offset_of!(SavedContext, arg);
pub const CONTEXT_CALLEE_OFFSET: usize = offset_of!(SavedContext, callee);

/// Field offsets used by the syscall return path
pub const SYSCALL_IP_OFFSET: usize = offset_of!(SyscallState, ip);
pub const SYSCALL_SP_OFFSET: usize = offset_of!(SyscallState, sp);
pub const SYSCALL_RESULT_OFFSET: usize = offset_of!(SyscallState, result);

/// Interrupt enable/disable on the calling CPU
pub trait ArchInterrupts {
    /// Check if interrupts are currently enabled
    fn interrupts_enabled(&self) -> bool;

    /// Enable or disable interrupts
    fn set_interrupts(&self, enabled: bool);
}

/// Per-CPU control state
pub trait ArchCpu {
    /// Id of the calling CPU
    fn cpu_id(&self) -> CpuId;

    /// Stack loaded on the next privilege transition into the kernel
    fn set_kernel_stack(&self, top: VAddr);

    /// Make `aspace` the active address space
    fn switch_address_space(&self, aspace: AddressSpaceId);

    /// Set the thread-local storage base register
    fn set_tls_base(&self, base: VAddr);

    /// Route the periodic scheduler tick of `cpu` to
    /// [`KernelContext::scheduler_tick`](crate::kernel::context::KernelContext::scheduler_tick)
    fn register_scheduler_tick(&self, cpu: CpuId);
}

/// Thread context save/restore and privilege transitions
pub trait ArchThreadContext {
    /// Prepare a context that starts at `entry(arg)` on `stack_top`
    ///
    /// # Safety
    ///
    /// `stack_top` must be the top of a stack owned by the thread.
    unsafe fn init_context(&self, context: &mut SavedContext, entry: VAddr, stack_top: VAddr, arg: usize);

    /// Save the calling thread's registers into `context`
    ///
    /// # Safety
    ///
    /// `context` must stay valid until it is restored or discarded.
    unsafe fn save_context(&self, context: *mut SavedContext) -> SaveOutcome;

    /// Switch to `context`, releasing `handoff` once off the old stack
    ///
    /// # Safety
    ///
    /// `context` must have been saved or initialised and not yet restored.
    unsafe fn restore_context(&self, context: *const SavedContext, handoff: Option<LockToken>);

    /// Switch to `context` and then destroy the outgoing thread
    ///
    /// The reaper must run after the stack switch; the outgoing thread's
    /// stacks are freed by it.
    ///
    /// # Safety
    ///
    /// As for [`restore_context`](Self::restore_context).
    unsafe fn restore_context_and_reap(&self, context: *const SavedContext, reaper: Reaper<'_>);

    /// Copy `state` onto `kernel_stack` and return through it to user mode
    ///
    /// # Safety
    ///
    /// `kernel_stack` must be the top of the incoming thread's kernel stack.
    unsafe fn restore_syscall_state(&self, state: &SyscallState, kernel_stack: VAddr, handoff: LockToken);

    /// Start executing `entry(arg)` in kernel mode on `stack`
    ///
    /// # Safety
    ///
    /// `stack` must be a valid kernel stack top.
    unsafe fn jump_kernel(&self, handoff: Option<LockToken>, entry: VAddr, stack: VAddr, arg: usize);

    /// Drop to user mode at `entry(arg0, arg1)` on `stack`
    ///
    /// # Safety
    ///
    /// `stack` must be mapped user-accessible in the active address space.
    unsafe fn jump_user(&self, handoff: Option<LockToken>, entry: VAddr, stack: VAddr, arg0: usize, arg1: usize);

    /// Call a kernel-mode event handler with its serialized event buffer
    ///
    /// # Safety
    ///
    /// `handler` must be the address of a kernel function taking one
    /// address-sized argument.
    unsafe fn call_kernel_handler(&self, handler: VAddr, buffer: VAddr);
}

/// Everything the scheduler needs from the platform
pub trait Machine: ArchInterrupts + ArchCpu + ArchThreadContext + Send + Sync {
    /// View as the interrupt controller used by spinlocks
    fn interrupts(&self) -> &dyn ArchInterrupts;
}

impl<T> Machine for T
where
    T: ArchInterrupts + ArchCpu + ArchThreadContext + Send + Sync,
{
    fn interrupts(&self) -> &dyn ArchInterrupts {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_layout() {
        let word = core::mem::size_of::<usize>();
        assert_eq!(CONTEXT_SP_OFFSET, 0);
        assert_eq!(CONTEXT_IP_OFFSET, word);
        assert_eq!(CONTEXT_FLAGS_OFFSET, 2 * word);
        assert_eq!(CONTEXT_ARG_OFFSET, 3 * word);
        assert_eq!(CONTEXT_CALLEE_OFFSET, 4 * word);
        assert_eq!(
            core::mem::size_of::<SavedContext>(),
            (4 + CALLEE_SAVED_REGS) * word
        );
    }

    #[test]
    fn test_syscall_layout() {
        let word = core::mem::size_of::<usize>();
        assert_eq!(SYSCALL_IP_OFFSET, 0);
        assert_eq!(SYSCALL_SP_OFFSET, word);
        assert_eq!(SYSCALL_RESULT_OFFSET, 3 * word);
    }
}
