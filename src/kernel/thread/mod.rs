// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Management
//!
//! Threads are the unit of scheduling. Each belongs to one process
//! (referenced by id), lives on one home CPU, and carries a stack of
//! state levels on which asynchronous events are delivered.
//!
//! # Design
//!
//! - The [`KernelContext`] thread table owns every thread; run queues and
//!   the per-CPU current slot hold further `Arc`s, waiters and blocking
//!   threads are `Weak`
//! - The scheduler lock serializes status changes and is handed from the
//!   outgoing to the incoming side of a context switch as a [`LockToken`]
//! - The lifecycle (concurrency) lock guards join/detach bookkeeping
//!
//! # Thread States
//!
//! ```text
//!            +--------- sendEvent / wake ----------+
//!            v                                     |
//! Ready -> Running -> Sleeping --------------------+
//!   ^        |  |
//!   +--------+  +--> AwaitingJoin --join()--> destroyed
//!   schedule    |
//!               +--> (detached) Zombie --reaper--> destroyed
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! // Deliver a signal, waking the thread if it sleeps
//! thread.send_event(kernel, EventHandle::Owned(Box::new(SignalEvent::new(SIGINT, handler))));
//!
//! // Wait for a thread to finish and free it
//! if !thread.join(kernel) {
//!     log_warn!("thread {} cannot be joined", thread.id());
//! }
//! ```

pub mod event;
pub mod request;
pub mod state_level;

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::kernel::arch::{ArchCpu, ArchInterrupts, SavedContext};
use crate::kernel::config::MAX_PRIORITIES;
use crate::kernel::context::KernelContext;
use crate::kernel::process::ProcessId;
use crate::kernel::sync::spin::{IrqSpinlock, RawSpinlock};
use crate::kernel::vm::{MappingFlags, StackHandle, page_align_down};
use crate::rustux::types::*;

use event::{Event, EventHandle, EventQueue};
use request::{AsyncRequest, PendingRequest, RequestQueue};
use state_level::StateLevelStack;

use crate::{log_debug, log_error, log_trace};

/// ============================================================================
/// Thread Status
/// ============================================================================

/// Scheduling status of a thread
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Runnable, waiting for a CPU
    Ready = 0,

    /// Executing on its home CPU
    Running = 1,

    /// Blocked until woken
    Sleeping = 2,

    /// Finished; announced to the owning process
    Zombie = 3,

    /// Finished; waiting for join()
    AwaitingJoin = 4,

    /// Not eligible for scheduling
    Suspended = 5,
}

impl ThreadStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Sleeping,
            3 => Self::Zombie,
            4 => Self::AwaitingJoin,
            _ => Self::Suspended,
        }
    }

    /// Check if thread can be scheduled
    pub const fn is_schedulable(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    /// Check if thread has finished running
    pub const fn has_exited(self) -> bool {
        matches!(self, Self::Zombie | Self::AwaitingJoin)
    }
}

/// Termination request travelling down nested event handlers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindState {
    /// Keep running normally
    Continue = 0,

    /// Release the thread this level is blocking, then continue
    ReleaseBlockingThread = 1,

    /// Terminate instead of resuming
    Exit = 2,
}

impl UnwindState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ReleaseBlockingThread,
            2 => Self::Exit,
            _ => Self::Continue,
        }
    }
}

/// ============================================================================
/// Scheduler Lock Token
/// ============================================================================

/// Proof that a thread's scheduler lock is held
///
/// Tokens cross context switches: the outgoing thread's token is given to
/// the machine's restore primitive, which releases it once the outgoing
/// registers are saved and the old stack is no longer in use. Every token
/// must be consumed by exactly one of the methods below; dropping one
/// leaves the lock held and logs an error.
#[must_use = "a scheduler lock token must be released or handed to a context switch"]
pub struct LockToken {
    thread: ManuallyDrop<Arc<Thread>>,
}

impl LockToken {
    fn into_thread(self) -> Arc<Thread> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is moved out exactly once.
        unsafe { ManuallyDrop::take(&mut this.thread) }
    }

    /// Thread whose lock this is
    pub fn thread(&self) -> &Arc<Thread> {
        &self.thread
    }

    /// Release after the owning thread's state was saved
    ///
    /// Interrupts are left as they are.
    pub fn release_after_switch(self) {
        let thread = self.into_thread();
        // SAFETY: the token proves the lock is held.
        unsafe {
            thread.sched_lock.release_raw();
        }
    }

    /// Release mid-switch, returning the interrupt state recorded when
    /// the lock was taken
    pub fn release_in_switch(self) -> bool {
        let thread = self.into_thread();
        // SAFETY: the token proves the lock is held.
        unsafe { thread.sched_lock.release_raw() }
    }

    /// Release outside a switch, restoring interrupts
    pub fn release(self, irq: &dyn ArchInterrupts) {
        let thread = self.into_thread();
        thread.sched_lock.release(irq);
    }

    /// Give up the thread for destruction with its lock still held
    pub fn into_reaped(self) -> Arc<Thread> {
        self.into_thread()
    }

    /// Forget the stale copy of a token that was consumed before this
    /// thread was switched out
    ///
    /// When `save_context` reports `Resumed`, the token living in the
    /// resumed stack frame was already handed to a restore primitive on
    /// the path that switched this thread out.
    pub fn discard_after_resume(self) {
        core::mem::forget(self);
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        log_error!(
            "scheduler lock of thread {} dropped without hand-off",
            self.thread.id()
        );
        // SAFETY: drop runs once; the lock itself stays held.
        unsafe { ManuallyDrop::drop(&mut self.thread) }
    }
}

impl core::fmt::Debug for LockToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LockToken").field("thread", &self.thread.id()).finish()
    }
}

/// ============================================================================
/// Thread
/// ============================================================================

/// Join bookkeeping, guarded by the concurrency lock
#[derive(Debug, Default)]
struct Lifecycle {
    waiter: Weak<Thread>,
}

#[derive(Debug, Clone, Copy)]
struct TlsPage {
    vaddr: VAddr,
    page: PAddr,
}

/// A schedulable thread
pub struct Thread {
    id: Tid,
    parent: ProcessId,
    cpu: AtomicU32,
    status: AtomicU8,
    priority: AtomicUsize,
    unwind: AtomicU8,
    interrupted: AtomicBool,
    shut_down: AtomicBool,
    /// Written only under the concurrency lock
    detached: AtomicBool,
    /// Whether the thread was detached when it shut down
    reaps_itself: AtomicBool,

    /// Scheduler lock
    sched_lock: RawSpinlock,

    /// Concurrency lock
    lifecycle: IrqSpinlock<Lifecycle>,

    levels: spin::Mutex<StateLevelStack>,
    events: spin::Mutex<EventQueue>,
    requests: spin::Mutex<Vec<PendingRequest>>,
    tls: spin::Mutex<Option<TlsPage>>,
}

impl Thread {
    /// Create a thread homed on `cpu`
    ///
    /// The thread starts out `Ready` but is not known to any scheduler
    /// until it is added to one.
    pub fn new(
        id: Tid,
        parent: ProcessId,
        cpu: CpuId,
        priority: usize,
        kernel_stack: Option<StackHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            parent,
            cpu: AtomicU32::new(cpu),
            status: AtomicU8::new(ThreadStatus::Ready as u8),
            priority: AtomicUsize::new(priority.min(MAX_PRIORITIES - 1)),
            unwind: AtomicU8::new(UnwindState::Continue as u8),
            interrupted: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            reaps_itself: AtomicBool::new(false),
            sched_lock: RawSpinlock::new(),
            lifecycle: IrqSpinlock::new(Lifecycle::default()),
            levels: spin::Mutex::new(StateLevelStack::new(kernel_stack)),
            events: spin::Mutex::new(EventQueue::new()),
            requests: spin::Mutex::new(Vec::new()),
            tls: spin::Mutex::new(None),
        })
    }

    pub fn id(&self) -> Tid {
        self.id
    }

    /// Owning process
    pub fn parent(&self) -> ProcessId {
        self.parent
    }

    /// Home CPU
    pub fn cpu_id(&self) -> CpuId {
        self.cpu.load(Ordering::Acquire)
    }

    pub(crate) fn set_cpu_id(&self, cpu: CpuId) {
        self.cpu.store(cpu, Ordering::Release);
    }

    pub fn status(&self) -> ThreadStatus {
        ThreadStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Change status and tell the home scheduler
    ///
    /// `Zombie` additionally notifies the owning process's waiters.
    pub fn set_status(self: &Arc<Self>, kernel: &KernelContext, status: ThreadStatus) {
        self.set_status_quiet(status);

        match kernel.scheduler(self.cpu_id()) {
            Some(scheduler) => scheduler.thread_status_changed(self, kernel.irq()),
            None => log_error!("thread {}: home cpu {} has no scheduler", self.id, self.cpu_id()),
        }

        if status == ThreadStatus::Zombie {
            kernel.processes().notify_waiters(self.parent);
        }
    }

    /// Change status without involving the scheduling algorithm
    pub(crate) fn set_status_quiet(&self, status: ThreadStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn priority(&self) -> usize {
        self.priority.load(Ordering::Relaxed)
    }

    /// Set priority; takes effect the next time the thread is queued
    pub fn set_priority(&self, priority: usize) {
        self.priority.store(priority.min(MAX_PRIORITIES - 1), Ordering::Relaxed);
    }

    pub fn unwind_state(&self) -> UnwindState {
        UnwindState::from_u8(self.unwind.load(Ordering::Acquire))
    }

    pub fn set_unwind_state(&self, state: UnwindState) {
        self.unwind.store(state as u8, Ordering::Release);
    }

    /// Whether an event woke the thread from its last sleep
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub(crate) fn clear_interrupted(&self) {
        self.interrupted.store(false, Ordering::Release);
    }

    /// Take the scheduler lock for a context switch
    pub fn lock_for_switch(self: &Arc<Self>, irq: &dyn ArchInterrupts) -> LockToken {
        self.sched_lock.acquire(irq);
        LockToken { thread: ManuallyDrop::new(self.clone()) }
    }

    pub(crate) fn scheduler_lock(&self) -> &RawSpinlock {
        &self.sched_lock
    }

    /// Wake a sleeping thread
    ///
    /// Used by synchronization primitives built on [`sleep`]. Returns
    /// whether the thread was asleep.
    ///
    /// [`sleep`]: crate::kernel::sched::PerProcessorScheduler::sleep
    pub fn wake(self: &Arc<Self>, kernel: &KernelContext) -> bool {
        let irq = kernel.irq();
        self.sched_lock.acquire(irq);
        let asleep = self.status() == ThreadStatus::Sleeping;
        if asleep {
            self.set_status(kernel, ThreadStatus::Ready);
        }
        self.sched_lock.release(irq);
        asleep
    }

    /// ========================================================================
    /// State Levels
    /// ========================================================================

    /// Current nesting depth
    pub fn state_level(&self) -> usize {
        self.levels.lock().depth()
    }

    /// Enter a new state level
    ///
    /// Installs the new level's kernel stack and returns the previous
    /// level's context, which the caller saves the live registers into.
    pub fn push_state(&self, kernel: &KernelContext) -> *mut SavedContext {
        let (context, stack) = {
            let mut levels = self.levels.lock();
            let saved = levels.push(kernel.memory());
            (levels.context_ptr(saved), levels.kernel_stack_top())
        };
        kernel.machine().set_kernel_stack(stack);
        context
    }

    /// Leave the current state level
    pub fn pop_state(&self, kernel: &KernelContext) {
        let stack = {
            let mut levels = self.levels.lock();
            levels.pop();
            levels.kernel_stack_top()
        };
        kernel.machine().set_kernel_stack(stack);
    }

    /// Kernel stack of the current state level, 0 if it has none
    pub fn kernel_stack_top(&self) -> VAddr {
        self.levels.lock().kernel_stack_top()
    }

    /// Switch the CPU onto the current level's auxiliary stack
    pub fn use_auxiliary_stack(&self, kernel: &KernelContext) -> Option<VAddr> {
        let top = self.levels.lock().auxiliary_stack_top(kernel.memory());
        match top {
            Some(top) => kernel.machine().set_kernel_stack(top),
            None => log_error!("thread {}: no auxiliary stack available", self.id),
        }
        top
    }

    /// Saved context of the current state level
    ///
    /// The pointer stays valid for the thread's lifetime. Only the CPU
    /// switching this thread may write through it.
    pub(crate) fn context_ptr(&self) -> *mut SavedContext {
        let mut levels = self.levels.lock();
        let current = levels.depth();
        levels.context_ptr(current)
    }

    /// Thread the current level is blocking, if it still exists
    pub fn blocking_thread(&self) -> Option<Arc<Thread>> {
        self.levels.lock().current().blocking_thread().upgrade()
    }

    pub fn set_blocking_thread(&self, thread: Option<&Arc<Thread>>) {
        let weak = thread.map_or_else(Weak::new, Arc::downgrade);
        self.levels.lock().current_mut().set_blocking_thread(weak);
    }

    /// User stack for an event handler at the current level
    ///
    /// A requested stack is used when it is mapped user-accessible;
    /// otherwise the level's own event stack, allocated on first use and
    /// replaced if it has been unmapped.
    pub(crate) fn event_stack_top(&self, kernel: &KernelContext, requested: VAddr) -> Option<VAddr> {
        let memory = kernel.memory();
        let aspace = kernel.processes().address_space(self.parent);
        let user_mapped = |top: VAddr| {
            top != 0
                && memory
                    .mapping(aspace, page_align_down(top - 1))
                    .map_or(false, |(_, flags)| !flags.contains(MappingFlags::KERNEL_MODE))
        };

        if user_mapped(requested) {
            return Some(requested);
        }

        let mut levels = self.levels.lock();
        let level = levels.current_mut();
        if let Some(stack) = level.event_stack() {
            if user_mapped(stack.top()) {
                return Some(stack.top());
            }
        }

        let stack = memory.allocate_user_stack(aspace)?;
        let top = stack.top();
        if let Some(stale) = level.replace_event_stack(stack) {
            memory.free_stack(stale);
        }
        Some(top)
    }

    /// ========================================================================
    /// Events
    /// ========================================================================

    /// Queue an event, waking the thread if it sleeps
    pub fn send_event(self: &Arc<Self>, kernel: &KernelContext, event: EventHandle) {
        let irq = kernel.irq();
        self.sched_lock.acquire(irq);

        log_trace!("thread {}: event {} queued", self.id, event.number());
        self.events.lock().push(event);

        if self.status() == ThreadStatus::Sleeping {
            self.interrupted.store(true, Ordering::Release);
            self.set_status(kernel, ThreadStatus::Ready);
        }

        self.sched_lock.release(irq);
    }

    /// Next event deliverable at the current state level
    pub fn get_next_event(&self) -> Option<EventHandle> {
        let (mask, level) = {
            let levels = self.levels.lock();
            (*levels.current().inhibit_mask(), levels.depth())
        };
        self.events.lock().next_deliverable(&mask, level)
    }

    /// Put an undeliverable event back at the end of the queue
    pub(crate) fn requeue_event(&self, event: EventHandle) {
        self.events.lock().push(event);
    }

    /// Inhibit or re-enable an event number at the current state level
    pub fn inhibit_event(&self, kernel: &KernelContext, number: usize, inhibit: bool) -> bool {
        let irq = kernel.irq();
        self.sched_lock.acquire(irq);
        let applied = self.levels.lock().current_mut().inhibit_mask_mut().set(number, inhibit);
        self.sched_lock.release(irq);

        if !applied {
            log_error!("thread {}: event {} cannot be inhibited", self.id, number);
        }
        applied
    }

    /// Remove all queued events with this number
    pub fn cull_event_number(&self, kernel: &KernelContext, number: usize) -> usize {
        let irq = kernel.irq();
        self.sched_lock.acquire(irq);
        let culled = self.events.lock().cull_number(number);
        self.sched_lock.release(irq);
        culled
    }

    /// Remove all queued references to a shared event
    pub fn cull_event(&self, kernel: &KernelContext, event: &Arc<dyn Event>) -> usize {
        let irq = kernel.irq();
        self.sched_lock.acquire(irq);
        let culled = self.events.lock().cull_event(event);
        self.sched_lock.release(irq);
        culled
    }

    pub fn pending_events(&self) -> usize {
        self.events.lock().len()
    }

    /// ========================================================================
    /// TLS
    /// ========================================================================

    /// Base of the thread's TLS page, mapping it on first use
    ///
    /// Returns 0 if no page could be set up.
    pub fn tls_base(&self, kernel: &KernelContext) -> VAddr {
        let mut tls = self.tls.lock();
        if let Some(page) = *tls {
            return page.vaddr;
        }

        let processes = kernel.processes();
        let memory = kernel.memory();

        let Some(vaddr) = processes.allocate_tls_range(self.parent) else {
            log_error!("thread {}: no TLS range in process {}", self.id, self.parent);
            return 0;
        };
        let Some(page) = memory.allocate_page() else {
            log_error!("thread {}: no memory for TLS", self.id);
            processes.free_tls_range(self.parent, vaddr);
            return 0;
        };
        let aspace = processes.address_space(self.parent);
        if let Err(err) = memory.map(aspace, vaddr, page, MappingFlags::WRITE) {
            log_error!("thread {}: cannot map TLS at {:#x}: {}", self.id, vaddr, err);
            memory.free_page(page);
            processes.free_tls_range(self.parent, vaddr);
            return 0;
        }

        *tls = Some(TlsPage { vaddr, page });
        vaddr
    }

    /// ========================================================================
    /// Pending Requests
    /// ========================================================================

    /// Remember an asynchronous request this thread waits on
    pub fn add_request(&self, queue: Arc<dyn RequestQueue>, request: &Arc<AsyncRequest>) {
        self.requests.lock().push(PendingRequest::new(queue, request));
    }

    /// Forget a request once its result was collected
    pub fn remove_request(&self, request: &Arc<AsyncRequest>) {
        self.requests.lock().retain(|pending| !pending.refers_to(request));
    }

    fn abandon_requests(&self) {
        let pending = core::mem::take(&mut *self.requests.lock());
        for request in &pending {
            request.abandon();
        }
    }

    /// ========================================================================
    /// Lifecycle
    /// ========================================================================

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Whether the exit path destroys the thread itself
    ///
    /// Fixed by [`shutdown`](Self::shutdown). A later `detach()` hands the
    /// destruction to the detaching thread instead.
    pub fn reaps_itself(&self) -> bool {
        self.reaps_itself.load(Ordering::Acquire)
    }

    /// Register `waiter` as the one thread joining this one
    ///
    /// Fails if the thread is detached or a different waiter is already
    /// registered.
    pub fn attach_waiter(&self, kernel: &KernelContext, waiter: &Arc<Thread>) -> bool {
        let mut lifecycle = self.lifecycle.lock(kernel.irq());
        self.try_attach(&mut lifecycle, waiter)
    }

    fn try_attach(&self, lifecycle: &mut Lifecycle, waiter: &Arc<Thread>) -> bool {
        if self.is_detached() {
            return false;
        }
        if let Some(current) = lifecycle.waiter.upgrade() {
            return Arc::ptr_eq(&current, waiter);
        }
        lifecycle.waiter = Arc::downgrade(waiter);
        true
    }

    /// Run down a thread that is about to terminate
    ///
    /// Settles pending requests, marks a joinable thread `AwaitingJoin`
    /// and wakes its waiter. Only the first call has any effect. The exit
    /// path calls this with the scheduler lock held, so whoever destroys
    /// the thread afterwards waits for the switch away from it.
    pub fn shutdown(self: &Arc<Self>, kernel: &KernelContext) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        log_debug!("thread {}: shutting down", self.id);

        self.abandon_requests();

        let waiter = {
            let lifecycle = self.lifecycle.lock(kernel.irq());
            let detached = self.is_detached();
            self.reaps_itself.store(detached, Ordering::Release);
            if !detached {
                self.set_status(kernel, ThreadStatus::AwaitingJoin);
            }
            lifecycle.waiter.upgrade()
        };

        if let Some(waiter) = waiter {
            waiter.wake(kernel);
        }
    }

    /// Wait for the thread to finish, then destroy it
    ///
    /// Fails if the thread is detached, already has a different waiter,
    /// is the caller itself, or the caller is interrupted while waiting.
    /// The destruction itself waits until the finished thread's CPU has
    /// switched off its stack.
    pub fn join(self: &Arc<Self>, kernel: &KernelContext) -> bool {
        let Some(caller) = kernel.current_thread() else {
            log_error!("join: no current thread");
            return false;
        };
        if Arc::ptr_eq(self, &caller) {
            return false;
        }

        let mut slept = false;
        loop {
            let mut lifecycle = self.lifecycle.lock(kernel.irq());
            if !self.try_attach(&mut lifecycle, &caller) {
                return false;
            }
            if self.status() == ThreadStatus::AwaitingJoin {
                break;
            }
            if caller.unwind_state() != UnwindState::Continue || (slept && caller.was_interrupted()) {
                lifecycle.waiter = Weak::new();
                return false;
            }

            kernel.current_scheduler().sleep(kernel, Some(lifecycle.into_held()));
            slept = true;
        }

        kernel.destroy_thread(self);
        true
    }

    /// Let the thread free itself when it finishes
    ///
    /// Fails while another thread is joining it. A thread that already
    /// finished as joinable is destroyed here, once its CPU has switched
    /// off its stack.
    pub fn detach(self: &Arc<Self>, kernel: &KernelContext) -> bool {
        let finished = {
            let lifecycle = self.lifecycle.lock(kernel.irq());
            if lifecycle.waiter.upgrade().is_some() {
                return false;
            }
            self.detached.store(true, Ordering::Release);
            self.status() == ThreadStatus::AwaitingJoin
        };

        if finished {
            kernel.destroy_thread(self);
        }
        true
    }

    /// Return every resource the thread owns
    pub(crate) fn release_resources(&self, kernel: &KernelContext) {
        let memory = kernel.memory();
        let processes = kernel.processes();

        for stack in self.levels.lock().take_stacks() {
            memory.free_stack(stack);
        }

        if let Some(tls) = self.tls.lock().take() {
            let aspace = processes.address_space(self.parent);
            memory.unmap(aspace, tls.vaddr);
            memory.free_page(tls.page);
            processes.free_tls_range(self.parent, tls.vaddr);
        }

        self.abandon_requests();
        self.events.lock().clear();
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("cpu", &self.cpu_id())
            .field("status", &self.status())
            .field("priority", &self.priority())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoIrq;

    impl ArchInterrupts for NoIrq {
        fn interrupts_enabled(&self) -> bool {
            false
        }

        fn set_interrupts(&self, _enabled: bool) {}
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ThreadStatus::Ready,
            ThreadStatus::Running,
            ThreadStatus::Sleeping,
            ThreadStatus::Zombie,
            ThreadStatus::AwaitingJoin,
            ThreadStatus::Suspended,
        ] {
            assert_eq!(ThreadStatus::from_u8(status as u8), status);
        }
        assert!(ThreadStatus::Running.is_schedulable());
        assert!(ThreadStatus::AwaitingJoin.has_exited());
        assert!(!ThreadStatus::Sleeping.is_schedulable());
    }

    #[test]
    fn test_priority_clamped() {
        let thread = Thread::new(1, 1, 0, 100, None);
        assert_eq!(thread.priority(), MAX_PRIORITIES - 1);
        thread.set_priority(2);
        assert_eq!(thread.priority(), 2);
    }

    #[test]
    fn test_lock_token_release() {
        let thread = Thread::new(1, 1, 0, 1, None);
        let token = thread.lock_for_switch(&NoIrq);
        assert!(thread.scheduler_lock().is_locked());
        assert_eq!(token.thread().id(), 1);
        token.release_after_switch();
        assert!(!thread.scheduler_lock().is_locked());
    }

    #[test]
    fn test_dropped_token_keeps_lock() {
        let thread = Thread::new(1, 1, 0, 1, None);
        drop(thread.lock_for_switch(&NoIrq));
        assert!(thread.scheduler_lock().is_locked());
        assert_eq!(Arc::strong_count(&thread), 1);
    }

    #[test]
    fn test_reaped_token_keeps_lock() {
        let thread = Thread::new(4, 1, 0, 1, None);
        let reaped = thread.lock_for_switch(&NoIrq).into_reaped();
        assert!(Arc::ptr_eq(&reaped, &thread));
        assert!(thread.scheduler_lock().is_locked());
    }

    #[test]
    fn test_unwind_state() {
        let thread = Thread::new(1, 1, 0, 1, None);
        assert_eq!(thread.unwind_state(), UnwindState::Continue);
        thread.set_unwind_state(UnwindState::Exit);
        assert_eq!(thread.unwind_state(), UnwindState::Exit);
    }
}
