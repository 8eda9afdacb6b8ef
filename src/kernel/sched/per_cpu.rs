// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Per-Processor Scheduler
//!
//! One instance per CPU. It owns the CPU's scheduling algorithm, its idle
//! thread and its inbound transfer queue, and performs every context
//! switch on that CPU.
//!
//! # Switch protocol
//!
//! ```text
//! 1. interrupts off, remember previous state
//! 2. lock current, pick next (algorithm returns it locked, or idle)
//! 3. statuses: current -> requested, next -> Running
//! 4. kernel stack, address space, TLS, time accounting -> next
//! 5. release the caller's lock raw (interrupts stay off)
//! 6. release next's lock
//! 7. save current:  Resumed   -> restore interrupts, deliver events
//!                   JustSaved -> restore next, handing it current's lock
//! ```
//!
//! The outgoing thread's scheduler lock is held until its registers are
//! saved; the restore primitive releases it from the incoming side.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use core::sync::atomic::{AtomicU64, Ordering};

use super::algorithm::SchedulingAlgorithm;
use super::placement::{NewThreadData, TransferQueue};
use crate::kernel::arch::{
    ArchCpu, ArchInterrupts, ArchThreadContext, InterruptState, SaveOutcome, SyscallState,
};
use crate::kernel::config::{DEFAULT_PRIORITY, EVENT_LIMIT, EVENT_TID_MAX, MAX_NESTED_EVENTS};
use crate::kernel::context::{KernelContext, Reaper};
use crate::kernel::process::PID_KERNEL;
use crate::kernel::sync::{HeldLock, IrqSpinlock};
use crate::kernel::thread::{LockToken, Thread, ThreadStatus, UnwindState};
use crate::kernel::vm::MappingFlags;
use crate::rustux::errors::Result;
use crate::rustux::types::*;

use crate::{fatal, log_debug, log_error, log_info, log_trace, log_warn};

/// Scheduler of one CPU
pub struct PerProcessorScheduler {
    cpu: CpuId,
    algorithm: Box<dyn SchedulingAlgorithm>,
    current: IrqSpinlock<Option<Arc<Thread>>>,
    idle: IrqSpinlock<Option<Arc<Thread>>>,
    transfers: TransferQueue,
    ticks: AtomicU64,
}

impl PerProcessorScheduler {
    pub fn new(cpu: CpuId, algorithm: Box<dyn SchedulingAlgorithm>) -> Self {
        Self {
            cpu,
            algorithm,
            current: IrqSpinlock::new(None),
            idle: IrqSpinlock::new(None),
            transfers: TransferQueue::new(),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn cpu_id(&self) -> CpuId {
        self.cpu
    }

    /// Thread running on this CPU
    pub fn current_thread(&self, irq: &dyn ArchInterrupts) -> Option<Arc<Thread>> {
        self.current.lock(irq).clone()
    }

    pub fn idle_thread(&self, irq: &dyn ArchInterrupts) -> Option<Arc<Thread>> {
        self.idle.lock(irq).clone()
    }

    pub fn algorithm(&self) -> &dyn SchedulingAlgorithm {
        self.algorithm.as_ref()
    }

    /// Inbound cross-CPU thread transfers
    pub fn transfers(&self) -> &TransferQueue {
        &self.transfers
    }

    /// Timer ticks seen so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn is_idle(&self, thread: &Arc<Thread>, irq: &dyn ArchInterrupts) -> bool {
        self.idle
            .lock(irq)
            .as_ref()
            .map_or(false, |idle| Arc::ptr_eq(idle, thread))
    }

    /// The idle thread keeps its status and never enters the algorithm's
    /// queues.
    fn set_status(&self, kernel: &KernelContext, thread: &Arc<Thread>, status: ThreadStatus) {
        if !self.is_idle(thread, kernel.irq()) {
            thread.set_status(kernel, status);
        }
    }

    /// ========================================================================
    /// Setup
    /// ========================================================================

    /// Bring the scheduler up with `boot` as the running thread
    ///
    /// Registers the scheduler tick and, if configured, creates the pump
    /// thread that starts threads transferred from other CPUs.
    pub fn initialise(&self, kernel: &KernelContext, boot: Arc<Thread>) -> Result {
        boot.set_cpu_id(self.cpu);
        boot.set_status_quiet(ThreadStatus::Running);
        self.algorithm.add_thread(boot.clone(), kernel.irq());
        self.switch_to(kernel, None, &boot);

        kernel.machine().register_scheduler_tick(self.cpu);

        if kernel.config().transfer_pump {
            let pump = kernel.create_thread(PID_KERNEL, DEFAULT_PRIORITY, self.cpu)?;
            let context = pump.context_ptr();
            // SAFETY: the pump has never run, so nothing else uses its
            // context; the KernelContext outlives every thread.
            unsafe {
                kernel.machine().init_context(
                    &mut *context,
                    transfer_pump_entry as usize,
                    pump.kernel_stack_top(),
                    kernel as *const KernelContext as usize,
                );
            }
            pump.set_status(kernel, ThreadStatus::Ready);
            log_debug!("cpu {}: transfer pump is thread {}", self.cpu, pump.id());
        }

        log_info!("cpu {}: scheduler online, boot thread {}", self.cpu, boot.id());
        Ok(())
    }

    /// Run `thread` whenever nothing else is runnable
    pub fn set_idle(&self, thread: Arc<Thread>, irq: &dyn ArchInterrupts) {
        thread.set_cpu_id(self.cpu);
        self.algorithm.remove_thread(&thread, irq);
        *self.idle.lock(irq) = Some(thread);
    }

    /// ========================================================================
    /// Algorithm Plumbing
    /// ========================================================================

    pub fn remove_thread(&self, thread: &Thread, irq: &dyn ArchInterrupts) {
        self.algorithm.remove_thread(thread, irq);
    }

    pub fn thread_status_changed(&self, thread: &Arc<Thread>, irq: &dyn ArchInterrupts) {
        if !self.is_idle(thread, irq) {
            self.algorithm.thread_status_changed(thread, irq);
        }
    }

    /// ========================================================================
    /// Context Switching
    /// ========================================================================

    /// Publish `next` as current and load its machine state
    fn switch_to(&self, kernel: &KernelContext, prev: Option<&Arc<Thread>>, next: &Arc<Thread>) {
        let machine = kernel.machine();
        let processes = kernel.processes();

        *self.current.lock(kernel.irq()) = Some(next.clone());

        machine.set_kernel_stack(next.kernel_stack_top());
        machine.switch_address_space(processes.address_space(next.parent()));
        machine.set_tls_base(next.tls_base(kernel));

        if let Some(prev) = prev {
            processes.record_time(prev.parent());
        }
        processes.track_time(next.parent());
    }

    /// Leave `schedule()` without switching
    fn finish_without_switch(&self, kernel: &KernelContext, mut was_interrupts: bool, lock: Option<HeldLock<'_>>) {
        if let Some(held) = lock {
            was_interrupts |= held.release_in_switch();
        }
        kernel.machine().set_interrupts(was_interrupts);
    }

    /// Work done on a thread that was just switched into
    fn after_switch(&self, kernel: &KernelContext, was_interrupts: bool) {
        kernel.machine().set_interrupts(was_interrupts);
        self.check_event_state(kernel, 0);
    }

    /// Give up the CPU
    ///
    /// The current thread moves to `next_status` and `new_thread` (or the
    /// algorithm's choice, or the idle thread) runs instead. With
    /// `next_status == Ready` and nothing else runnable this is a no-op.
    /// `lock` is released once the switch can no longer be interrupted.
    pub fn schedule(
        &self,
        kernel: &KernelContext,
        next_status: ThreadStatus,
        new_thread: Option<Arc<Thread>>,
        lock: Option<HeldLock<'_>>,
    ) {
        let machine = kernel.machine();
        let irq = kernel.irq();

        let mut was_interrupts = machine.interrupts_enabled();
        machine.set_interrupts(false);

        let Some(current) = self.current_thread(irq) else {
            fatal!("schedule: cpu {} has no current thread", self.cpu);
        };

        if let Some(forced) = &new_thread {
            if Arc::ptr_eq(forced, &current) {
                log_warn!("schedule: thread {} asked to switch to itself", current.id());
                self.finish_without_switch(kernel, was_interrupts, lock);
                return;
            }
        }

        let current_token = current.lock_for_switch(irq);

        let next_token = match new_thread {
            Some(thread) => {
                if let Some(held) = &lock {
                    if held.is(thread.scheduler_lock()) {
                        fatal!("schedule: lock passed in is thread {}'s scheduler lock", thread.id());
                    }
                }
                thread.lock_for_switch(irq)
            }
            None => match self.algorithm.get_next(&current, irq) {
                Some(token) => token,
                None if next_status == ThreadStatus::Ready => {
                    current_token.release(irq);
                    self.finish_without_switch(kernel, was_interrupts, lock);
                    return;
                }
                None => match self.idle_thread(irq) {
                    Some(idle) if !Arc::ptr_eq(&idle, &current) => idle.lock_for_switch(irq),
                    _ => fatal!("schedule: cpu {} has no thread to run", self.cpu),
                },
            },
        };

        let next = next_token.thread().clone();

        log_trace!("cpu {}: switch {} -> {}", self.cpu, current.id(), next.id());

        self.set_status(kernel, &current, next_status);
        self.set_status(kernel, &next, ThreadStatus::Running);
        self.switch_to(kernel, Some(&current), &next);

        if let Some(held) = lock {
            was_interrupts |= held.release_in_switch();
        }

        let next_context = next.context_ptr();
        drop(next);
        next_token.release_after_switch();

        // SAFETY: interrupts are off and current's scheduler lock is held,
        // so nothing else touches either context until the switch is done.
        match unsafe { machine.save_context(current.context_ptr()) } {
            SaveOutcome::Resumed => current_token.discard_after_resume(),
            SaveOutcome::JustSaved => unsafe {
                machine.restore_context(next_context, Some(current_token));
            },
        }

        self.after_switch(kernel, was_interrupts);
    }

    /// Put the current thread to sleep
    ///
    /// Pending events are delivered first so they are not lost. `lock`
    /// is released atomically with going to sleep.
    pub fn sleep(&self, kernel: &KernelContext, lock: Option<HeldLock<'_>>) {
        if let Some(current) = self.current_thread(kernel.irq()) {
            current.clear_interrupted();
        }
        self.check_event_state(kernel, 0);
        self.schedule(kernel, ThreadStatus::Sleeping, None, lock);
    }

    /// Periodic scheduler tick
    pub fn timer(&self, kernel: &KernelContext, _delta: Nanoseconds, _state: &InterruptState) {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % kernel.config().ticks_per_reschedule.max(1) != 0 {
            return;
        }

        self.schedule(kernel, ThreadStatus::Ready, None, None);

        if let Some(current) = self.current_thread(kernel.irq()) {
            if current.unwind_state() == UnwindState::Exit {
                log_debug!("thread {}: exit requested, leaving process {}", current.id(), current.parent());
                kernel.processes().exit(current.parent(), 0);
            }
        }
    }

    /// ========================================================================
    /// Thread Start
    /// ========================================================================

    /// Start a new thread on this CPU
    ///
    /// `new` is the new thread's held scheduler lock. Called from another
    /// CPU, the thread is queued for this CPU's pump thread instead.
    /// Otherwise the caller becomes `Ready` and the new thread starts
    /// immediately at `entry(param)` on `stack` (its kernel stack if 0).
    pub fn add_thread(
        &self,
        kernel: &KernelContext,
        new: LockToken,
        entry: VAddr,
        param: usize,
        user_mode: bool,
        stack: VAddr,
    ) {
        let machine = kernel.machine();
        let irq = kernel.irq();

        if machine.cpu_id() != self.cpu {
            let thread = new.thread().clone();
            thread.set_cpu_id(self.cpu);
            new.release(irq);
            log_debug!("cpu {}: thread {} queued for cpu {}", machine.cpu_id(), thread.id(), self.cpu);
            self.transfers.push(
                kernel,
                NewThreadData { thread, entry, param, user_mode, stack },
            );
            return;
        }

        let mut was_interrupts = machine.interrupts_enabled();
        machine.set_interrupts(false);

        let (current, current_token) = self.prepare_start(kernel, &new);
        let thread = new.thread().clone();
        was_interrupts |= new.release_in_switch();

        let stack = if stack == 0 && !user_mode { thread.kernel_stack_top() } else { stack };
        drop(thread);

        // SAFETY: interrupts are off and current's scheduler lock is held.
        match unsafe { machine.save_context(current.context_ptr()) } {
            SaveOutcome::Resumed => current_token.discard_after_resume(),
            SaveOutcome::JustSaved => unsafe {
                if user_mode {
                    machine.jump_user(Some(current_token), entry, stack, param, 0);
                } else {
                    machine.jump_kernel(Some(current_token), entry, stack, param);
                }
            },
        }

        if was_interrupts {
            machine.set_interrupts(true);
        }
    }

    /// Start a new thread by returning from a syscall with `state`
    ///
    /// Used for fork-like resumption. Must be called on this CPU.
    pub fn add_thread_resumed(&self, kernel: &KernelContext, new: LockToken, state: &SyscallState) {
        let machine = kernel.machine();
        if machine.cpu_id() != self.cpu {
            fatal!("addThread: resumed start of thread {} from cpu {} on cpu {}",
                new.thread().id(), machine.cpu_id(), self.cpu);
        }

        let mut was_interrupts = machine.interrupts_enabled();
        machine.set_interrupts(false);

        let (current, current_token) = self.prepare_start(kernel, &new);
        let kernel_stack = new.thread().kernel_stack_top();
        was_interrupts |= new.release_in_switch();

        // SAFETY: interrupts are off and current's scheduler lock is held.
        match unsafe { machine.save_context(current.context_ptr()) } {
            SaveOutcome::Resumed => current_token.discard_after_resume(),
            SaveOutcome::JustSaved => unsafe {
                machine.restore_syscall_state(state, kernel_stack, current_token);
            },
        }

        if was_interrupts {
            machine.set_interrupts(true);
        }
    }

    /// Common part of both add paths: demote current, promote `new`
    fn prepare_start(&self, kernel: &KernelContext, new: &LockToken) -> (Arc<Thread>, LockToken) {
        let Some(current) = self.current_thread(kernel.irq()) else {
            fatal!("addThread: cpu {} has no current thread", self.cpu);
        };
        let thread = new.thread();
        thread.set_cpu_id(self.cpu);

        let current_token = current.lock_for_switch(kernel.irq());

        self.algorithm.add_thread(thread.clone(), kernel.irq());
        self.set_status(kernel, &current, ThreadStatus::Ready);
        thread.set_status(kernel, ThreadStatus::Running);
        self.switch_to(kernel, Some(&current), thread);

        log_debug!("cpu {}: started thread {}", self.cpu, thread.id());
        (current, current_token)
    }

    /// Wait for one transferred thread and start it
    pub fn service_transfer(&self, kernel: &KernelContext) {
        if let Some(data) = self.transfers.pop(kernel) {
            self.start_transferred(kernel, data);
        }
    }

    /// Start one transferred thread if any is queued
    pub fn try_service_transfer(&self, kernel: &KernelContext) -> bool {
        match self.transfers.try_pop(kernel) {
            Some(data) => {
                self.start_transferred(kernel, data);
                true
            }
            None => false,
        }
    }

    fn start_transferred(&self, kernel: &KernelContext, data: NewThreadData) {
        let token = data.thread.lock_for_switch(kernel.irq());
        self.add_thread(kernel, token, data.entry, data.param, data.user_mode, data.stack);
    }

    /// ========================================================================
    /// Thread Exit
    /// ========================================================================

    /// Terminate the running thread and switch away for good
    ///
    /// A thread that was detached when it shut down is destroyed once the
    /// CPU is off its stack; any other thread is left `AwaitingJoin`, and
    /// its scheduler lock is only released after the switch, which keeps
    /// `join()` and `detach()` from freeing it early.
    pub fn kill_current_thread(&self, kernel: &KernelContext) {
        let machine = kernel.machine();
        let irq = kernel.irq();

        let Some(thread) = self.current_thread(irq) else {
            fatal!("killCurrentThread: cpu {} has no current thread", self.cpu);
        };
        if self.is_idle(&thread, irq) {
            fatal!("killCurrentThread: cpu {} tried to kill its idle thread", self.cpu);
        }

        machine.set_interrupts(false);
        let token = thread.lock_for_switch(irq);
        thread.shutdown(kernel);
        let detached = thread.reaps_itself();
        self.algorithm.remove_thread(&thread, irq);

        let next_token = match self.algorithm.get_next(&thread, irq) {
            Some(next) => next,
            None => match self.idle_thread(irq) {
                Some(idle) => idle.lock_for_switch(irq),
                None => fatal!("killCurrentThread: cpu {} has no thread to run", self.cpu),
            },
        };
        let next = next_token.thread().clone();

        if detached {
            thread.set_status(kernel, ThreadStatus::Zombie);
        }
        self.set_status(kernel, &next, ThreadStatus::Running);
        self.switch_to(kernel, Some(&thread), &next);

        log_debug!("cpu {}: thread {} exits, {} runs", self.cpu, thread.id(), next.id());

        let next_context = next.context_ptr();
        drop(next);
        drop(thread);
        next_token.release_after_switch();

        // SAFETY: interrupts are off and the dying thread's lock is held;
        // its stack is only freed by the reaper after the switch.
        unsafe {
            if detached {
                machine.restore_context_and_reap(next_context, Reaper::new(kernel, token.into_reaped()));
            } else {
                machine.restore_context(next_context, Some(token));
            }
        }
    }

    /// ========================================================================
    /// Event Delivery
    /// ========================================================================

    /// Deliver the current thread's next pending event, if any
    ///
    /// The handler runs on a new state level. Kernel-mode handlers are
    /// called directly and the level popped afterwards; user-mode
    /// handlers are entered through the trampoline on an event stack and
    /// come back through [`event_handler_returned`].
    ///
    /// [`event_handler_returned`]: Self::event_handler_returned
    pub fn check_event_state(&self, kernel: &KernelContext, user_stack: VAddr) {
        let machine = kernel.machine();
        let memory = kernel.memory();
        let config = kernel.config();

        let was_interrupts = machine.interrupts_enabled();
        machine.set_interrupts(false);

        let Some(thread) = self.current_thread(kernel.irq()) else {
            machine.set_interrupts(was_interrupts);
            return;
        };
        let Some(event) = thread.get_next_event() else {
            machine.set_interrupts(was_interrupts);
            return;
        };

        let number = event.number();
        let handler = event.event().handler_address();
        let aspace = kernel.processes().address_space(thread.parent());

        let Some((_, flags)) = memory.mapping(aspace, handler) else {
            log_error!("checkEventState: handler {:#x} for event {} is not mapped, dropped", handler, number);
            machine.set_interrupts(was_interrupts);
            return;
        };
        if thread.id() > EVENT_TID_MAX {
            log_error!("checkEventState: thread {} is above the event tid limit, event {} dropped", thread.id(), number);
            machine.set_interrupts(was_interrupts);
            return;
        }
        if thread.state_level() + 1 >= MAX_NESTED_EVENTS {
            log_warn!("checkEventState: thread {} is at max nesting, event {} deferred", thread.id(), number);
            thread.requeue_event(event);
            machine.set_interrupts(was_interrupts);
            return;
        }
        let kernel_mode = flags.contains(MappingFlags::KERNEL_MODE);

        let saved = thread.push_state(kernel);
        let level = thread.state_level();

        let stack = if kernel_mode {
            0
        } else {
            match thread.event_stack_top(kernel, user_stack) {
                Some(top) => top,
                None => {
                    log_error!("checkEventState: no event stack for thread {}", thread.id());
                    thread.pop_state(kernel);
                    thread.requeue_event(event);
                    machine.set_interrupts(was_interrupts);
                    return;
                }
            }
        };

        let buffer = config.event_buffer_for(thread.id(), level);
        if !memory.is_mapped(aspace, buffer) {
            let Some(page) = memory.allocate_page() else {
                fatal!("checkEventState: out of memory for event buffer");
            };
            let mut buffer_flags = MappingFlags::WRITE;
            if kernel_mode {
                buffer_flags |= MappingFlags::KERNEL_MODE;
            }
            if let Err(err) = memory.map(aspace, buffer, page, buffer_flags) {
                fatal!("checkEventState: cannot map event buffer {:#x}: {}", buffer, err);
            }
        }

        {
            let mut bytes = vec![0u8; EVENT_LIMIT];
            let len = event.event().serialize(&mut bytes);
            if let Err(err) = memory.write_bytes(aspace, buffer, &bytes[..len]) {
                log_error!("checkEventState: cannot write event {}: {}", number, err);
            }
        }

        // Owned events are done with once serialized.
        drop(event);

        log_trace!("thread {}: event {} -> {:#x} at level {}", thread.id(), number, handler, level);

        if kernel_mode {
            // SAFETY: the handler is mapped kernel-mode in this address space.
            unsafe {
                machine.call_kernel_handler(handler, buffer);
            }
            thread.pop_state(kernel);
            machine.set_interrupts(was_interrupts);
            return;
        }

        // Nothing owned may be live across the save.
        drop(thread);

        // SAFETY: `saved` is the previous level's context of the running
        // thread and interrupts are off.
        match unsafe { machine.save_context(saved) } {
            SaveOutcome::Resumed => machine.set_interrupts(was_interrupts),
            SaveOutcome::JustSaved => unsafe {
                machine.jump_user(None, config.event_trampoline(), stack, handler, buffer);
            },
        }
    }

    /// A user-mode event handler finished
    ///
    /// Pops its state level and resumes the interrupted context, unless
    /// the thread has been asked to exit.
    pub fn event_handler_returned(&self, kernel: &KernelContext) {
        let machine = kernel.machine();
        machine.set_interrupts(false);

        let Some(thread) = self.current_thread(kernel.irq()) else {
            fatal!("eventHandlerReturned: cpu {} has no current thread", self.cpu);
        };

        let blocking = thread.blocking_thread();
        thread.pop_state(kernel);

        match thread.unwind_state() {
            UnwindState::Exit => {
                log_debug!("thread {}: unwinding to exit", thread.id());
                kernel.processes().exit(thread.parent(), 0);
                return;
            }
            UnwindState::ReleaseBlockingThread => {
                if let Some(blocking) = &blocking {
                    blocking.set_unwind_state(UnwindState::ReleaseBlockingThread);
                    blocking.wake(kernel);
                }
                thread.set_unwind_state(UnwindState::Continue);
            }
            UnwindState::Continue => {}
        }

        let context = thread.context_ptr();
        drop(blocking);
        drop(thread);
        // SAFETY: the popped-to level's context was saved when the handler
        // was entered.
        unsafe {
            machine.restore_context(context, None);
        }
    }
}

/// Entry point of each CPU's transfer pump thread
///
/// `kernel` is the address of the [`KernelContext`].
pub extern "C" fn transfer_pump_entry(kernel: usize) -> ! {
    // SAFETY: initialise() passes the context's address, and the context
    // outlives every thread it runs.
    let kernel = unsafe { &*(kernel as *const KernelContext) };
    loop {
        kernel.current_scheduler().service_transfer(kernel);
    }
}
