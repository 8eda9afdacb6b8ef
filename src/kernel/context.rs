// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Context
//!
//! The [`KernelContext`] ties the scheduler to the rest of the kernel: the
//! machine, the memory manager, the process table, the placement policy,
//! one [`PerProcessorScheduler`] per CPU, and the table owning every
//! thread. Everything in this crate reaches its collaborators through it.
//!
//! # Usage
//!
//! ```rust,ignore
//! let kernel = KernelContext::new(config, machine, memory, processes, placement)?;
//!
//! // On each CPU, with that CPU's boot thread
//! let boot = kernel.create_thread(PID_KERNEL, DEFAULT_PRIORITY, cpu)?;
//! kernel.initialise_cpu(cpu, boot)?;
//!
//! // Start a user thread
//! let tid = kernel.spawn(pid, entry, arg, true, user_stack, DEFAULT_PRIORITY)?;
//! ```

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::kernel::arch::{ArchCpu, ArchInterrupts, InterruptState, Machine, SyscallState};
use crate::kernel::config::{event_window_fits, SchedConfig, SMP_MAX_CPUS};
use crate::kernel::process::{ProcessId, ProcessTable};
use crate::kernel::sched::{PerProcessorScheduler, ProcessorThreadAllocator, RoundRobin};
use crate::kernel::thread::Thread;
use crate::kernel::vm::MemoryManager;
use crate::rustux::errors::{Error, Result};
use crate::rustux::types::*;

use crate::{fatal, log_debug, log_error, log_info};

/// ============================================================================
/// Kernel Context
/// ============================================================================

/// Scheduler-wide state shared by all CPUs
pub struct KernelContext {
    config: SchedConfig,
    machine: Arc<dyn Machine>,
    memory: Arc<dyn MemoryManager>,
    processes: Arc<dyn ProcessTable>,
    placement: Arc<dyn ProcessorThreadAllocator>,
    cpus: Vec<PerProcessorScheduler>,
    threads: spin::Mutex<BTreeMap<(ProcessId, Tid), Arc<Thread>>>,
}

impl KernelContext {
    /// Create the context with a round-robin scheduler per CPU
    pub fn new(
        config: SchedConfig,
        machine: Arc<dyn Machine>,
        memory: Arc<dyn MemoryManager>,
        processes: Arc<dyn ProcessTable>,
        placement: Arc<dyn ProcessorThreadAllocator>,
    ) -> Result<Self> {
        if config.cpu_count == 0 || config.cpu_count > SMP_MAX_CPUS {
            log_error!("kernel: unsupported cpu count {}", config.cpu_count);
            return Err(Error::InvalidArgs);
        }
        if !event_window_fits(config.event_base) {
            log_error!("kernel: event window at {:#x} does not fit the address space", config.event_base);
            return Err(Error::InvalidArgs);
        }

        let cpus = (0..config.cpu_count as CpuId)
            .map(|cpu| PerProcessorScheduler::new(cpu, Box::new(RoundRobin::new())))
            .collect();

        log_info!(
            "kernel: {} cpus, reschedule every {} ticks",
            config.cpu_count,
            config.ticks_per_reschedule
        );

        Ok(Self {
            config,
            machine,
            memory,
            processes,
            placement,
            cpus,
            threads: spin::Mutex::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn machine(&self) -> &dyn Machine {
        self.machine.as_ref()
    }

    /// Interrupt control handed to spinlocks
    pub fn irq(&self) -> &dyn ArchInterrupts {
        self.machine.interrupts()
    }

    pub fn memory(&self) -> &dyn MemoryManager {
        self.memory.as_ref()
    }

    pub fn processes(&self) -> &dyn ProcessTable {
        self.processes.as_ref()
    }

    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// ========================================================================
    /// Lookup
    /// ========================================================================

    pub fn scheduler(&self, cpu: CpuId) -> Option<&PerProcessorScheduler> {
        self.cpus.get(cpu as usize)
    }

    /// Scheduler of the executing CPU
    pub fn current_scheduler(&self) -> &PerProcessorScheduler {
        let cpu = self.machine.cpu_id();
        match self.scheduler(cpu) {
            Some(scheduler) => scheduler,
            None => fatal!("kernel: cpu {} has no scheduler", cpu),
        }
    }

    /// Thread running on the executing CPU
    pub fn current_thread(&self) -> Option<Arc<Thread>> {
        self.scheduler(self.machine.cpu_id())?.current_thread(self.irq())
    }

    pub fn thread(&self, pid: ProcessId, tid: Tid) -> Option<Arc<Thread>> {
        self.threads.lock().get(&(pid, tid)).cloned()
    }

    /// Number of live threads
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// ========================================================================
    /// Thread Creation
    /// ========================================================================

    /// Create a thread of `pid` homed on `cpu`
    ///
    /// The thread gets an id from the process table and a kernel stack,
    /// and is entered into the thread table. No scheduler knows it yet.
    pub fn create_thread(&self, pid: ProcessId, priority: usize, cpu: CpuId) -> Result<Arc<Thread>> {
        if self.scheduler(cpu).is_none() {
            return Err(Error::InvalidArgs);
        }

        let tid = self.processes.register_thread(pid)?;
        let Some(stack) = self.memory.allocate_kernel_stack() else {
            log_error!("kernel: no kernel stack for thread {} of process {}", tid, pid);
            self.processes.unregister_thread(pid, tid);
            return Err(Error::NoMemory);
        };

        let thread = Thread::new(tid, pid, cpu, priority, Some(stack));
        let mut threads = self.threads.lock();
        if threads.contains_key(&(pid, tid)) {
            drop(threads);
            log_error!("kernel: thread {} of process {} already exists", tid, pid);
            thread.release_resources(self);
            self.processes.unregister_thread(pid, tid);
            return Err(Error::AlreadyExists);
        }
        threads.insert((pid, tid), thread.clone());
        drop(threads);

        log_debug!("kernel: created thread {} of process {} on cpu {}", tid, pid, cpu);
        Ok(thread)
    }

    /// Create a thread and start it at `entry(param)`
    ///
    /// The placement policy picks the CPU. On the executing CPU the new
    /// thread runs immediately; elsewhere it is handed to that CPU.
    pub fn spawn(
        &self,
        pid: ProcessId,
        entry: VAddr,
        param: usize,
        user_mode: bool,
        stack: VAddr,
        priority: usize,
    ) -> Result<Tid> {
        let cpu = self.placement.select_cpu(self, pid);
        let thread = self.create_thread(pid, priority, cpu)?;
        let tid = thread.id();
        let scheduler = self.scheduler(cpu).ok_or(Error::Internal)?;

        let token = thread.lock_for_switch(self.irq());
        drop(thread);
        scheduler.add_thread(self, token, entry, param, user_mode, stack);
        Ok(tid)
    }

    /// Create a thread that starts by returning from a syscall with `state`
    ///
    /// Always placed on the executing CPU.
    pub fn spawn_resumed(&self, pid: ProcessId, state: &SyscallState, priority: usize) -> Result<Tid> {
        let cpu = self.machine.cpu_id();
        let thread = self.create_thread(pid, priority, cpu)?;
        let tid = thread.id();

        let token = thread.lock_for_switch(self.irq());
        drop(thread);
        self.current_scheduler().add_thread_resumed(self, token, state);
        Ok(tid)
    }

    /// ========================================================================
    /// Per-CPU Entry Points
    /// ========================================================================

    /// Bring up the scheduler of `cpu` with `boot` running
    pub fn initialise_cpu(&self, cpu: CpuId, boot: Arc<Thread>) -> Result {
        self.scheduler(cpu).ok_or(Error::InvalidArgs)?.initialise(self, boot)
    }

    /// Timer interrupt on the executing CPU
    pub fn scheduler_tick(&self, delta: Nanoseconds, state: &InterruptState) {
        self.current_scheduler().timer(self, delta, state);
    }

    /// The running thread returned from its entry point
    pub fn thread_exited(&self) {
        self.current_scheduler().kill_current_thread(self);
    }

    /// ========================================================================
    /// Thread Destruction
    /// ========================================================================

    /// Free a finished thread and forget it
    ///
    /// Takes the thread's scheduler lock first. A dying thread holds it
    /// until its CPU has switched to another stack, so this waits for that
    /// switch. Destroying a thread that is already gone does nothing.
    pub(crate) fn destroy_thread(&self, thread: &Arc<Thread>) {
        let irq = self.irq();
        let lock = thread.scheduler_lock();
        lock.acquire(irq);

        if self.threads.lock().remove(&(thread.parent(), thread.id())).is_none() {
            lock.release(irq);
            log_error!("kernel: thread {} of process {} destroyed twice", thread.id(), thread.parent());
            return;
        }

        if let Some(scheduler) = self.scheduler(thread.cpu_id()) {
            scheduler.remove_thread(thread, irq);
        }
        thread.release_resources(self);
        self.processes.unregister_thread(thread.parent(), thread.id());
        lock.release(irq);

        log_debug!("kernel: destroyed thread {} of process {}", thread.id(), thread.parent());
    }
}

/// ============================================================================
/// Reaper
/// ============================================================================

/// Destroys a detached thread once its CPU has switched off its stack
///
/// Handed to [`ArchThreadContext::restore_context_and_reap`], which calls
/// [`reap`](Self::reap) after the last use of the dying thread's stack.
///
/// [`ArchThreadContext::restore_context_and_reap`]: crate::kernel::arch::ArchThreadContext::restore_context_and_reap
#[must_use = "a dying thread must be reaped"]
pub struct Reaper<'k> {
    kernel: &'k KernelContext,
    thread: Arc<Thread>,
}

impl<'k> Reaper<'k> {
    pub(crate) fn new(kernel: &'k KernelContext, thread: Arc<Thread>) -> Self {
        Self { kernel, thread }
    }

    pub fn thread(&self) -> &Arc<Thread> {
        &self.thread
    }

    /// Release the dying thread's lock and destroy it
    pub fn reap(self) {
        // SAFETY: the reaper is built from the thread's consumed lock
        // token, so the lock is held.
        unsafe {
            self.thread.scheduler_lock().release_raw();
        }
        self.kernel.destroy_thread(&self.thread);
    }
}
