// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Scheduler Test Suite
//!
//! Scenario tests that drive the scheduler on the simulated platform.
//!
//! # Organization
//!
//! - [`sim`] - Simulated machine, memory manager and process table
//! - [`thread_tests`] - Events, join, detach and shutdown
//! - [`sched_tests`] - Context switching, thread start and exit, timer,
//!   event delivery


mod thread_tests;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::kernel::config::{SchedConfig, DEFAULT_PRIORITY};
use crate::kernel::context::KernelContext;
use crate::kernel::process::{ProcessId, PID_KERNEL};
use crate::kernel::sched::ProcessorThreadAllocator;
use crate::kernel::thread::{Thread, ThreadStatus};
use crate::rustux::types::*;

use sim::{set_current_cpu, SimMachine, SimMemory, SimProcesses};

/// Place every new thread on a CPU chosen by the test
#[derive(Debug, Default)]
pub struct FixedCpu(AtomicU32);

impl FixedCpu {
    pub fn place_on(&self, cpu: CpuId) {
        self.0.store(cpu, Ordering::SeqCst);
    }
}

impl ProcessorThreadAllocator for FixedCpu {
    fn select_cpu(&self, _kernel: &KernelContext, _parent: ProcessId) -> CpuId {
        self.0.load(Ordering::SeqCst)
    }
}

/// A kernel on the simulated platform
pub struct Harness {
    pub machine: Arc<SimMachine>,
    pub memory: Arc<SimMemory>,
    pub processes: Arc<SimProcesses>,
    pub placement: Arc<FixedCpu>,
    pub kernel: KernelContext,
}

impl Harness {
    /// `cpus` CPUs, a reschedule on every tick, no pump threads
    pub fn new(cpus: usize) -> Self {
        Self::with_config(SchedConfig {
            cpu_count: cpus,
            transfer_pump: false,
            ..SchedConfig::default()
        })
    }

    pub fn with_config(config: SchedConfig) -> Self {
        set_current_cpu(0);
        let machine = Arc::new(SimMachine::new(config.cpu_count));
        let memory = Arc::new(SimMemory::new());
        let processes = Arc::new(SimProcesses::new());
        let placement = Arc::new(FixedCpu::default());
        let kernel = KernelContext::new(
            config,
            machine.clone(),
            memory.clone(),
            processes.clone(),
            placement.clone(),
        )
        .expect("kernel context");
        Self { machine, memory, processes, placement, kernel }
    }

    /// Bring up `cpu` with a fresh kernel boot thread and run as that CPU
    pub fn boot(&self, cpu: CpuId) -> Arc<Thread> {
        set_current_cpu(cpu);
        let boot = self
            .kernel
            .create_thread(PID_KERNEL, DEFAULT_PRIORITY, cpu)
            .expect("boot thread");
        self.kernel.initialise_cpu(cpu, boot.clone()).expect("initialise");
        boot
    }

    /// Give `cpu` an idle thread
    pub fn idle(&self, cpu: CpuId) -> Arc<Thread> {
        let idle = self
            .kernel
            .create_thread(PID_KERNEL, DEFAULT_PRIORITY, cpu)
            .expect("idle thread");
        self.kernel
            .scheduler(cpu)
            .expect("cpu")
            .set_idle(idle.clone(), self.kernel.irq());
        idle
    }

    /// A `Ready` thread of `pid` queued on `cpu`
    pub fn ready(&self, pid: ProcessId, cpu: CpuId, priority: usize) -> Arc<Thread> {
        let thread = self.kernel.create_thread(pid, priority, cpu).expect("thread");
        thread.set_status(&self.kernel, ThreadStatus::Ready);
        thread
    }

    pub fn current(&self) -> Arc<Thread> {
        self.kernel.current_thread().expect("current thread")
    }

    pub fn queued(&self, cpu: CpuId, thread: &Thread) -> bool {
        self.kernel
            .scheduler(cpu)
            .map_or(false, |scheduler| scheduler.algorithm().is_queued(thread, self.kernel.irq()))
    }
}
