// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Tests
//!
//! Event queueing, join/detach/shutdown, TLS and pending requests on the
//! simulated platform.

use std::boxed::Box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::sim::{set_current_cpu, SimProcesses};
use super::Harness;
use crate::kernel::thread::event::{Event, EventHandle, SignalEvent};
use crate::kernel::thread::request::{AsyncRequest, RequestQueue};
use crate::kernel::thread::{ThreadStatus, UnwindState};
use crate::kernel::vm::{MappingFlags, MemoryManager};

const PID: u64 = 7;

fn signal(number: usize) -> EventHandle {
    EventHandle::Owned(Box::new(SignalEvent::new(number, 0x40_0000)))
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_send_event_wakes_sleeper() {
    let h = Harness::new(1);
    h.boot(0);
    let t = h.ready(PID, 0, 1);
    t.set_status(&h.kernel, ThreadStatus::Sleeping);
    assert!(!h.queued(0, &t));

    t.send_event(&h.kernel, signal(3));

    assert_eq!(t.status(), ThreadStatus::Ready);
    assert!(t.was_interrupted());
    assert!(h.queued(0, &t));
    assert_eq!(t.pending_events(), 1);
    assert!(!t.scheduler_lock().is_locked());
}

#[test]
fn test_send_event_leaves_ready_thread_alone() {
    let h = Harness::new(1);
    h.boot(0);
    let t = h.ready(PID, 0, 1);

    t.send_event(&h.kernel, signal(3));
    t.send_event(&h.kernel, signal(4));

    assert_eq!(t.status(), ThreadStatus::Ready);
    assert!(!t.was_interrupted());
    assert_eq!(t.pending_events(), 2);
}

#[test]
fn test_wake_only_sleepers() {
    let h = Harness::new(1);
    h.boot(0);
    let t = h.ready(PID, 0, 1);

    assert!(!t.wake(&h.kernel));
    t.set_status(&h.kernel, ThreadStatus::Sleeping);
    assert!(t.wake(&h.kernel));
    assert_eq!(t.status(), ThreadStatus::Ready);
    assert!(!t.was_interrupted());
}

#[test]
fn test_inhibited_event_held_back() {
    let h = Harness::new(1);
    h.boot(0);
    let t = h.ready(PID, 0, 1);

    assert!(t.inhibit_event(&h.kernel, 5, true));
    t.send_event(&h.kernel, signal(5));
    t.send_event(&h.kernel, signal(6));

    assert_eq!(t.get_next_event().map(|e| e.number()), Some(6));
    assert!(t.get_next_event().is_none());

    assert!(t.inhibit_event(&h.kernel, 5, false));
    assert_eq!(t.get_next_event().map(|e| e.number()), Some(5));
}

#[test]
fn test_inhibit_out_of_range_rejected() {
    let h = Harness::new(1);
    h.boot(0);
    let t = h.ready(PID, 0, 1);

    assert!(!t.inhibit_event(&h.kernel, 300, true));
}

#[test]
fn test_cull_events() {
    let h = Harness::new(1);
    h.boot(0);
    let t = h.ready(PID, 0, 1);

    let shared: Arc<dyn Event> = Arc::new(SignalEvent::new(8, 0x40_0000));
    t.send_event(&h.kernel, signal(7));
    t.send_event(&h.kernel, EventHandle::Shared(shared.clone()));
    t.send_event(&h.kernel, signal(7));
    t.send_event(&h.kernel, EventHandle::Shared(shared.clone()));

    assert_eq!(t.cull_event_number(&h.kernel, 7), 2);
    assert_eq!(t.cull_event(&h.kernel, &shared), 2);
    assert_eq!(t.pending_events(), 0);
    assert_eq!(Arc::strong_count(&shared), 1);
}

// ============================================================================
// Join / Detach / Shutdown
// ============================================================================

#[test]
fn test_attach_waiter_single_winner() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let first = h.ready(PID, 0, 1);
    let second = h.ready(PID, 0, 1);
    let wins = AtomicUsize::new(0);

    thread::scope(|s| {
        for waiter in [&first, &second] {
            let (h, target, wins) = (&h, &target, &wins);
            s.spawn(move || {
                set_current_cpu(0);
                if target.attach_waiter(&h.kernel, waiter) {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    // The winner may attach again, the loser still may not.
    let again = target.attach_waiter(&h.kernel, &first) as usize
        + target.attach_waiter(&h.kernel, &second) as usize;
    assert_eq!(again, 1);
}

#[test]
fn test_join_finished_thread_destroys_it() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let tid = target.id();
    let stacks = h.memory.live_stacks();

    target.shutdown(&h.kernel);
    assert_eq!(target.status(), ThreadStatus::AwaitingJoin);
    assert!(!h.queued(0, &target));

    assert!(target.join(&h.kernel));
    assert!(h.kernel.thread(PID, tid).is_none());
    assert!(!h.processes.is_registered(PID, tid));
    assert_eq!(h.memory.live_stacks(), stacks - 1);
}

#[test]
fn test_join_self_fails() {
    let h = Harness::new(1);
    let boot = h.boot(0);
    assert!(!boot.join(&h.kernel));
}

#[test]
fn test_join_detached_fails() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);

    assert!(target.detach(&h.kernel));
    assert!(target.is_detached());
    assert!(!target.join(&h.kernel));
}

#[test]
fn test_join_fails_while_unwinding() {
    let h = Harness::new(1);
    let boot = h.boot(0);
    let target = h.ready(PID, 0, 1);
    let other = h.ready(PID, 0, 1);

    boot.set_unwind_state(UnwindState::Exit);
    assert!(!target.join(&h.kernel));

    // The failed join gave up its claim.
    assert!(target.attach_waiter(&h.kernel, &other));
}

#[test]
fn test_detach_with_waiter_fails() {
    let h = Harness::new(1);
    let boot = h.boot(0);
    let target = h.ready(PID, 0, 1);

    assert!(target.attach_waiter(&h.kernel, &boot));
    assert!(!target.detach(&h.kernel));
    assert!(!target.is_detached());
}

#[test]
fn test_detach_finished_thread_destroys_it() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let tid = target.id();

    target.shutdown(&h.kernel);
    assert!(target.detach(&h.kernel));
    assert!(h.kernel.thread(PID, tid).is_none());
}

#[test]
fn test_join_waits_for_dying_thread_to_switch_out() {
    let h = Harness::new(2);
    h.boot(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let tid = target.id();
    let stacks = h.memory.live_stacks();

    // Hold the scheduler lock across shutdown the way the exit path does.
    let token = target.lock_for_switch(h.kernel.irq());
    target.shutdown(&h.kernel);
    assert_eq!(target.status(), ThreadStatus::AwaitingJoin);

    thread::scope(|s| {
        let (h, target) = (&h, &target);
        let joiner = s.spawn(move || {
            set_current_cpu(1);
            target.join(&h.kernel)
        });

        thread::sleep(Duration::from_millis(50));
        assert!(h.kernel.thread(PID, tid).is_some());
        assert!(h.processes.is_registered(PID, tid));
        assert_eq!(h.memory.live_stacks(), stacks);

        token.release_after_switch();
        assert!(joiner.join().unwrap());
    });

    assert!(h.kernel.thread(PID, tid).is_none());
    assert!(!h.processes.is_registered(PID, tid));
    assert_eq!(h.memory.live_stacks(), stacks - 1);
}

#[test]
fn test_destroy_twice_is_harmless() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let tid = target.id();
    let stacks = h.memory.live_stacks();

    target.shutdown(&h.kernel);
    assert!(target.join(&h.kernel));
    h.kernel.destroy_thread(&target);

    assert!(h.kernel.thread(PID, tid).is_none());
    assert_eq!(h.memory.live_stacks(), stacks - 1);
    assert!(!target.scheduler_lock().is_locked());
}

#[test]
fn test_shutdown_wakes_waiter_once() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let waiter = h.ready(PID, 0, 1);

    assert!(target.attach_waiter(&h.kernel, &waiter));
    waiter.set_status(&h.kernel, ThreadStatus::Sleeping);

    target.shutdown(&h.kernel);
    assert_eq!(waiter.status(), ThreadStatus::Ready);
    assert_eq!(target.status(), ThreadStatus::AwaitingJoin);

    waiter.set_status(&h.kernel, ThreadStatus::Sleeping);
    target.shutdown(&h.kernel);
    assert_eq!(waiter.status(), ThreadStatus::Sleeping);
}

#[test]
fn test_shutdown_detached_keeps_status() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);

    assert!(target.detach(&h.kernel));
    target.shutdown(&h.kernel);
    assert_eq!(target.status(), ThreadStatus::Ready);
}

// ============================================================================
// Pending Requests
// ============================================================================

#[derive(Default)]
struct CountingQueue {
    halts: AtomicUsize,
    discards: AtomicUsize,
}

impl RequestQueue for CountingQueue {
    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {}

    fn discard(&self, _request: &Arc<AsyncRequest>) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_shutdown_abandons_requests() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let queue = Arc::new(CountingQueue::default());

    let in_flight = AsyncRequest::new(1, (PID, target.id()));
    let done = AsyncRequest::new(2, (PID, target.id()));
    done.complete();
    let collected = AsyncRequest::new(3, (PID, target.id()));

    target.add_request(queue.clone(), &in_flight);
    target.add_request(queue.clone(), &done);
    target.add_request(queue.clone(), &collected);
    target.remove_request(&collected);

    target.shutdown(&h.kernel);

    assert!(in_flight.is_rejected());
    assert!(in_flight.owner().is_none());
    assert!(!done.is_rejected());
    assert_eq!(queue.halts.load(Ordering::SeqCst), 2);
    assert_eq!(queue.discards.load(Ordering::SeqCst), 1);
}

// ============================================================================
// TLS
// ============================================================================

#[test]
fn test_tls_mapped_once_and_freed() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);
    let aspace = SimProcesses::aspace_of(PID);

    let base = target.tls_base(&h.kernel);
    assert_ne!(base, 0);
    assert_eq!(target.tls_base(&h.kernel), base);
    let (_, flags) = h.memory.mapping(aspace, base).unwrap();
    assert!(flags.contains(MappingFlags::WRITE));

    target.shutdown(&h.kernel);
    assert!(target.join(&h.kernel));
    assert!(!h.memory.is_mapped(aspace, base));
    assert_eq!(h.processes.freed_tls(), vec![(PID, base)]);
}

#[test]
fn test_tls_failure_yields_zero() {
    let h = Harness::new(1);
    h.boot(0);
    let target = h.ready(PID, 0, 1);

    h.processes.fail_tls_allocations(true);
    assert_eq!(target.tls_base(&h.kernel), 0);

    h.processes.fail_tls_allocations(false);
    h.memory.fail_page_allocations(true);
    assert_eq!(target.tls_base(&h.kernel), 0);
    assert_eq!(h.processes.freed_tls().len(), 1);
}
