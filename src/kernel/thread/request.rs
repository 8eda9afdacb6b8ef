// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Pending Asynchronous Requests
//!
//! A thread that issues asynchronous I/O keeps a weak reference to each
//! outstanding request. If the thread dies first, its shutdown path
//! settles every request it still knows about.
//!
//! ```text
//! completed, last reference   -> discarded by its queue
//! completed, shared           -> reference count dropped
//! still in flight             -> rejected, owner interest detached
//! ```

use alloc::sync::{Arc, Weak};

use crate::rustux::types::*;

/// Queue that services [`AsyncRequest`]s
pub trait RequestQueue: Send + Sync {
    /// Stop the worker so request state cannot change underneath us
    fn halt(&self);

    /// Restart the worker
    fn resume(&self);

    /// Remove a finished request from the queue's bookkeeping
    fn discard(&self, request: &Arc<AsyncRequest>);
}

#[derive(Debug, Default)]
struct RequestState {
    completed: bool,
    rejected: bool,
    /// Threads interested in the result
    refs: usize,
    owner: Option<(Pid, Tid)>,
}

/// One asynchronous request as seen by the threads waiting on it
#[derive(Debug)]
pub struct AsyncRequest {
    id: u64,
    state: spin::Mutex<RequestState>,
}

impl AsyncRequest {
    /// A fresh request referenced by one thread
    pub fn new(id: u64, owner: (Pid, Tid)) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: spin::Mutex::new(RequestState {
                refs: 1,
                owner: Some(owner),
                ..RequestState::default()
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Another thread is also waiting on this request
    pub fn add_reference(&self) {
        self.state.lock().refs += 1;
    }

    pub fn references(&self) -> usize {
        self.state.lock().refs
    }

    pub fn complete(&self) {
        self.state.lock().completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn is_rejected(&self) -> bool {
        self.state.lock().rejected
    }

    /// Thread that issued the request, while it still cares
    pub fn owner(&self) -> Option<(Pid, Tid)> {
        self.state.lock().owner
    }
}

/// A request a thread is waiting on, and the queue servicing it
pub struct PendingRequest {
    queue: Arc<dyn RequestQueue>,
    request: Weak<AsyncRequest>,
}

impl PendingRequest {
    pub fn new(queue: Arc<dyn RequestQueue>, request: &Arc<AsyncRequest>) -> Self {
        Self { queue, request: Arc::downgrade(request) }
    }

    pub fn refers_to(&self, request: &Arc<AsyncRequest>) -> bool {
        Weak::ptr_eq(&self.request, &Arc::downgrade(request))
    }

    /// Settle the request on behalf of a dying thread
    pub fn abandon(&self) {
        let Some(request) = self.request.upgrade() else {
            return;
        };

        self.queue.halt();
        let discard = {
            let mut state = request.state.lock();
            if state.completed {
                state.refs = state.refs.saturating_sub(1);
                state.refs == 0
            } else {
                state.rejected = true;
                state.owner = None;
                false
            }
        };
        if discard {
            self.queue.discard(&request);
        }
        self.queue.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingQueue {
        halts: AtomicUsize,
        resumes: AtomicUsize,
        discarded: Mutex<Vec<u64>>,
    }

    impl RequestQueue for RecordingQueue {
        fn halt(&self) {
            self.halts.fetch_add(1, Ordering::SeqCst);
        }
        fn resume(&self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }
        fn discard(&self, request: &Arc<AsyncRequest>) {
            self.discarded.lock().unwrap().push(request.id());
        }
    }

    #[test]
    fn test_completed_last_reference_discarded() {
        let queue = Arc::new(RecordingQueue::default());
        let request = AsyncRequest::new(1, (1, 1));
        request.complete();

        PendingRequest::new(queue.clone(), &request).abandon();

        assert_eq!(*queue.discarded.lock().unwrap(), vec![1]);
        assert_eq!(queue.halts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completed_shared_reference_dropped() {
        let queue = Arc::new(RecordingQueue::default());
        let request = AsyncRequest::new(2, (1, 1));
        request.add_reference();
        request.complete();

        PendingRequest::new(queue.clone(), &request).abandon();

        assert!(queue.discarded.lock().unwrap().is_empty());
        assert_eq!(request.references(), 1);
    }

    #[test]
    fn test_in_flight_rejected() {
        let queue = Arc::new(RecordingQueue::default());
        let request = AsyncRequest::new(3, (1, 7));

        PendingRequest::new(queue.clone(), &request).abandon();

        assert!(request.is_rejected());
        assert_eq!(request.owner(), None);
        assert!(queue.discarded.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dead_request_ignored() {
        let queue = Arc::new(RecordingQueue::default());
        let request = AsyncRequest::new(4, (1, 1));
        let pending = PendingRequest::new(queue.clone(), &request);
        drop(request);

        pending.abandon();
        assert_eq!(queue.halts.load(Ordering::SeqCst), 0);
    }
}
