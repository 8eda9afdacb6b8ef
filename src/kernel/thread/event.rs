// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Events
//!
//! Asynchronous, signal-like notifications queued on a thread. Before a
//! thread returns to its interrupted code the scheduler drains the queue
//! and runs the first deliverable event's handler on a fresh state level.
//!
//! # Serialized form
//!
//! An event is copied into its scratch page before the handler runs. The
//! first machine word is the event number; what follows is up to the
//! event type, bounded by [`EVENT_LIMIT`].
//!
//! ```text
//! +-----------------+---------------------------+
//! | number (usize)  | payload ...               |
//! +-----------------+---------------------------+
//! 0                 8                      <= EVENT_LIMIT
//! ```

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::kernel::config::EVENT_LIMIT;
use crate::rustux::types::*;

const WORD: usize = core::mem::size_of::<usize>();

/// Number of distinct event numbers an inhibit mask can hold
pub const MAX_EVENT_NUMBER: usize = 256;

/// An asynchronous event deliverable to a thread
pub trait Event: Send + Sync {
    /// Event number, the unit of inhibition
    fn number(&self) -> usize;

    /// Address of the handler in the target's address space
    fn handler_address(&self) -> VAddr;

    /// Only deliver at this state level, if set
    fn specific_nesting_level(&self) -> Option<usize> {
        None
    }

    /// Write the serialized event into `buffer`, returning its length
    fn serialize(&self, buffer: &mut [u8]) -> usize;
}

/// Read the event number back out of a serialized event
pub fn event_type(buffer: &[u8]) -> Option<usize> {
    let word = buffer.get(..WORD)?;
    let mut bytes = [0u8; WORD];
    bytes.copy_from_slice(word);
    Some(usize::from_le_bytes(bytes))
}

/// A queued event and who owns it
pub enum EventHandle {
    /// Owned by the queue; freed once dispatched
    Owned(Box<dyn Event>),
    /// Owned elsewhere; may be queued on several threads at once
    Shared(Arc<dyn Event>),
}

impl EventHandle {
    pub fn event(&self) -> &dyn Event {
        match self {
            EventHandle::Owned(event) => event.as_ref(),
            EventHandle::Shared(event) => event.as_ref(),
        }
    }

    /// Whether dispatching this handle frees the event
    pub fn is_deletable(&self) -> bool {
        matches!(self, EventHandle::Owned(_))
    }

    pub fn number(&self) -> usize {
        self.event().number()
    }

    /// Whether this handle refers to `event`
    pub fn is(&self, event: &Arc<dyn Event>) -> bool {
        match self {
            EventHandle::Shared(mine) => {
                Arc::as_ptr(mine) as *const () == Arc::as_ptr(event) as *const ()
            }
            EventHandle::Owned(_) => false,
        }
    }
}

impl core::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventHandle")
            .field("number", &self.number())
            .field("handler", &self.event().handler_address())
            .field("deletable", &self.is_deletable())
            .finish()
    }
}

/// A signal carrying an opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    number: usize,
    handler: VAddr,
    level: Option<usize>,
    payload: Vec<u8>,
}

impl SignalEvent {
    pub fn new(number: usize, handler: VAddr) -> Self {
        Self { number, handler, level: None, payload: Vec::new() }
    }

    /// Restrict delivery to state level `level`
    pub fn at_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }
}

impl Event for SignalEvent {
    fn number(&self) -> usize {
        self.number
    }

    fn handler_address(&self) -> VAddr {
        self.handler
    }

    fn specific_nesting_level(&self) -> Option<usize> {
        self.level
    }

    fn serialize(&self, buffer: &mut [u8]) -> usize {
        let limit = buffer.len().min(EVENT_LIMIT);
        if limit < WORD {
            return 0;
        }
        buffer[..WORD].copy_from_slice(&self.number.to_le_bytes());
        let len = self.payload.len().min(limit - WORD);
        buffer[WORD..WORD + len].copy_from_slice(&self.payload[..len]);
        WORD + len
    }
}

/// Set of event numbers that must not fire at a state level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InhibitMask([u64; MAX_EVENT_NUMBER / 64]);

impl InhibitMask {
    pub const fn new() -> Self {
        Self([0; MAX_EVENT_NUMBER / 64])
    }

    /// Inhibit or re-enable `number`
    ///
    /// Numbers outside the mask cannot be inhibited; returns whether the
    /// change applied.
    pub fn set(&mut self, number: usize, inhibit: bool) -> bool {
        if number >= MAX_EVENT_NUMBER {
            return false;
        }
        let bit = 1u64 << (number % 64);
        if inhibit {
            self.0[number / 64] |= bit;
        } else {
            self.0[number / 64] &= !bit;
        }
        true
    }

    pub fn contains(&self, number: usize) -> bool {
        number < MAX_EVENT_NUMBER && self.0[number / 64] & (1u64 << (number % 64)) != 0
    }
}

/// FIFO of pending events
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<EventHandle>,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self { events: VecDeque::new() }
    }

    pub fn push(&mut self, event: EventHandle) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take the first event deliverable at `level` under `mask`
    ///
    /// Events that are inhibited, or pinned to another level, rotate to
    /// the back. At most one full pass is made.
    pub fn next_deliverable(&mut self, mask: &InhibitMask, level: usize) -> Option<EventHandle> {
        for _ in 0..self.events.len() {
            let event = self.events.pop_front()?;
            let inhibited = mask.contains(event.number());
            let level_ok = event
                .event()
                .specific_nesting_level()
                .map_or(true, |wanted| wanted == level);

            if !inhibited && level_ok {
                return Some(event);
            }
            self.events.push_back(event);
        }
        None
    }

    /// Drop every queued event numbered `number`; returns how many
    pub fn cull_number(&mut self, number: usize) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.number() != number);
        before - self.events.len()
    }

    /// Drop every queued reference to `event`; returns how many
    pub fn cull_event(&mut self, event: &Arc<dyn Event>) -> usize {
        let before = self.events.len();
        self.events.retain(|e| !e.is(event));
        before - self.events.len()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(number: usize) -> EventHandle {
        EventHandle::Owned(Box::new(SignalEvent::new(number, 0x1000 + number)))
    }

    #[test]
    fn test_fifo_drain() {
        let mut queue = EventQueue::new();
        for n in 1..=5 {
            queue.push(owned(n));
        }
        let mask = InhibitMask::new();
        let drained: Vec<usize> = core::iter::from_fn(|| queue.next_deliverable(&mask, 0))
            .map(|e| e.number())
            .collect();
        assert_eq!(drained, vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_inhibited_events_rotate() {
        let mut queue = EventQueue::new();
        queue.push(owned(3));
        queue.push(owned(7));
        queue.push(owned(9));

        let mut mask = InhibitMask::new();
        mask.set(3, true);

        assert_eq!(queue.next_deliverable(&mask, 0).map(|e| e.number()), Some(7));
        assert_eq!(queue.next_deliverable(&mask, 0).map(|e| e.number()), Some(9));
        assert!(queue.next_deliverable(&mask, 0).is_none());
        assert_eq!(queue.len(), 1);

        mask.set(3, false);
        assert_eq!(queue.next_deliverable(&mask, 0).map(|e| e.number()), Some(3));
    }

    #[test]
    fn test_level_pinned_events() {
        let mut queue = EventQueue::new();
        queue.push(EventHandle::Owned(Box::new(SignalEvent::new(4, 0x40).at_level(2))));
        queue.push(owned(5));

        let mask = InhibitMask::new();
        assert_eq!(queue.next_deliverable(&mask, 0).map(|e| e.number()), Some(5));
        assert!(queue.next_deliverable(&mask, 0).is_none());
        assert_eq!(queue.next_deliverable(&mask, 2).map(|e| e.number()), Some(4));
    }

    #[test]
    fn test_cull() {
        let shared: Arc<dyn Event> = Arc::new(SignalEvent::new(8, 0x80));
        let mut queue = EventQueue::new();
        queue.push(owned(2));
        queue.push(EventHandle::Shared(shared.clone()));
        queue.push(owned(2));
        queue.push(EventHandle::Shared(shared.clone()));

        assert_eq!(queue.cull_event(&shared), 2);
        assert_eq!(queue.cull_number(2), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_inhibit_mask_bounds() {
        let mut mask = InhibitMask::new();
        assert!(mask.set(255, true));
        assert!(mask.contains(255));
        assert!(!mask.set(256, true));
        assert!(!mask.contains(256));
    }

    #[test]
    fn test_serialize_prefixes_number() {
        let event = SignalEvent::new(17, 0x4000).with_payload(&[1, 2, 3]);
        let mut buffer = [0u8; 64];
        let len = event.serialize(&mut buffer);
        assert_eq!(len, WORD + 3);
        assert_eq!(event_type(&buffer), Some(17));
        assert_eq!(&buffer[WORD..WORD + 3], &[1, 2, 3]);
    }

    #[test]
    fn test_deletable_flag() {
        assert!(owned(1).is_deletable());
        let shared: Arc<dyn Event> = Arc::new(SignalEvent::new(1, 0));
        assert!(!EventHandle::Shared(shared).is_deletable());
    }
}
