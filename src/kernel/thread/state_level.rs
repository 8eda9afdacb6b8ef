// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread State Levels
//!
//! Every event handler runs on a state level of its own, so the context
//! it interrupted stays intact underneath it.
//!
//! ```text
//! level 0     normal execution        context, kernel stack
//! level 1     first event handler     context, kernel stack, event stack
//! level 2     nested handler          ...
//!   ...
//! level 15    MAX_NESTED_EVENTS - 1
//! ```
//!
//! The levels live in a fixed array. Stacks in a slot are allocated the
//! first time the level is used and kept for reuse until the thread is
//! destroyed.

use alloc::sync::Weak;
use alloc::vec::Vec;

use super::event::InhibitMask;
use super::Thread;
use crate::kernel::arch::SavedContext;
use crate::kernel::config::MAX_NESTED_EVENTS;
use crate::kernel::vm::{MemoryManager, StackHandle};
use crate::rustux::types::*;

use crate::log_error;

/// One nesting level of a thread
#[derive(Debug, Default)]
pub struct StateLevel {
    /// Registers saved when this level was interrupted or switched out
    pub(crate) context: SavedContext,
    kernel_stack: Option<StackHandle>,
    /// Dedicated user stack for event handlers at this level
    event_stack: Option<StackHandle>,
    auxiliary_stack: Option<StackHandle>,
    inhibit: InhibitMask,
    blocking_thread: Weak<Thread>,
}

impl StateLevel {
    pub fn inhibit_mask(&self) -> &InhibitMask {
        &self.inhibit
    }

    pub fn inhibit_mask_mut(&mut self) -> &mut InhibitMask {
        &mut self.inhibit
    }

    pub fn kernel_stack(&self) -> Option<&StackHandle> {
        self.kernel_stack.as_ref()
    }

    pub fn event_stack(&self) -> Option<&StackHandle> {
        self.event_stack.as_ref()
    }

    /// Install a new event stack, returning the one it replaces
    pub fn replace_event_stack(&mut self, stack: StackHandle) -> Option<StackHandle> {
        self.event_stack.replace(stack)
    }

    pub fn blocking_thread(&self) -> Weak<Thread> {
        self.blocking_thread.clone()
    }

    pub fn set_blocking_thread(&mut self, thread: Weak<Thread>) {
        self.blocking_thread = thread;
    }

    fn drain_stacks(&mut self, out: &mut Vec<StackHandle>) {
        out.extend(self.kernel_stack.take());
        out.extend(self.event_stack.take());
        out.extend(self.auxiliary_stack.take());
    }
}

/// The fixed-capacity stack of state levels
#[derive(Debug)]
pub struct StateLevelStack {
    levels: [StateLevel; MAX_NESTED_EVENTS],
    current: usize,
}

impl StateLevelStack {
    /// Level 0 with an optional kernel stack
    pub fn new(kernel_stack: Option<StackHandle>) -> Self {
        let mut levels: [StateLevel; MAX_NESTED_EVENTS] = core::array::from_fn(|_| StateLevel::default());
        levels[0].kernel_stack = kernel_stack;
        Self { levels, current: 0 }
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &StateLevel {
        &self.levels[self.current]
    }

    pub fn current_mut(&mut self) -> &mut StateLevel {
        &mut self.levels[self.current]
    }

    /// Enter a new level
    ///
    /// The new level starts with the previous level's inhibit mask and
    /// gets a kernel stack if it has none yet. Returns the index of the
    /// level whose context the caller saves into. At the top level the
    /// error is logged and the top level is handed back unchanged.
    pub fn push(&mut self, memory: &dyn MemoryManager) -> usize {
        if self.current + 1 >= MAX_NESTED_EVENTS {
            log_error!("pushState: max nesting depth ({}) reached", MAX_NESTED_EVENTS);
            return self.current;
        }

        self.current += 1;
        self.levels[self.current].inhibit = self.levels[self.current - 1].inhibit;
        self.levels[self.current].blocking_thread = Weak::new();

        if self.levels[self.current].kernel_stack.is_none() {
            match memory.allocate_kernel_stack() {
                Some(stack) => self.levels[self.current].kernel_stack = Some(stack),
                None => log_error!("pushState: no kernel stack for level {}", self.current),
            }
        }

        self.current - 1
    }

    /// Leave the current level
    ///
    /// At level 0 the error is logged and nothing changes.
    pub fn pop(&mut self) {
        if self.current == 0 {
            log_error!("popState: already at state level 0");
            return;
        }
        self.current -= 1;
    }

    /// Stack the CPU should enter the kernel on at the current level
    pub fn kernel_stack_top(&self) -> VAddr {
        self.levels[self.current].kernel_stack.as_ref().map_or(0, StackHandle::top)
    }

    /// Auxiliary kernel stack of the current level, allocated on first use
    pub fn auxiliary_stack_top(&mut self, memory: &dyn MemoryManager) -> Option<VAddr> {
        let level = &mut self.levels[self.current];
        if level.auxiliary_stack.is_none() {
            level.auxiliary_stack = memory.allocate_kernel_stack();
        }
        level.auxiliary_stack.as_ref().map(StackHandle::top)
    }

    /// Saved context of level `index`
    pub(crate) fn context_ptr(&mut self, index: usize) -> *mut SavedContext {
        &mut self.levels[index].context as *mut SavedContext
    }

    /// Take every stack out of every level
    pub fn take_stacks(&mut self) -> Vec<StackHandle> {
        let mut stacks = Vec::new();
        for level in self.levels.iter_mut() {
            level.drain_stacks(&mut stacks);
        }
        stacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::sim::SimMemory;

    #[test]
    fn test_push_pop_depth() {
        let memory = SimMemory::new();
        let mut levels = StateLevelStack::new(memory.allocate_kernel_stack());

        assert_eq!(levels.push(&memory), 0);
        assert_eq!(levels.push(&memory), 1);
        assert_eq!(levels.depth(), 2);
        levels.pop();
        assert_eq!(levels.depth(), 1);
        levels.pop();
        levels.pop();
        levels.pop();
        assert_eq!(levels.depth(), 0);
    }

    #[test]
    fn test_push_clamps_at_top() {
        let memory = SimMemory::new();
        let mut levels = StateLevelStack::new(None);

        for _ in 0..MAX_NESTED_EVENTS + 5 {
            levels.push(&memory);
        }
        assert_eq!(levels.depth(), MAX_NESTED_EVENTS - 1);
        assert_eq!(levels.push(&memory), MAX_NESTED_EVENTS - 1);
        // One kernel stack per level above 0, none allocated twice.
        assert_eq!(memory.live_stacks(), MAX_NESTED_EVENTS - 1);
    }

    #[test]
    fn test_mixed_sequence_matches_clamped_count() {
        let memory = SimMemory::new();
        let mut levels = StateLevelStack::new(None);
        let ops = [true, true, false, false, false, true, true, true, false, true];
        let mut expected: isize = 0;

        for push in ops {
            if push {
                levels.push(&memory);
                expected = (expected + 1).min(MAX_NESTED_EVENTS as isize - 1);
            } else {
                levels.pop();
                expected = (expected - 1).max(0);
            }
            assert_eq!(levels.depth() as isize, expected);
        }
    }

    #[test]
    fn test_push_inherits_inhibit_mask() {
        let memory = SimMemory::new();
        let mut levels = StateLevelStack::new(None);
        levels.current_mut().inhibit_mask_mut().set(9, true);

        levels.push(&memory);
        assert!(levels.current().inhibit_mask().contains(9));

        levels.current_mut().inhibit_mask_mut().set(9, false);
        levels.pop();
        assert!(levels.current().inhibit_mask().contains(9));
    }

    #[test]
    fn test_stacks_reused_and_released() {
        let memory = SimMemory::new();
        let mut levels = StateLevelStack::new(memory.allocate_kernel_stack());

        levels.push(&memory);
        let top = levels.kernel_stack_top();
        levels.pop();
        levels.push(&memory);
        assert_eq!(levels.kernel_stack_top(), top);
        assert!(levels.auxiliary_stack_top(&memory).is_some());

        let stacks = levels.take_stacks();
        assert_eq!(stacks.len(), 3);
        for stack in stacks {
            memory.free_stack(stack);
        }
        assert_eq!(memory.live_stacks(), 0);
    }
}
