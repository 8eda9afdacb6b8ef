// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler Configuration
//!
//! Compile-time limits for thread state levels and event delivery, plus
//! the runtime [`SchedConfig`] handed to
//! [`KernelContext::new`](crate::kernel::context::KernelContext::new).
//!
//! # Usage
//!
//! ```rust,ignore
//! // Defaults for a single CPU
//! let config = SchedConfig::default();
//!
//! // Boot arguments override individual knobs
//! let config = SchedConfig::from_cmdline("sched.cpus=4 sched.tick_divisor=2");
//! ```
//!
//! # Event window layout
//!
//! ```text
//! event_base                     trampoline page (handler entry stub)
//! event_base + 0x1000            scratch page for tid 0, level 1
//! ...                            scratch page for tid t, level l at
//!                                + (t * MAX_NESTED_EVENTS + l - 1) * EVENT_LIMIT
//! ```

use crate::rustux::types::*;

/// ============================================================================
/// Compile-time Limits
/// ============================================================================

/// Maximum number of nested state levels (events in flight) per thread
pub const MAX_NESTED_EVENTS: usize = 16;

/// Maximum size of one serialized event, and the size of one scratch page
pub const EVENT_LIMIT: usize = 4096;

/// Largest thread id that can be given an event scratch page
pub const EVENT_TID_MAX: Tid = 255;

/// Number of round-robin priority buckets
pub const MAX_PRIORITIES: usize = 8;

/// Priority given to threads that do not ask for one
pub const DEFAULT_PRIORITY: usize = 1;

/// Maximum number of CPUs a kernel context can manage
pub const SMP_MAX_CPUS: usize = 64;

/// Size of the event window: the trampoline page plus one scratch page
/// per (tid, level) pair
pub const EVENT_WINDOW_SIZE: usize =
    0x1000 + (EVENT_TID_MAX as usize + 1) * MAX_NESTED_EVENTS * EVENT_LIMIT;

/// Whether an event window at `base` fits below the top of the address
/// space
pub const fn event_window_fits(base: VAddr) -> bool {
    base.checked_add(EVENT_WINDOW_SIZE).is_some()
}

/// Default base of the event trampoline/buffer window
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub const DEFAULT_EVENT_BASE: VAddr = 0x8000_0000;

/// Default base of the event trampoline/buffer window
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub const DEFAULT_EVENT_BASE: VAddr = 0xF000_0000;

/// Default base of the event trampoline/buffer window
#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "arm",
    target_arch = "aarch64"
)))]
pub const DEFAULT_EVENT_BASE: VAddr = 0;

/// ============================================================================
/// Runtime Configuration
/// ============================================================================

/// Runtime scheduler knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Number of CPUs with a per-processor scheduler
    pub cpu_count: usize,

    /// Reschedule on every Nth timer tick
    pub ticks_per_reschedule: u64,

    /// Base of the event trampoline/buffer window
    pub event_base: VAddr,

    /// Give every CPU a thread that drains cross-CPU add-thread requests
    pub transfer_pump: bool,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            cpu_count: 1,
            ticks_per_reschedule: 1,
            event_base: DEFAULT_EVENT_BASE,
            transfer_pump: true,
        }
    }
}

impl SchedConfig {
    /// Address of the user-mode event trampoline
    pub const fn event_trampoline(&self) -> VAddr {
        self.event_base
    }

    /// Address of the first event scratch page
    pub const fn event_handler_buffer(&self) -> VAddr {
        self.event_base + 0x1000
    }

    /// Scratch page for `tid` at (1-based) nesting `level`
    pub const fn event_buffer_for(&self, tid: Tid, level: usize) -> VAddr {
        self.event_handler_buffer()
            + ((tid as usize) * MAX_NESTED_EVENTS + (level - 1)) * EVENT_LIMIT
    }

    /// Build a configuration from `key=value` boot arguments
    ///
    /// Recognised keys are `sched.cpus`, `sched.tick_divisor`,
    /// `sched.event_base` and `sched.transfer_pump`. Numbers may be decimal
    /// or `0x` hex. A bare key counts as `true`. Unknown keys, malformed
    /// values and out-of-range values keep the default.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::default();

        for arg in cmdline.split_ascii_whitespace() {
            let (key, value) = match arg.split_once('=') {
                Some((k, v)) => (k, v),
                None => (arg, ""),
            };

            match key {
                "sched.cpus" => {
                    if let Some(n) = parse_uint(value) {
                        if n >= 1 && (n as usize) <= SMP_MAX_CPUS {
                            config.cpu_count = n as usize;
                        }
                    }
                }
                "sched.tick_divisor" => {
                    if let Some(n) = parse_uint(value) {
                        if n >= 1 {
                            config.ticks_per_reschedule = n;
                        }
                    }
                }
                "sched.event_base" => {
                    let base = parse_uint(value).and_then(|n| VAddr::try_from(n).ok());
                    if let Some(base) = base.filter(|&base| event_window_fits(base)) {
                        config.event_base = base;
                    }
                }
                "sched.transfer_pump" => {
                    config.transfer_pump = !matches!(value, "0" | "false" | "off");
                }
                _ => {}
            }
        }

        config
    }
}

/// Parse a decimal or `0x`-prefixed hex number
fn parse_uint(value: &str) -> Option<u64> {
    if value.is_empty() {
        return None;
    }

    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedConfig::default();
        assert_eq!(config.cpu_count, 1);
        assert_eq!(config.ticks_per_reschedule, 1);
        assert!(config.transfer_pump);
    }

    #[test]
    fn test_cmdline_overrides() {
        let config = SchedConfig::from_cmdline(
            "quiet sched.cpus=4 sched.tick_divisor=0x3 sched.event_base=0x80000000 sched.transfer_pump=off",
        );
        assert_eq!(config.cpu_count, 4);
        assert_eq!(config.ticks_per_reschedule, 3);
        assert_eq!(config.event_base, 0x8000_0000);
        assert!(!config.transfer_pump);
    }

    #[test]
    fn test_cmdline_rejects_bad_values() {
        let config = SchedConfig::from_cmdline("sched.cpus=0 sched.tick_divisor=zz sched.cpus=1000");
        assert_eq!(config, SchedConfig::default());
    }

    #[test]
    fn test_cmdline_rejects_event_base_near_top() {
        let config = SchedConfig::from_cmdline("sched.event_base=0xffffffffffffff00");
        assert_eq!(config.event_base, DEFAULT_EVENT_BASE);

        let top = usize::MAX - EVENT_WINDOW_SIZE;
        let config = SchedConfig::from_cmdline(&format!("sched.event_base={:#x}", top));
        assert_eq!(config.event_base, top);
        assert_eq!(
            config.event_buffer_for(EVENT_TID_MAX, MAX_NESTED_EVENTS - 1) + EVENT_LIMIT,
            top + EVENT_WINDOW_SIZE - EVENT_LIMIT
        );
    }

    #[test]
    fn test_event_buffer_layout() {
        let config = SchedConfig { event_base: 0x8000_0000, ..SchedConfig::default() };
        assert_eq!(config.event_trampoline(), 0x8000_0000);
        assert_eq!(config.event_buffer_for(0, 1), 0x8000_1000);
        assert_eq!(config.event_buffer_for(2, 3), 0x8000_1000 + (2 * 16 + 2) * 4096);
    }
}
