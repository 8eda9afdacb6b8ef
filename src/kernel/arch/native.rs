// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Native interrupt control
//!
//! [`NativeInterrupts`] drives the interrupt flag of the CPU it runs on.
//! Platform `Machine` implementations delegate their [`ArchInterrupts`]
//! half to it.

use super::arch_traits::ArchInterrupts;

/// Interrupt flag of the executing CPU
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeInterrupts;

#[cfg(target_arch = "x86_64")]
impl ArchInterrupts for NativeInterrupts {
    fn interrupts_enabled(&self) -> bool {
        x86_64::instructions::interrupts::are_enabled()
    }

    fn set_interrupts(&self, enabled: bool) {
        if enabled {
            x86_64::instructions::interrupts::enable();
        } else {
            x86_64::instructions::interrupts::disable();
        }
    }
}

#[cfg(target_arch = "aarch64")]
impl ArchInterrupts for NativeInterrupts {
    fn interrupts_enabled(&self) -> bool {
        use aarch64_cpu::registers::*;
        !DAIF.is_set(DAIF::I)
    }

    fn set_interrupts(&self, enabled: bool) {
        use aarch64_cpu::registers::*;
        if enabled {
            DAIF.modify(DAIF::I::Unmasked);
        } else {
            DAIF.modify(DAIF::I::Masked);
        }
    }
}
