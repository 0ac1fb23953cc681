// src/arch/x86_64/cpu.rs

use crate::arch::Cpu;
use x86_64::instructions::{hlt, interrupts};

/// Bare x86_64 processor operations
#[derive(Debug, Clone, Copy)]
pub struct X86Cpu;

impl Cpu for X86Cpu {
    fn halt() {
        hlt();
    }

    fn enable_and_halt() {
        interrupts::enable_and_hlt();
    }

    fn disable_interrupts() {
        interrupts::disable();
    }

    fn enable_interrupts() {
        interrupts::enable();
    }

    fn are_interrupts_enabled() -> bool {
        interrupts::are_enabled()
    }
}

/// Read the Time Stamp Counter (TSC).
#[inline(always)]
pub fn read_timestamp() -> u64 {
    // SAFETY: RDTSC is unprivileged and has no side effects
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Read the TSC after all prior loads have completed.
///
/// The fence keeps the timestamp from being sampled before the measured
/// loop has retired.
#[inline(always)]
pub fn read_timestamp_ordered() -> u64 {
    // SAFETY: LFENCE and RDTSC are unprivileged and have no side effects
    unsafe {
        core::arch::x86_64::_mm_lfence();
        core::arch::x86_64::_rdtsc()
    }
}
