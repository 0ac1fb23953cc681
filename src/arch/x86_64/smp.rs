// src/arch/x86_64/smp.rs
//! Symmetric Multi-Processing (SMP) Support
//!
//! The 64-bit entry point that secondary processors land on, and the
//! description of one processor to start.
//!
//! # Boot Sequence (Akaros)
//!
//! ```text
//! 1. BSP fills SecondaryBoot with the target APIC ID and its stack
//! 2. BSP issues SMPBOOT(secondary_startup_64, stack_top)
//! 3. Host starts the AP in long mode at secondary_startup_64, rsp = stack_top
//! 4. AP aligns its stack, reports itself online and parks
//! ```
//!
//! Bare-metal bring-up (trampoline and INIT-SIPI-SIPI) belongs to the APIC
//! driver, not to this crate.

use core::sync::atomic::{AtomicU32, Ordering};

use x86_64::VirtAddr;

/// Everything needed to start one secondary processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryBoot {
    /// Target Local APIC ID
    pub apic_id: u32,
    /// Physical address of the real-mode trampoline (bare metal only)
    pub trampoline: u64,
    /// Initial stack pointer of the target processor
    pub stack_top: VirtAddr,
}

/// Global SMP state
#[derive(Debug)]
pub struct SmpState {
    /// Number of CPUs online, BSP included
    pub cpu_count: AtomicU32,
}

impl SmpState {
    /// Create a new SMP state
    pub const fn new() -> Self {
        Self {
            cpu_count: AtomicU32::new(1), // At least BSP
        }
    }

    /// Record one more processor online, returning the new count
    fn cpu_online(&self) -> u32 {
        self.cpu_count.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for SmpState {
    fn default() -> Self {
        Self::new()
    }
}

/// Global SMP state
static SMP_STATE: SmpState = SmpState::new();

/// 64-bit entry point of every secondary processor
///
/// The host jumps here after `SMPBOOT` with `rsp` set to the processor's own
/// stack and no return address pushed, so the stack is realigned before any
/// Rust code runs.
///
/// # Safety
///
/// Only the processor start-up path may jump here.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn secondary_startup_64() -> ! {
    core::arch::naked_asm!(
        "cli",
        "and rsp, -16",
        "call {main}",
        "ud2",
        main = sym secondary_main,
    );
}

/// Parks a secondary processor
///
/// The AP has no IDT of its own, so interrupts stay masked.
extern "C" fn secondary_main() -> ! {
    let online = SMP_STATE.cpu_online();
    log::debug!("secondary cpu online ({} total)", online);

    loop {
        x86_64::instructions::hlt();
    }
}

/// Address the host jumps to when starting a secondary processor
pub fn secondary_entry_address() -> u64 {
    secondary_startup_64 as *const () as usize as u64
}

/// Get the number of online CPUs
pub fn cpu_count() -> u32 {
    SMP_STATE.cpu_count.load(Ordering::Acquire)
}
