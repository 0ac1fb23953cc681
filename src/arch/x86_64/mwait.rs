// src/arch/x86_64/mwait.rs
//! MONITOR/MWAIT wait primitive
//!
//! `MONITOR` arms an address-range monitor, `MWAIT` then parks the processor
//! until the monitored line is written or a break event arrives.

use core::arch::asm;

/// MWAIT extension: treat interrupts as break events even when masked
pub const MWAIT_ECX_INTERRUPT_BREAK: u32 = 0x1;

/// Address-monitor wait primitive
pub trait WaitPrimitive {
    /// Arm the monitor on the cache line containing `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must point into mapped kernel memory.
    unsafe fn monitor(&self, addr: *const u8, extensions: u32, hints: u32);

    /// Wait on the armed monitor.
    ///
    /// With `enable_interrupts` the wait is entered with interrupts enabled
    /// (`sti; mwait`), so a pending interrupt ends it early.
    fn mwait(&self, hints: u32, extensions: u32, enable_interrupts: bool);
}

/// The processor's own MONITOR/MWAIT instructions
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMwait;

impl WaitPrimitive for NativeMwait {
    unsafe fn monitor(&self, addr: *const u8, extensions: u32, hints: u32) {
        // SAFETY: caller guarantees `addr` is mapped; MONITOR does not
        // access the memory, it only arms the monitor hardware.
        unsafe {
            asm!(
                "monitor",
                in("rax") addr,
                in("ecx") extensions,
                in("edx") hints,
                options(nostack, preserves_flags)
            );
        }
    }

    fn mwait(&self, hints: u32, extensions: u32, enable_interrupts: bool) {
        if enable_interrupts {
            // SAFETY: STI takes effect after the next instruction, so no
            // interrupt can slip in between enabling and waiting.
            unsafe {
                asm!(
                    "sti",
                    "mwait",
                    in("eax") hints,
                    in("ecx") extensions,
                    options(nostack)
                );
            }
        } else {
            // SAFETY: MWAIT only parks the processor
            unsafe {
                asm!(
                    "mwait",
                    in("eax") hints,
                    in("ecx") extensions,
                    options(nostack, preserves_flags)
                );
            }
        }
    }
}
