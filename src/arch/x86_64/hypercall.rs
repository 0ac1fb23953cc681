// src/arch/x86_64/hypercall.rs
//! Akaros hypercall primitive
//!
//! A hypercall is a single `vmcall` that traps to the host and blocks the
//! issuing processor until the host resumes it. There is no queueing and no
//! failure return: a host that does not honor a call is fatal to the guest.
//!
//! # Register convention
//!
//! ```text
//! rdi  opcode
//! rsi  first argument
//! rdx  second argument
//! rax  result (clobbered by every call)
//! ```
//!
//! | Opcode | Call | Arguments | Result |
//! |---|---|---|---|
//! | 0x1 | `PRINTC` | rsi = character | - |
//! | 0x2 | `SMPBOOT` | rsi = entry, rdx = stack | - |
//! | 0x3 | `GET_TSCFREQ` | - | rax = kHz |
//! | 0x4 | `TRACE_TF` | - | - |
//! | 0x5 | `SHUTDOWN` | - | never returns |
//!
//! Everything above the [`Hypercall`] trait is architecture independent and
//! can be driven by a recording host in tests.

use core::arch::asm;

/// Hypercall opcodes understood by the Akaros host
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypercallOpcode {
    /// Print one character on the host console
    PrintChar = 0x1,
    /// Start a secondary processor at a 64-bit entry point
    SmpBoot = 0x2,
    /// Query the guest TSC frequency in kHz
    GetTscFreq = 0x3,
    /// Dump the current trap frame on the host
    TraceTrapFrame = 0x4,
    /// Tear the guest down
    Shutdown = 0x5,
}

impl HypercallOpcode {
    /// Every opcode, in numeric order
    pub const ALL: [Self; 5] = [
        Self::PrintChar,
        Self::SmpBoot,
        Self::GetTscFreq,
        Self::TraceTrapFrame,
        Self::Shutdown,
    ];

    /// Numeric value placed in `rdi`
    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self as u64
    }

    /// Decode an opcode number
    #[must_use]
    pub const fn from_number(nr: u64) -> Option<Self> {
        match nr {
            0x1 => Some(Self::PrintChar),
            0x2 => Some(Self::SmpBoot),
            0x3 => Some(Self::GetTscFreq),
            0x4 => Some(Self::TraceTrapFrame),
            0x5 => Some(Self::Shutdown),
            _ => None,
        }
    }

    /// Number of argument registers the opcode consumes
    #[inline]
    #[must_use]
    pub const fn arg_count(self) -> usize {
        match self {
            Self::PrintChar => 1,
            Self::SmpBoot => 2,
            Self::GetTscFreq | Self::TraceTrapFrame | Self::Shutdown => 0,
        }
    }

    /// Whether the host places a result in `rax`
    #[inline]
    #[must_use]
    pub const fn has_result(self) -> bool {
        matches!(self, Self::GetTscFreq)
    }

    /// Whether control comes back to the guest
    #[inline]
    #[must_use]
    pub const fn returns(self) -> bool {
        !matches!(self, Self::Shutdown)
    }
}

/// Exit probes used by the vmexit benchmark
///
/// The host resumes each probe from a different layer, so timing them
/// separates the cost of the trap itself from the cost of each return path.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitProbe {
    /// Resumed straight from the exit stub
    Asm = 0x1337,
    /// Resumed from the host kernel
    Kernel = 0x1338,
    /// Resumed from the host kernel after unloading guest state
    KernelWithUnload = 0x1339,
    /// Resumed from the host VMM process
    Userspace = 0x1340,
}

impl ExitProbe {
    /// Every probe, in the order the benchmark runs them
    pub const ALL: [Self; 4] = [Self::Asm, Self::Kernel, Self::KernelWithUnload, Self::Userspace];

    /// Numeric value placed in `rdi`
    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self as u64
    }

    /// Human-readable name of the resume path
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Asm => "ASM",
            Self::Kernel => "kernel",
            Self::KernelWithUnload => "kernel with unload",
            Self::Userspace => "userspace",
        }
    }
}

/// Guest-to-host call interface, one method per opcode
pub trait Hypercall {
    /// `PRINTC`: print one character
    fn print_char(&self, c: u8);

    /// `SMPBOOT`: start a secondary processor at `entry` with stack `stack`
    fn smp_boot(&self, entry: u64, stack: u64);

    /// `GET_TSCFREQ`: guest TSC frequency in kHz
    fn get_tsc_freq(&self) -> u64;

    /// `TRACE_TF`: ask the host to dump the current trap frame
    fn trace_trapframe(&self);

    /// `SHUTDOWN`: tear the guest down
    fn shutdown(&self) -> !;

    /// Benchmark probe; the host resumes without doing any work
    fn exit_probe(&self, probe: ExitProbe);
}

/// `vmcall`-based hypercalls
///
/// Only meaningful once the detection probe has reported Akaros; on bare
/// metal every call raises `#UD`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vmcall;

/// The hypercall interface of the running guest
pub static VMCALL: Vmcall = Vmcall::new();

impl Vmcall {
    /// Create the hypercall interface
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn call0(nr: u64) -> u64 {
        let ret: u64;
        // SAFETY: vmcall only transfers control to the host; the host
        // preserves every register except rax, declared as an output here.
        unsafe {
            asm!(
                "vmcall",
                in("rdi") nr,
                lateout("rax") ret,
                options(nostack)
            );
        }
        ret
    }

    #[inline(always)]
    fn call1(nr: u64, a0: u64) {
        // SAFETY: see `call0`
        unsafe {
            asm!(
                "vmcall",
                in("rdi") nr,
                in("rsi") a0,
                lateout("rax") _,
                options(nostack)
            );
        }
    }

    #[inline(always)]
    fn call2(nr: u64, a0: u64, a1: u64) {
        // SAFETY: see `call0`
        unsafe {
            asm!(
                "vmcall",
                in("rdi") nr,
                in("rsi") a0,
                in("rdx") a1,
                lateout("rax") _,
                options(nostack)
            );
        }
    }
}

impl Hypercall for Vmcall {
    fn print_char(&self, c: u8) {
        Self::call1(HypercallOpcode::PrintChar.number(), u64::from(c));
    }

    fn smp_boot(&self, entry: u64, stack: u64) {
        Self::call2(HypercallOpcode::SmpBoot.number(), entry, stack);
    }

    fn get_tsc_freq(&self) -> u64 {
        Self::call0(HypercallOpcode::GetTscFreq.number())
    }

    fn trace_trapframe(&self) {
        Self::call0(HypercallOpcode::TraceTrapFrame.number());
    }

    fn shutdown(&self) -> ! {
        Self::call0(HypercallOpcode::Shutdown.number());
        // The host never resumes a guest after SHUTDOWN
        crate::hlt_loop()
    }

    fn exit_probe(&self, probe: ExitProbe) {
        Self::call0(probe.number());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_numbers() {
        let numbers: [u64; 5] = HypercallOpcode::ALL.map(HypercallOpcode::number);
        assert_eq!(numbers, [0x1, 0x2, 0x3, 0x4, 0x5]);
    }

    #[test]
    fn test_opcode_decode() {
        for op in HypercallOpcode::ALL {
            assert_eq!(HypercallOpcode::from_number(op.number()), Some(op));
        }
        assert_eq!(HypercallOpcode::from_number(0), None);
        assert_eq!(HypercallOpcode::from_number(0x1337), None);
    }

    #[test]
    fn test_opcode_arity() {
        assert_eq!(HypercallOpcode::PrintChar.arg_count(), 1);
        assert_eq!(HypercallOpcode::SmpBoot.arg_count(), 2);
        assert_eq!(HypercallOpcode::GetTscFreq.arg_count(), 0);

        assert!(HypercallOpcode::GetTscFreq.has_result());
        assert!(!HypercallOpcode::PrintChar.has_result());

        assert!(!HypercallOpcode::Shutdown.returns());
        assert!(HypercallOpcode::TraceTrapFrame.returns());
    }

    #[test]
    fn test_exit_probe_numbers() {
        let numbers: [u64; 4] = ExitProbe::ALL.map(ExitProbe::number);
        assert_eq!(numbers, [0x1337, 0x1338, 0x1339, 0x1340]);
        assert_eq!(ExitProbe::KernelWithUnload.label(), "kernel with unload");
    }
}
