// src/arch/x86_64/mod.rs
//! x86_64 architecture-specific implementations.

/// CPU operations and control.
pub mod cpu;
/// Akaros hypercall primitive (`vmcall`)
pub mod hypercall;
/// Hypervisor detection (using raw-cpuid)
pub mod detect;
/// MONITOR/MWAIT wait primitive
pub mod mwait;
/// Symmetric Multi-Processing support
pub mod smp;

pub use cpu::{X86Cpu, read_timestamp, read_timestamp_ordered};
pub use detect::{DetectionState, HypervisorProbe, PROBE, detect, para_available};
pub use hypercall::{ExitProbe, Hypercall, HypercallOpcode, VMCALL, Vmcall};
pub use mwait::{NativeMwait, WaitPrimitive};
pub use smp::{SecondaryBoot, cpu_count, secondary_entry_address, secondary_startup_64};

/// CPU implementation for this architecture
pub type ArchCpu = X86Cpu;
