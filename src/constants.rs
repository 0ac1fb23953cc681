// src/constants.rs

//! Guest constants and default configuration values
//!
//! This module centralizes the values that form the contract with the
//! Akaros host (signature, leaf window, timer frequency) together with the
//! defaults used when the kernel command line does not override them.

/// CPUID brand signature reported by Akaros in EBX/ECX/EDX
pub const AKAROS_SIGNATURE: &[u8; 12] = b"AKAROSINSIDE";

/// Name under which the guest registers with the hypervisor selection logic
pub const AKAROS_NAME: &str = "AKAROS";

/// First CPUID leaf of the hypervisor-reserved range
pub const HYPERVISOR_LEAF_BASE: u32 = 0x4000_0000;

/// End (exclusive) of the hypervisor-reserved range scanned for a signature
pub const HYPERVISOR_LEAF_END: u32 = 0x4001_0000;

/// Distance between candidate signature leaves
pub const HYPERVISOR_LEAF_STRIDE: usize = 0x100;

/// Emulated local APIC timer frequency (Hz)
///
/// Akaros emulates the LAPIC timer at exactly 1 MHz.
pub const LAPIC_TIMER_FREQUENCY_HZ: u32 = 1_000_000;

/// Default scheduler tick rate
pub const DEFAULT_HZ: u32 = 100;

/// Default iteration count of each vmexit benchmark loop
pub const DEFAULT_BENCH_ITERATIONS: u64 = 100_000;

/// COM1 base port
pub const COM1_PORT: u16 = 0x3F8;
