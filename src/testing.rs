// src/testing.rs
//! Host-side test doubles
//!
//! Unit tests run on the build machine, so nothing here traps, touches ports
//! or executes MONITOR/MWAIT. Each double records what it was asked to do.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use raw_cpuid::{CpuIdReader, CpuIdResult};
use spin::Mutex;

use crate::arch::x86_64::{ExitProbe, Hypercall, WaitPrimitive};
use crate::constants::{AKAROS_SIGNATURE, HYPERVISOR_LEAF_BASE, HYPERVISOR_LEAF_END};
use crate::kernel::bench::Clock;

/// A hypercall as observed by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issued {
    PrintChar(u8),
    SmpBoot { entry: u64, stack: u64 },
    GetTscFreq,
    TraceTrapFrame,
    Shutdown,
    ExitProbe(u64),
}

/// Records every hypercall instead of trapping
///
/// `shutdown` records the call and then panics, standing in for a host that
/// never resumes the guest.
#[derive(Debug, Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<Issued>>,
    tsc_khz: u64,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that answers GET_TSCFREQ with `khz`
    pub fn with_tsc_khz(khz: u64) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            tsc_khz: khz,
        }
    }

    pub fn calls(&self) -> Vec<Issued> {
        self.calls.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Characters printed through PRINTC, in order
    pub fn printed(&self) -> Vec<u8> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Issued::PrintChar(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Issued) {
        self.calls.lock().push(call);
    }
}

impl Hypercall for RecordingHost {
    fn print_char(&self, c: u8) {
        self.record(Issued::PrintChar(c));
    }

    fn smp_boot(&self, entry: u64, stack: u64) {
        self.record(Issued::SmpBoot { entry, stack });
    }

    fn get_tsc_freq(&self) -> u64 {
        self.record(Issued::GetTscFreq);
        self.tsc_khz
    }

    fn trace_trapframe(&self) {
        self.record(Issued::TraceTrapFrame);
    }

    fn shutdown(&self) -> ! {
        self.record(Issued::Shutdown);
        panic!("guest shut down");
    }

    fn exit_probe(&self, probe: ExitProbe) {
        self.record(Issued::ExitProbe(probe.number()));
    }
}

/// A MONITOR or MWAIT as observed by the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    Monitor {
        addr: usize,
    },
    Mwait {
        hints: u32,
        extensions: u32,
        enable_interrupts: bool,
    },
}

/// Records MONITOR/MWAIT instead of executing them
#[derive(Debug, Default)]
pub struct RecordingWait {
    events: Mutex<Vec<WaitEvent>>,
}

impl RecordingWait {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WaitEvent> {
        self.events.lock().clone()
    }
}

impl WaitPrimitive for RecordingWait {
    unsafe fn monitor(&self, addr: *const u8, _extensions: u32, _hints: u32) {
        self.events.lock().push(WaitEvent::Monitor {
            addr: addr as usize,
        });
    }

    fn mwait(&self, hints: u32, extensions: u32, enable_interrupts: bool) {
        self.events.lock().push(WaitEvent::Mwait {
            hints,
            extensions,
            enable_interrupts,
        });
    }
}

/// Scripted CPUID with query counters
///
/// Clones share their counters, so a test can keep one copy while the probe
/// owns another.
#[derive(Debug, Clone)]
pub struct FakeCpuId {
    hypervisor_bit: bool,
    signature: Option<(u32, [u8; 12])>,
    max_leaf: Option<u32>,
    hypervisor_queries: Arc<AtomicUsize>,
    total_queries: Arc<AtomicUsize>,
}

impl FakeCpuId {
    fn new(hypervisor_bit: bool, signature: Option<(u32, [u8; 12])>) -> Self {
        Self {
            hypervisor_bit,
            signature,
            max_leaf: None,
            hypervisor_queries: Arc::new(AtomicUsize::new(0)),
            total_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Akaros advertising its signature at `base`
    pub fn akaros(base: u32) -> Self {
        Self::with_signature(base, *AKAROS_SIGNATURE)
    }

    /// Physical machine: hypervisor bit clear, no signature
    pub fn bare_metal() -> Self {
        Self::new(false, None)
    }

    /// Some hypervisor advertising `signature` at `base`
    pub fn with_signature(base: u32, signature: [u8; 12]) -> Self {
        Self::new(true, Some((base, signature)))
    }

    /// Highest leaf reported in EAX of the signature leaf
    pub fn with_max_leaf(mut self, max_leaf: u32) -> Self {
        self.max_leaf = Some(max_leaf);
        self
    }

    pub fn hypervisor_queries(&self) -> usize {
        self.hypervisor_queries.load(Ordering::SeqCst)
    }

    pub fn total_queries(&self) -> usize {
        self.total_queries.load(Ordering::SeqCst)
    }
}

fn words(bytes: &[u8; 12]) -> (u32, u32, u32) {
    let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    (word(0), word(4), word(8))
}

const EMPTY: CpuIdResult = CpuIdResult {
    eax: 0,
    ebx: 0,
    ecx: 0,
    edx: 0,
};

impl CpuIdReader for FakeCpuId {
    fn cpuid2(&self, eax: u32, _ecx: u32) -> CpuIdResult {
        self.total_queries.fetch_add(1, Ordering::SeqCst);

        match eax {
            0 => {
                let (ebx, edx, ecx) = words(b"GenuineIntel");
                CpuIdResult {
                    eax: 0x16,
                    ebx,
                    ecx,
                    edx,
                }
            }
            1 => CpuIdResult {
                ecx: if self.hypervisor_bit { 1 << 31 } else { 0 },
                ..EMPTY
            },
            leaf if (HYPERVISOR_LEAF_BASE..HYPERVISOR_LEAF_END).contains(&leaf) => {
                self.hypervisor_queries.fetch_add(1, Ordering::SeqCst);
                match self.signature {
                    Some((base, signature)) if base == leaf => {
                        let (ebx, ecx, edx) = words(&signature);
                        CpuIdResult {
                            eax: self.max_leaf.unwrap_or(base),
                            ebx,
                            ecx,
                            edx,
                        }
                    }
                    _ => EMPTY,
                }
            }
            _ => EMPTY,
        }
    }
}

/// Clock that advances by a fixed step on every read
#[derive(Debug)]
pub struct StepClock {
    next: AtomicU64,
    step: u64,
}

impl StepClock {
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}
