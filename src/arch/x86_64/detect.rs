// src/arch/x86_64/detect.rs
//! Hypervisor detection using raw-cpuid
//!
//! The probe answers one question, "is Akaros hosting this guest?", and
//! caches the answer for the rest of the boot. The first query runs on the
//! boot processor after CPU feature detection and before secondaries are
//! started, so every later reader sees the resolved value.
//!
//! # Probe sequence
//!
//! ```text
//! 1. CPUID.1:ECX[31] (hypervisor present) clear -> Absent, nothing else queried
//! 2. for base in 0x4000_0000..0x4001_0000 step 0x100:
//!        CPUID(base).EBX:ECX:EDX == "AKAROSINSIDE" -> Present { base }
//! 3. no match -> Absent
//! ```

use raw_cpuid::{CpuId, CpuIdReader, CpuIdReaderNative, CpuIdResult};
use spin::Once;

use crate::constants::{
    AKAROS_SIGNATURE, HYPERVISOR_LEAF_BASE, HYPERVISOR_LEAF_END, HYPERVISOR_LEAF_STRIDE,
};

/// Result of the detection probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    /// Probe has not run yet
    Unknown,
    /// Not running on Akaros
    Absent,
    /// Running on Akaros; `base` is the leaf carrying the signature
    Present {
        /// CPUID leaf at which the signature was found
        base: u32,
    },
}

impl DetectionState {
    /// Whether Akaros was detected
    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Whether the probe has produced a final answer
    #[inline]
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Signature leaf, if Akaros was detected
    #[inline]
    #[must_use]
    pub const fn base(self) -> Option<u32> {
        match self {
            Self::Present { base } => Some(base),
            _ => None,
        }
    }
}

/// Memoized hypervisor probe
pub struct HypervisorProbe<R: CpuIdReader = CpuIdReaderNative> {
    reader: R,
    signature: &'static [u8; 12],
    result: Once<DetectionState>,
}

impl HypervisorProbe<CpuIdReaderNative> {
    /// Probe for Akaros on the executing processor
    #[must_use]
    pub const fn native() -> Self {
        Self::with_reader(CpuIdReaderNative, AKAROS_SIGNATURE)
    }
}

impl<R: CpuIdReader> HypervisorProbe<R> {
    /// Probe for `signature` through a custom CPUID reader
    #[must_use]
    pub const fn with_reader(reader: R, signature: &'static [u8; 12]) -> Self {
        Self {
            reader,
            signature,
            result: Once::new(),
        }
    }

    /// Detect the hypervisor and cache the result
    ///
    /// Only the first call issues CPUID; later calls return the cached
    /// value. Never returns [`DetectionState::Unknown`].
    pub fn detect(&self) -> DetectionState {
        *self.result.call_once(|| {
            let state = self.probe();
            log::info!("hypervisor probe: {:?}", state);
            state
        })
    }

    /// Cached result without triggering the probe
    #[must_use]
    pub fn state(&self) -> DetectionState {
        self.result.get().copied().unwrap_or(DetectionState::Unknown)
    }

    /// Whether the paravirt interface is usable
    pub fn is_available(&self) -> bool {
        self.detect().is_present()
    }

    fn probe(&self) -> DetectionState {
        let cpuid = CpuId::with_cpuid_reader(self.reader.clone());

        // The hypervisor leaves are only defined when this bit is set
        let has_hypervisor = cpuid
            .get_feature_info()
            .is_some_and(|info| info.has_hypervisor());
        if !has_hypervisor {
            return DetectionState::Absent;
        }

        find_signature(&self.reader, self.signature, 0)
            .map_or(DetectionState::Absent, |base| DetectionState::Present { base })
    }
}

impl<R: CpuIdReader> core::fmt::Debug for HypervisorProbe<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HypervisorProbe")
            .field("signature", &self.signature)
            .field("state", &self.state())
            .finish()
    }
}

/// Scan the hypervisor leaf window for `signature`
///
/// Returns the first base leaf whose vendor registers spell the signature
/// and which advertises at least `min_leaves` leaves after itself
/// (`min_leaves == 0` accepts any count).
pub fn find_signature<R: CpuIdReader>(
    reader: &R,
    signature: &[u8; 12],
    min_leaves: u32,
) -> Option<u32> {
    (HYPERVISOR_LEAF_BASE..HYPERVISOR_LEAF_END)
        .step_by(HYPERVISOR_LEAF_STRIDE)
        .find(|&base| {
            let regs = reader.cpuid1(base);
            signature_of(&regs) == *signature
                && (min_leaves == 0 || regs.eax.wrapping_sub(base) >= min_leaves)
        })
}

/// Vendor signature carried in EBX, ECX, EDX (in that order)
fn signature_of(regs: &CpuIdResult) -> [u8; 12] {
    let mut sig = [0u8; 12];
    sig[0..4].copy_from_slice(&regs.ebx.to_le_bytes());
    sig[4..8].copy_from_slice(&regs.ecx.to_le_bytes());
    sig[8..12].copy_from_slice(&regs.edx.to_le_bytes());
    sig
}

/// Global probe for the executing guest
pub static PROBE: HypervisorProbe = HypervisorProbe::native();

/// Detect Akaros on this boot
pub fn detect() -> DetectionState {
    PROBE.detect()
}

/// `akaros_para_available`: whether the Akaros paravirt interface is usable
pub fn para_available() -> bool {
    PROBE.is_available()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCpuId;

    #[test]
    fn test_unknown_before_probe() {
        let probe = HypervisorProbe::with_reader(FakeCpuId::akaros(0x4000_0000), AKAROS_SIGNATURE);
        assert_eq!(probe.state(), DetectionState::Unknown);
        assert!(!probe.state().is_resolved());
    }

    #[test]
    fn test_flag_clear_short_circuits() {
        let reader = FakeCpuId::bare_metal();
        let probe = HypervisorProbe::with_reader(reader.clone(), AKAROS_SIGNATURE);

        assert_eq!(probe.detect(), DetectionState::Absent);
        assert_eq!(reader.hypervisor_queries(), 0);
    }

    #[test]
    fn test_signature_match() {
        let probe = HypervisorProbe::with_reader(FakeCpuId::akaros(0x4000_0000), AKAROS_SIGNATURE);
        assert_eq!(probe.detect(), DetectionState::Present { base: 0x4000_0000 });
        assert!(probe.is_available());
    }

    #[test]
    fn test_signature_at_later_leaf() {
        // e.g. nested under another hypervisor that owns 0x4000_0000
        let probe = HypervisorProbe::with_reader(FakeCpuId::akaros(0x4000_0200), AKAROS_SIGNATURE);
        assert_eq!(probe.detect().base(), Some(0x4000_0200));
    }

    #[test]
    fn test_other_hypervisor_is_absent() {
        let reader = FakeCpuId::with_signature(0x4000_0000, *b"KVMKVMKVM\0\0\0");
        let probe = HypervisorProbe::with_reader(reader.clone(), AKAROS_SIGNATURE);

        assert_eq!(probe.detect(), DetectionState::Absent);
        // the whole window was scanned
        assert_eq!(reader.hypervisor_queries(), 0x100);
    }

    #[test]
    fn test_detect_is_memoized() {
        let reader = FakeCpuId::akaros(0x4000_0000);
        let probe = HypervisorProbe::with_reader(reader.clone(), AKAROS_SIGNATURE);

        let first = probe.detect();
        let queries = reader.total_queries();
        for _ in 0..10 {
            assert_eq!(probe.detect(), first);
        }
        assert_eq!(reader.total_queries(), queries);
        assert_eq!(probe.state(), first);
    }

    #[test]
    fn test_find_signature_min_leaves() {
        let reader = FakeCpuId::akaros(0x4000_0000).with_max_leaf(0x4000_0001);
        assert_eq!(find_signature(&reader, AKAROS_SIGNATURE, 1), Some(0x4000_0000));
        assert_eq!(find_signature(&reader, AKAROS_SIGNATURE, 2), None);
    }
}
