// src/kernel/paravirt/timer.rs
//! タイマ周波数の較正
//!
//! 仮想化環境ではハードウェアループによる較正が信頼できないため、
//! ホストが返す値をそのまま採用します。

use crate::arch::x86_64::Hypercall;
use crate::constants::LAPIC_TIMER_FREQUENCY_HZ;

/// LAPIC タイマの 1 tick (jiffy) あたりのカウント数
///
/// エミュレートされた LAPIC タイマは常に 1 MHz で動作します。
/// `hz == 0` の場合は 1 秒分のカウントを返します。
#[must_use]
pub const fn lapic_timer_period(hz: u32) -> u32 {
    match LAPIC_TIMER_FREQUENCY_HZ.checked_div(hz) {
        Some(period) => period,
        None => LAPIC_TIMER_FREQUENCY_HZ,
    }
}

/// GET_TSCFREQ による較正
#[derive(Debug)]
pub struct TimerCalibration<'h, H: Hypercall> {
    host: &'h H,
}

impl<'h, H: Hypercall> TimerCalibration<'h, H> {
    /// 較正器を作成
    pub const fn new(host: &'h H) -> Self {
        Self { host }
    }

    /// TSC 周波数 (kHz)
    pub fn calibrate_tsc(&self) -> u64 {
        self.host.get_tsc_freq()
    }

    /// CPU 周波数 (kHz)。TSC と同じ値
    pub fn calibrate_cpu(&self) -> u64 {
        self.host.get_tsc_freq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Issued, RecordingHost};

    #[test]
    fn test_host_frequency_is_authoritative() {
        let host = RecordingHost::with_tsc_khz(2500);
        let timer = TimerCalibration::new(&host);

        assert_eq!(timer.calibrate_tsc(), 2500);
        assert_eq!(timer.calibrate_cpu(), 2500);
        assert_eq!(host.calls(), [Issued::GetTscFreq, Issued::GetTscFreq]);
    }

    #[test]
    fn test_lapic_period() {
        assert_eq!(lapic_timer_period(100), 10_000);
        assert_eq!(lapic_timer_period(250), 4_000);
        assert_eq!(lapic_timer_period(1000), 1_000);
        assert_eq!(lapic_timer_period(0), 1_000_000);
    }
}
