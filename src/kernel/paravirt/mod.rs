// src/kernel/paravirt/mod.rs
//! Akaros 準仮想化レイヤー
//!
//! 検出プローブの結果に応じて、プラットフォーム操作のバックエンドを
//! ベアメタルかハイパーコールのどちらかに一度だけ決定します。
//!
//! # 状態遷移
//!
//! ```text
//! Uninitialized ──detect()──> DetectedAbsent                  (終端)
//!               └─detect()──> DetectedPresent ──init_platform()──> Bound (終端)
//! ```
//!
//! `DetectedAbsent` ではバインディングを一切インストールせず、
//! ハイパーコールも発行しません。

pub mod console;
pub mod idle;
pub mod power;
pub mod smp;
pub mod timer;


use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use raw_cpuid::CpuIdReader;
use spin::Once;

use crate::arch::x86_64::{DetectionState, Hypercall, HypervisorProbe, SecondaryBoot, WaitPrimitive};
use crate::config::GuestConfig;
use crate::constants::AKAROS_NAME;
use crate::errors::{InitError, Result};
use crate::kernel::platform::{
    BARE_METAL, HypervisorGuest, LegacyDevices, PlatformOps, PlatformSlots,
};

pub use console::{BOOT_CONSOLE_NAME, HypercallConsole};
pub use idle::MonitorIdle;
pub use power::HypercallPower;
pub use smp::SecondaryWake;
pub use timer::{TimerCalibration, lapic_timer_period};

/// いずれかの `Paravirt` が Akaros をバインドしたか
static AKAROS_TOP: AtomicBool = AtomicBool::new(false);

/// `akaros_para_top`: Akaros がトップレベルのハイパーバイザとして選択されたか
pub fn para_top() -> bool {
    AKAROS_TOP.load(Ordering::Acquire)
}

/// オーケストレータの状態
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParavirtState {
    /// 検出前
    Uninitialized = 0,
    /// Akaros 不在（ベアメタルのまま）
    DetectedAbsent = 1,
    /// Akaros 検出済み、未バインド
    DetectedPresent = 2,
    /// バインディングをインストール済み
    Bound = 3,
}

impl ParavirtState {
    /// 許可される遷移か
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized, Self::DetectedAbsent)
                | (Self::Uninitialized, Self::DetectedPresent)
                | (Self::DetectedPresent, Self::Bound)
        )
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::DetectedAbsent,
            2 => Self::DetectedPresent,
            3 => Self::Bound,
            _ => Self::Uninitialized,
        }
    }
}

/// ハイパーコールによるプラットフォーム操作
#[derive(Debug)]
pub struct HypercallBackend<'h, H: Hypercall, W: WaitPrimitive> {
    console: HypercallConsole<'h, H>,
    idle: MonitorIdle<'h, W>,
    timer: TimerCalibration<'h, H>,
    wake: SecondaryWake<'h, H>,
    power: HypercallPower<'h, H>,
    lapic_period: u32,
}

impl<'h, H: Hypercall, W: WaitPrimitive> HypercallBackend<'h, H, W> {
    /// 全バインディングを構築
    pub fn new(host: &'h H, wait: &'h W, detection: DetectionState, hz: u32) -> Self {
        Self {
            console: HypercallConsole::new(host, detection),
            idle: MonitorIdle::new(wait),
            timer: TimerCalibration::new(host),
            wake: SecondaryWake::new(host),
            power: HypercallPower::new(host),
            lapic_period: lapic_timer_period(hz),
        }
    }
}

impl<H: Hypercall, W: WaitPrimitive> PlatformOps for HypercallBackend<'_, H, W> {
    fn name(&self) -> &'static str {
        AKAROS_NAME
    }

    fn overrides(&self) -> PlatformSlots {
        PlatformSlots::all()
    }

    fn console_write(&self, buf: &[u8]) -> usize {
        self.console.write(buf, buf.len())
    }

    fn calibrate_tsc(&self) -> Option<u64> {
        Some(self.timer.calibrate_tsc())
    }

    fn calibrate_cpu(&self) -> Option<u64> {
        Some(self.timer.calibrate_cpu())
    }

    fn apic_post_init(&self) -> Option<u32> {
        Some(self.lapic_period)
    }

    fn safe_halt(&self) {
        self.idle.safe_halt();
    }

    fn idle_halt(&self) {
        self.idle.halt();
    }

    fn wakeup_secondary_cpu(&self, boot: &SecondaryBoot) -> Result<()> {
        self.wake.wakeup_secondary_cpu(boot)
    }

    fn power_off(&self) -> ! {
        self.power.power_off()
    }

    fn shutdown(&self) -> ! {
        self.power.shutdown()
    }

    fn halt(&self) -> ! {
        self.power.halt()
    }

    fn x2apic_available(&self) -> bool {
        true
    }

    fn legacy_devices(&self) -> LegacyDevices {
        LegacyDevices::empty()
    }
}

/// 選択されたバックエンド
#[derive(Debug)]
pub enum Backend<'h, H: Hypercall, W: WaitPrimitive> {
    /// ベアメタル
    BareMetal,
    /// Akaros ハイパーコール
    Hypercall(HypercallBackend<'h, H, W>),
}

impl<H: Hypercall, W: WaitPrimitive> Backend<'_, H, W> {
    /// プラットフォーム操作として取得
    pub fn ops(&self) -> &dyn PlatformOps {
        match self {
            Self::BareMetal => &BARE_METAL,
            Self::Hypercall(backend) => backend,
        }
    }
}

/// 初期化オーケストレータ
pub struct Paravirt<'h, R: CpuIdReader, H: Hypercall, W: WaitPrimitive> {
    probe: &'h HypervisorProbe<R>,
    host: &'h H,
    wait: &'h W,
    config: GuestConfig,
    state: AtomicU8,
    selected: AtomicBool,
    backend: Once<Backend<'h, H, W>>,
}

impl<'h, R: CpuIdReader, H: Hypercall, W: WaitPrimitive> Paravirt<'h, R, H, W> {
    /// オーケストレータを作成（ハードウェアには触れない）
    pub const fn new(
        probe: &'h HypervisorProbe<R>,
        host: &'h H,
        wait: &'h W,
        config: GuestConfig,
    ) -> Self {
        Self {
            probe,
            host,
            wait,
            config,
            state: AtomicU8::new(ParavirtState::Uninitialized as u8),
            selected: AtomicBool::new(false),
            backend: Once::new(),
        }
    }

    /// 現在の状態
    pub fn state(&self) -> ParavirtState {
        ParavirtState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ParavirtState, to: ParavirtState) -> Result<()> {
        if !from.can_transition_to(to) {
            log::warn!("paravirt: rejected transition {:?} -> {:?}", from, to);
            return Err(InitError::InvalidTransition.into());
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| InitError::InvalidTransition.into())
    }

    /// `nopv` 指定時はプローブを実行せず不在とみなす
    fn detection(&self) -> DetectionState {
        if self.config.paravirt {
            self.probe.detect()
        } else {
            DetectionState::Absent
        }
    }

    /// Akaros を検出
    ///
    /// 初回呼び出しで `Uninitialized` から `DetectedAbsent` か
    /// `DetectedPresent` へ遷移します。以降は同じ結果を返すだけです。
    pub fn detect(&self) -> DetectionState {
        let detection = self.detection();
        if self.state() == ParavirtState::Uninitialized {
            let next = if detection.is_present() {
                ParavirtState::DetectedPresent
            } else {
                ParavirtState::DetectedAbsent
            };
            // 他 CPU が先に遷移させた場合も結果は同じ
            let _ = self.transition(ParavirtState::Uninitialized, next);
        }
        detection
    }

    /// バックエンドを選択しプラットフォーム操作を返す
    ///
    /// Akaros 検出時は全スロットをハイパーコール実装に置き換え、LAPIC タイマ
    /// 周期を固定し、レガシーデバイスを無効化して `Bound` に遷移します。
    /// 不在時はベアメタル実装を選ぶだけで、他の副作用はありません。
    ///
    /// # Errors
    ///
    /// 2 回目以降の呼び出しは `InitError::AlreadyInitialized` を返します。
    pub fn init_platform(&self) -> Result<&dyn PlatformOps> {
        if self.selected.swap(true, Ordering::AcqRel) {
            return Err(InitError::AlreadyInitialized.into());
        }

        let detection = self.detect();
        let backend = self.backend.call_once(|| {
            if detection.is_present() {
                Backend::Hypercall(HypercallBackend::new(
                    self.host,
                    self.wait,
                    detection,
                    self.config.hz,
                ))
            } else {
                Backend::BareMetal
            }
        });

        if let Backend::Hypercall(ref hypercall) = *backend {
            self.transition(ParavirtState::DetectedPresent, ParavirtState::Bound)?;
            AKAROS_TOP.store(true, Ordering::Release);
            log::info!(
                "akaros: bound platform ops, lapic period {} ticks at {} Hz",
                hypercall.lapic_period,
                self.config.hz
            );
            log::debug!("akaros: legacy devices disabled: {:?}", LegacyDevices::all());
        } else {
            log::info!("paravirt: running on bare metal");
        }

        Ok(backend.ops())
    }

    /// 現在のプラットフォーム操作（選択前はベアメタル）
    pub fn platform(&self) -> &dyn PlatformOps {
        match self.backend.get() {
            Some(backend) => backend.ops(),
            None => &BARE_METAL,
        }
    }

    /// 置き換え済みのスロット
    pub fn installed_slots(&self) -> PlatformSlots {
        self.platform().overrides()
    }

    /// 有効なレガシーデバイス
    pub fn legacy_devices(&self) -> LegacyDevices {
        self.platform().legacy_devices()
    }

    /// x2APIC 利用可否（検出結果に連動）
    pub fn x2apic_available(&self) -> bool {
        self.detection().is_present()
    }

    /// ハイパーコールプリミティブ
    pub const fn host(&self) -> &'h H {
        self.host
    }

    /// このオーケストレータが Akaros をバインドしたか
    pub fn is_top(&self) -> bool {
        self.state() == ParavirtState::Bound
    }

    /// ホストにトラップフレームを出力させる（Akaros 上のみ）
    pub fn trace_trapframe(&self) {
        if self.probe.state().is_present() && self.config.paravirt {
            self.host.trace_trapframe();
        }
    }
}

impl<R: CpuIdReader, H: Hypercall, W: WaitPrimitive> HypervisorGuest for Paravirt<'_, R, H, W> {
    fn name(&self) -> &'static str {
        AKAROS_NAME
    }

    fn detect(&self) -> bool {
        Paravirt::detect(self).is_present()
    }

    fn x2apic_available(&self) -> bool {
        Paravirt::x2apic_available(self)
    }

    fn init_platform(&self) -> Result<()> {
        Paravirt::init_platform(self).map(|_| ())
    }
}

impl<R: CpuIdReader, H: Hypercall, W: WaitPrimitive> core::fmt::Debug for Paravirt<'_, R, H, W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Paravirt")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
