// src/kernel/platform.rs
//! プラットフォーム操作テーブル
//!
//! カーネルが実行環境ごとに差し替える低レベル操作（タイマ較正、アイドル、
//! セカンダリ CPU 起動、電源断など）の抽象化。
//!
//! # バックエンド
//!
//! - [`BareMetal`]: 実ハードウェアを直接操作するデフォルト実装
//! - `HypercallBackend`: Akaros ハイパーコールによる実装
//!   (`kernel::paravirt`)
//!
//! バックエンドは起動時に一度だけ選択され、以後差し替えられません。

use bitflags::bitflags;
use raw_cpuid::CpuId;

use crate::arch::x86_64::SecondaryBoot;
use crate::arch::{ArchCpu, Cpu};
use crate::errors::{PlatformError, Result};
use crate::kernel::driver::SERIAL1;

bitflags! {
    /// プラットフォーム操作テーブルのスロット
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PlatformSlots: u16 {
        /// コンソール出力
        const CONSOLE = 1 << 0;
        /// TSC 周波数較正
        const CALIBRATE_TSC = 1 << 1;
        /// CPU 周波数較正
        const CALIBRATE_CPU = 1 << 2;
        /// APIC 初期化後フック
        const APIC_POST_INIT = 1 << 3;
        /// アイドル時の停止
        const IDLE_HALT = 1 << 4;
        /// 割り込み可能な停止
        const SAFE_HALT = 1 << 5;
        /// セカンダリ CPU 起動
        const WAKEUP_SECONDARY = 1 << 6;
        /// 電源断
        const POWER_OFF = 1 << 7;
        /// シャットダウン
        const SHUTDOWN = 1 << 8;
        /// システム停止
        const HALT = 1 << 9;
        /// x2APIC 利用可否の問い合わせ
        const X2APIC_AVAILABLE = 1 << 10;
        /// LAPIC タイマ周波数
        const LAPIC_TIMER_FREQUENCY = 1 << 11;
    }
}

bitflags! {
    /// カーネルが存在を前提とするレガシーデバイス・処理
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LegacyDevices: u8 {
        /// レガシー PIC のリセット時クワーク
        const PIC_RESET_QUIRK = 1 << 0;
        /// リアルタイムクロック
        const RTC = 1 << 1;
        /// i8042 キーボードコントローラ
        const I8042 = 1 << 2;
        /// 周期タイマの検査（タイマ較正ウォッチドッグ）
        const TIMER_CHECK = 1 << 3;
        /// ウォームリセットベクタ
        const WARM_RESET = 1 << 4;
    }
}

/// プラットフォーム操作
///
/// カーネルの汎用コードはこの trait 経由でのみハードウェア依存操作を呼び出します。
pub trait PlatformOps {
    /// バックエンド名
    fn name(&self) -> &'static str;

    /// 既定実装を置き換えているスロット
    fn overrides(&self) -> PlatformSlots;

    /// コンソールへ書き込み、出力したバイト数を返す
    fn console_write(&self, buf: &[u8]) -> usize;

    /// TSC 周波数 (kHz)。`None` の場合カーネル自身が較正する
    fn calibrate_tsc(&self) -> Option<u64>;

    /// CPU 周波数 (kHz)。`None` の場合カーネル自身が較正する
    fn calibrate_cpu(&self) -> Option<u64>;

    /// APIC 初期化後フック
    ///
    /// LAPIC タイマの 1 tick (jiffy) あたりのカウント数が固定されている場合に
    /// それを返します。`None` の場合カーネルが周期タイマで較正します。
    fn apic_post_init(&self) -> Option<u32>;

    /// アイドルループからの停止（割り込み可能）
    fn safe_halt(&self);

    /// 割り込みを許可しない停止
    fn idle_halt(&self);

    /// セカンダリ CPU を起動
    ///
    /// # Errors
    ///
    /// 起動手段を持たないバックエンドは `PlatformError::NotProvided` を返します。
    fn wakeup_secondary_cpu(&self, boot: &SecondaryBoot) -> Result<()>;

    /// 電源断
    fn power_off(&self) -> !;

    /// シャットダウン
    fn shutdown(&self) -> !;

    /// システム停止
    fn halt(&self) -> !;

    /// x2APIC が利用可能か
    fn x2apic_available(&self) -> bool;

    /// 有効なレガシーデバイス
    fn legacy_devices(&self) -> LegacyDevices;
}

/// ベアメタル実装
#[derive(Debug, Clone, Copy, Default)]
pub struct BareMetal;

/// 未選択時および Akaros 不在時に使われる既定バックエンド
pub static BARE_METAL: BareMetal = BareMetal;

impl PlatformOps for BareMetal {
    fn name(&self) -> &'static str {
        "bare-metal"
    }

    fn overrides(&self) -> PlatformSlots {
        PlatformSlots::empty()
    }

    fn console_write(&self, buf: &[u8]) -> usize {
        SERIAL1.lock().write_bytes(buf)
    }

    fn calibrate_tsc(&self) -> Option<u64> {
        CpuId::new()
            .get_tsc_info()
            .and_then(|info| info.tsc_frequency())
            .map(|hz| hz / 1000)
    }

    fn calibrate_cpu(&self) -> Option<u64> {
        CpuId::new()
            .get_processor_frequency_info()
            .map(|info| u64::from(info.processor_base_frequency()) * 1000)
            .filter(|&khz| khz != 0)
    }

    fn apic_post_init(&self) -> Option<u32> {
        None
    }

    fn safe_halt(&self) {
        ArchCpu::enable_and_halt();
    }

    fn idle_halt(&self) {
        ArchCpu::halt();
    }

    /// ベアメタルの起動シーケンスは APIC ドライバの担当
    fn wakeup_secondary_cpu(&self, _boot: &SecondaryBoot) -> Result<()> {
        Err(PlatformError::NotProvided.into())
    }

    fn power_off(&self) -> ! {
        ArchCpu::disable_interrupts();
        crate::hlt_loop()
    }

    fn shutdown(&self) -> ! {
        self.power_off()
    }

    fn halt(&self) -> ! {
        ArchCpu::disable_interrupts();
        crate::hlt_loop()
    }

    fn x2apic_available(&self) -> bool {
        CpuId::new()
            .get_feature_info()
            .is_some_and(|info| info.has_x2apic())
    }

    fn legacy_devices(&self) -> LegacyDevices {
        LegacyDevices::all()
    }
}

/// ハイパーバイザゲスト記述子
///
/// カーネルの「どのハイパーバイザ上で動いているか」の選択ロジックが
/// 候補を列挙するためのインターフェース。
pub trait HypervisorGuest {
    /// ハイパーバイザ名
    fn name(&self) -> &'static str;

    /// このハイパーバイザ上で動作しているか
    fn detect(&self) -> bool;

    /// x2APIC が利用可能か
    fn x2apic_available(&self) -> bool;

    /// プラットフォーム操作を設定
    ///
    /// # Errors
    ///
    /// 既に設定済みの場合にエラーを返します。
    fn init_platform(&self) -> Result<()>;
}

/// 最初に検出されたハイパーバイザを選択
///
/// 検出は各候補につき一度だけ行われ、見つからなければ `None`（ベアメタル）。
pub fn select_hypervisor<'a>(
    candidates: &[&'a dyn HypervisorGuest],
) -> Option<&'a dyn HypervisorGuest> {
    candidates.iter().copied().find(|guest| guest.detect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_metal_overrides_nothing() {
        assert!(BARE_METAL.overrides().is_empty());
        assert_eq!(BARE_METAL.legacy_devices(), LegacyDevices::all());
        assert_eq!(BARE_METAL.apic_post_init(), None);
        assert_eq!(BARE_METAL.name(), "bare-metal");
    }

    #[test]
    fn test_bare_metal_leaves_secondary_start_to_apic_driver() {
        use x86_64::VirtAddr;

        let boot = SecondaryBoot {
            apic_id: 1,
            trampoline: 0x8000,
            stack_top: VirtAddr::new(0x20_0000),
        };
        assert_eq!(
            BARE_METAL.wakeup_secondary_cpu(&boot),
            Err(crate::errors::ParavirtError::Platform(PlatformError::NotProvided))
        );
    }

    #[test]
    fn test_slot_count() {
        assert_eq!(PlatformSlots::all().iter().count(), 12);
        assert_eq!(LegacyDevices::all().iter().count(), 5);
    }

    struct Fixed {
        name: &'static str,
        present: bool,
    }

    impl HypervisorGuest for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn detect(&self) -> bool {
            self.present
        }

        fn x2apic_available(&self) -> bool {
            false
        }

        fn init_platform(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_select_first_detected() {
        let a = Fixed { name: "A", present: false };
        let b = Fixed { name: "B", present: true };
        let c = Fixed { name: "C", present: true };

        let selected = select_hypervisor(&[&a, &b, &c]).map(|g| g.name());
        assert_eq!(selected, Some("B"));
        assert!(select_hypervisor(&[&a]).is_none());
    }
}
