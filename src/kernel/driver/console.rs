// src/kernel/driver/console.rs
//! コンソール抽象化レイヤー
//!
//! シリアルポートと Akaros ハイパーコールコンソールを統一的に扱うための
//! 抽象化層。パニック時のデッドロック回避機能を提供します。

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};

use spin::Mutex;

use crate::arch::x86_64::{DetectionState, VMCALL, Vmcall};
use crate::errors::{PlatformError, Result};
use crate::kernel::driver::serial::{SERIAL1, SerialPort};
use crate::kernel::paravirt::console::HypercallConsole;

/// パニックレベルの型
pub type PanicLevel = u8;

/// パニック状態の定数
pub const NORMAL: PanicLevel = 0;
/// First panic level constant.
pub const FIRST_PANIC: PanicLevel = 1;
/// Double panic level constant (recursive panic).
pub const DOUBLE_PANIC: PanicLevel = 2;

/// パニックレベル
/// 0 = 通常動作, 1 = 初回パニック, 2+ = 再帰的パニック
static PANIC_LEVEL: AtomicU8 = AtomicU8::new(NORMAL);

/// パニックレベルを1増やし、変更前の値を返す
///
/// `Ordering::Relaxed` を使用: パニックフラグは他のメモリ操作と
/// 同期する必要がない（単独のフラグとして機能）
pub fn enter_panic() -> PanicLevel {
    PANIC_LEVEL.fetch_add(1, Ordering::Relaxed)
}

/// コンソール実装ラッパー
enum ConsoleImpl {
    /// COM1 シリアル
    Serial(&'static Mutex<SerialPort>),
    /// Akaros PRINTC ハイパーコール
    Hypercall(HypercallConsole<'static, Vmcall>),
}

impl fmt::Write for ConsoleImpl {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self {
            Self::Serial(port) => port.lock().write_str(s),
            Self::Hypercall(console) => console.write_str(s),
        }
    }
}

/// 一度だけ設定できるコンソールスロット
pub struct ConsoleSlot {
    console: Mutex<Option<ConsoleImpl>>,
}

impl ConsoleSlot {
    /// 未設定のスロット
    pub const fn new() -> Self {
        Self {
            console: Mutex::new(None),
        }
    }

    fn install(&self, console: ConsoleImpl) -> Result<()> {
        let mut guard = self.console.lock();
        if guard.is_some() {
            return Err(PlatformError::SlotOccupied.into());
        }
        *guard = Some(console);
        Ok(())
    }

    fn install_hypercall(&self, detection: DetectionState) -> Result<()> {
        if !detection.is_present() {
            return Err(PlatformError::HypervisorAbsent.into());
        }
        self.install(ConsoleImpl::Hypercall(HypercallConsole::new(&VMCALL, detection)))
    }

    /// 設定済みかどうか
    pub fn is_installed(&self) -> bool {
        self.console.lock().is_some()
    }
}

impl Default for ConsoleSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConsoleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// グローバルコンソール
///
/// 一度設定されたら差し替えません。
static CONSOLE: ConsoleSlot = ConsoleSlot::new();

/// COM1 をコンソールとして設定
///
/// # Errors
///
/// 既に設定されている場合は `PlatformError::SlotOccupied` を返します。
pub fn set_serial_console() -> Result<()> {
    SERIAL1.lock().init();
    CONSOLE.install(ConsoleImpl::Serial(&SERIAL1))
}

/// Akaros のブートコンソール (`akaros_boot_console`) を設定
///
/// # Errors
///
/// - `PlatformError::HypervisorAbsent` - Akaros が検出されていない場合
/// - `PlatformError::SlotOccupied` - 既に設定されている場合
pub fn set_hypercall_console(detection: DetectionState) -> Result<()> {
    CONSOLE.install_hypercall(detection)
}

/// コンソールに書き込む
///
/// # 動作モード
///
/// - **通常時** (`NORMAL`): `try_lock()` でロックを試み、失敗したら出力をスキップ
/// - **初回パニック時** (`FIRST_PANIC`): 設定済みコンソールへベストエフォートで出力
/// - **二重パニック以降** (`DOUBLE_PANIC+`): 何も出力しない（無限ループ防止）
pub fn write_console(args: fmt::Arguments<'_>) {
    if PANIC_LEVEL.load(Ordering::Relaxed) >= DOUBLE_PANIC {
        return;
    }
    if let Some(mut guard) = CONSOLE.console.try_lock()
        && let Some(ref mut console) = *guard
    {
        let _ = console.write_fmt(args);
    }
}

/// デバッグ出力
///
/// コンソールが設定済みならそちらへ、未設定ならシリアルポートへ直接出力します。
/// `try_lock()` が失敗した場合は出力をスキップします（安全性優先）。
pub fn write_debug(args: fmt::Arguments<'_>) {
    if PANIC_LEVEL.load(Ordering::Relaxed) > DOUBLE_PANIC {
        return;
    }
    if let Some(mut guard) = CONSOLE.console.try_lock() {
        match *guard {
            Some(ref mut console) => {
                let _ = console.write_fmt(args);
            }
            None => {
                if let Some(mut serial) = SERIAL1.try_lock() {
                    let _ = serial.write_fmt(args);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParavirtError;

    const PRESENT: DetectionState = DetectionState::Present { base: 0x4000_0000 };

    #[test]
    fn test_hypercall_console_requires_akaros() {
        let slot = ConsoleSlot::new();

        let err = slot.install_hypercall(DetectionState::Absent).unwrap_err();
        assert_eq!(err, ParavirtError::Platform(PlatformError::HypervisorAbsent));
        assert!(!slot.is_installed());
    }

    #[test]
    fn test_console_is_single_assignment() {
        let slot = ConsoleSlot::new();

        slot.install_hypercall(PRESENT).unwrap();
        assert!(slot.is_installed());

        let err = slot.install_hypercall(PRESENT).unwrap_err();
        assert_eq!(err, ParavirtError::Platform(PlatformError::SlotOccupied));
        let err = slot.install(ConsoleImpl::Serial(&SERIAL1)).unwrap_err();
        assert_eq!(err, ParavirtError::Platform(PlatformError::SlotOccupied));
    }

    #[test]
    fn test_serial_console_blocks_hypercall_console() {
        let slot = ConsoleSlot::new();

        slot.install(ConsoleImpl::Serial(&SERIAL1)).unwrap();
        let err = slot.install_hypercall(PRESENT).unwrap_err();
        assert_eq!(err, ParavirtError::Platform(PlatformError::SlotOccupied));
    }
}
