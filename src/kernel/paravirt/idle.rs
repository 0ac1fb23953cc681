// src/kernel/paravirt/idle.rs
//! MONITOR/MWAIT によるアイドル・停止
//!
//! ゲスト内の `hlt` はホストの割り込み注入と正しく同期しないため、
//! 専用キャッシュラインを MONITOR してから MWAIT で待機します。

use crate::arch::x86_64::WaitPrimitive;
use crate::arch::x86_64::mwait::MWAIT_ECX_INTERRUPT_BREAK;

/// MONITOR 対象のキャッシュライン
///
/// 他のコードから読み書きされると誤った起床が起きるため、
/// このモジュールの外には公開しません。
#[repr(C, align(64))]
struct MonitorTarget {
    _line: [u8; 64],
}

impl MonitorTarget {
    const fn new() -> Self {
        Self { _line: [0; 64] }
    }

    fn as_ptr(&self) -> *const u8 {
        (self as *const Self).cast()
    }
}

/// アイドル・停止バインディング
pub struct MonitorIdle<'w, W: WaitPrimitive> {
    target: MonitorTarget,
    wait: &'w W,
}

impl<'w, W: WaitPrimitive> MonitorIdle<'w, W> {
    /// 専用の MONITOR 対象を持つバインディングを作成
    pub const fn new(wait: &'w W) -> Self {
        Self {
            target: MonitorTarget::new(),
            wait,
        }
    }

    fn arm(&self) {
        // SAFETY: `target` は self が所有するメモリで、有効なアドレス
        unsafe { self.wait.monitor(self.target.as_ptr(), 0, 0) };
    }

    /// 割り込みで起床する停止
    pub fn safe_halt(&self) {
        self.arm();
        self.wait.mwait(0, MWAIT_ECX_INTERRUPT_BREAK, true);
    }

    /// 割り込みを許可しない停止
    pub fn halt(&self) {
        self.arm();
        self.wait.mwait(0, 0, false);
    }
}

impl<W: WaitPrimitive> core::fmt::Debug for MonitorIdle<'_, W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MonitorIdle")
            .field("target", &self.target.as_ptr())
            .finish_non_exhaustive()
    }
}
