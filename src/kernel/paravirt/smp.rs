// src/kernel/paravirt/smp.rs
//! SMPBOOT によるセカンダリ CPU 起動
//!
//! ホストが 64-bit エントリから直接 CPU を開始するため、リアルモードの
//! トランポリンや INIT-SIPI シーケンスは使いません。

use crate::arch::x86_64::{Hypercall, SecondaryBoot, secondary_entry_address};
use crate::errors::Result;

/// セカンダリ CPU 起動バインディング
#[derive(Debug)]
pub struct SecondaryWake<'h, H: Hypercall> {
    host: &'h H,
    entry: u64,
}

impl<'h, H: Hypercall> SecondaryWake<'h, H> {
    /// `secondary_startup_64` をエントリとして使用
    pub fn new(host: &'h H) -> Self {
        Self::with_entry(host, secondary_entry_address())
    }

    /// 任意のエントリアドレスを使用
    pub const fn with_entry(host: &'h H, entry: u64) -> Self {
        Self { host, entry }
    }

    /// エントリアドレス
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// CPU を起動
    ///
    /// SMPBOOT を 1 回だけ発行します。トランポリンアドレスは無視されます。
    /// 起動失敗はホストがゲストを停止させるため、常に `Ok(())` を返します。
    pub fn wakeup_secondary_cpu(&self, boot: &SecondaryBoot) -> Result<()> {
        log::debug!("SMPBOOT apic_id={} stack={:#x}", boot.apic_id, boot.stack_top.as_u64());
        self.host.smp_boot(self.entry, boot.stack_top.as_u64());
        Ok(())
    }
}
