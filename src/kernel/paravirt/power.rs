// src/kernel/paravirt/power.rs
//! SHUTDOWN による電源断

use crate::arch::x86_64::Hypercall;

/// 電源断バインディング
///
/// power-off、shutdown、halt のいずれも SHUTDOWN 1 回に置き換えます。
#[derive(Debug)]
pub struct HypercallPower<'h, H: Hypercall> {
    host: &'h H,
}

impl<'h, H: Hypercall> HypercallPower<'h, H> {
    /// バインディングを作成
    pub const fn new(host: &'h H) -> Self {
        Self { host }
    }

    /// 電源断
    pub fn power_off(&self) -> ! {
        log::info!("akaros: power off");
        self.host.shutdown()
    }

    /// シャットダウン
    pub fn shutdown(&self) -> ! {
        self.host.shutdown()
    }

    /// システム停止
    pub fn halt(&self) -> ! {
        self.host.shutdown()
    }
}
