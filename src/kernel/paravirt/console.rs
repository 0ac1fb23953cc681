// src/kernel/paravirt/console.rs
//! PRINTC ハイパーコールによるブートコンソール
//!
//! 1 文字につき 1 回ハイパーコールを発行します。バッファリング・再送・
//! まとめ書きは行いません（ホスト側ハンドラを単純に保つため）。

use core::fmt;

use crate::arch::x86_64::{DetectionState, Hypercall};

/// コンソール名
pub const BOOT_CONSOLE_NAME: &str = "akaros_boot_console";

/// ハイパーコールコンソール
#[derive(Debug)]
pub struct HypercallConsole<'h, H: Hypercall> {
    host: &'h H,
    detection: DetectionState,
}

impl<'h, H: Hypercall> HypercallConsole<'h, H> {
    /// `detection` は登録時点の検出結果
    pub const fn new(host: &'h H, detection: DetectionState) -> Self {
        Self { host, detection }
    }

    /// コンソール名
    pub const fn name(&self) -> &'static str {
        BOOT_CONSOLE_NAME
    }

    /// `buf` を最大 `len` バイト出力し、出力したバイト数を返す
    ///
    /// NUL 文字に達した時点で停止します。Akaros が検出されていない場合は
    /// 何もせず 0 を返します。
    pub fn write(&self, buf: &[u8], len: usize) -> usize {
        if !self.detection.is_present() {
            return 0;
        }

        let mut written = 0;
        for &byte in buf.iter().take(len).take_while(|&&byte| byte != 0) {
            self.host.print_char(byte);
            written += 1;
        }
        written
    }
}

impl<H: Hypercall> fmt::Write for HypercallConsole<'_, H> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes(), s.len());
        Ok(())
    }
}
