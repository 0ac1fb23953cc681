// src/lib.rs
//! Akaros ゲスト準仮想化レイヤー
//!
//! Akaros ハイパーバイザ上で動作していることを検出し、カーネルの
//! プラットフォーム操作（コンソール、アイドル、タイマ較正、セカンダリ CPU
//! 起動、電源断）をハイパーコール実装に置き換えます。検出できなければ
//! ベアメタル実装のまま何も変更しません。
//!
//! # 構成
//!
//! - [`arch`]: `vmcall` プリミティブ、CPUID による検出、MONITOR/MWAIT、SMP
//! - [`kernel::platform`]: プラットフォーム操作テーブル
//! - [`kernel::paravirt`]: バインディングと初期化オーケストレータ
//! - [`kernel::bench`]: vmexit ベンチマーク

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod arch;
pub mod config;
pub mod constants;
pub mod errors;
pub mod kernel;

#[cfg(test)]
mod testing;

use crate::arch::{ArchCpu, Cpu};

pub use config::GuestConfig;
pub use errors::{ParavirtError, Result};
pub use kernel::paravirt::{Paravirt, ParavirtState, para_top};
pub use kernel::platform::{PlatformOps, PlatformSlots};

/// print! マクロ - 設定済みコンソールへ出力
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::kernel::driver::write_console(format_args!($($arg)*))
    };
}

/// println! マクロ
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// debug_print! マクロ - コンソール未設定時はシリアルへ直接出力
#[macro_export]
macro_rules! debug_print {
    ($($arg:tt)*) => {
        $crate::kernel::driver::write_debug(format_args!($($arg)*))
    };
}

/// debug_println! マクロ
#[macro_export]
macro_rules! debug_println {
    () => ($crate::debug_print!("\n"));
    ($($arg:tt)*) => ($crate::debug_print!("{}\n", format_args!($($arg)*)));
}

/// CPU を停止し続ける
pub fn hlt_loop() -> ! {
    loop {
        ArchCpu::halt();
    }
}
