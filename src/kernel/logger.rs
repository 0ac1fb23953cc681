// src/kernel/logger.rs
//! `log` クレートのバックエンド
//!
//! レコードを `[LEVEL] target: message` 形式に整形し、
//! コンソール層 (`write_debug`) へ出力します。

use core::fmt;

use log::{LevelFilter, Log, Metadata, Record};

use crate::errors::{InitError, Result};
use crate::kernel::driver::write_debug;

/// カーネルロガー
#[derive(Debug)]
pub struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            write_debug(format_args!("{}\n", Line(record)));
        }
    }

    fn flush(&self) {}
}

/// 1レコード分の出力行
struct Line<'a, 'r>(&'a Record<'r>);

impl fmt::Display for Line<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        write!(f, "[{:<5}] {}: {}", record.level(), record.target(), record.args())
    }
}

/// ロガーを登録し、最大ログレベルを設定
///
/// # Errors
///
/// 既にロガーが登録されている場合は `InitError::AlreadyInitialized` を返します。
pub fn init(level: LevelFilter) -> Result<()> {
    log::set_logger(&LOGGER).map_err(|_| InitError::AlreadyInitialized)?;
    log::set_max_level(level);
    Ok(())
}
