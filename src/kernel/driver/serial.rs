// src/kernel/driver/serial.rs
//! Serial ポートドライバ (UART 16550)
//!
//! ベアメタル環境でのコンソール出力先。Akaros 上では PRINTC
//! ハイパーコールに置き換えられます。

use core::fmt;

use spin::Mutex;
use x86_64::instructions::port::{Port, PortReadOnly};

use crate::constants::COM1_PORT;
use crate::errors::{Result, SerialError};

/// 送信待ちの最大ポーリング回数
const TX_TIMEOUT: usize = 100_000;

/// Serial ポート
#[derive(Debug)]
pub struct SerialPort {
    data: Port<u8>,
    int_enable: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_status: PortReadOnly<u8>,
}

impl SerialPort {
    /// 指定ベースポートの UART を作成
    pub const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            int_enable: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_status: PortReadOnly::new(base + 5),
        }
    }

    /// COM1 を作成 (0x3F8)
    pub const fn com1() -> Self {
        Self::new(COM1_PORT)
    }

    /// UART を初期化 (38400 baud, 8N1, FIFO 有効)
    pub fn init(&mut self) {
        // SAFETY: UART 16550 の標準的な初期化シーケンス。
        // 各レジスタはベースポートからの固定オフセットで定義されている。
        unsafe {
            // 割り込み無効化
            self.int_enable.write(0x00);
            // DLAB を立てて分周比 3 を設定
            self.line_ctrl.write(0x80);
            self.data.write(0x03);
            self.int_enable.write(0x00);
            // 8N1
            self.line_ctrl.write(0x03);
            // FIFO 有効化
            self.fifo_ctrl.write(0xC7);
            // DTR/RTS 設定
            self.modem_ctrl.write(0x0B);
        }
    }

    /// 送信バッファが空か確認
    fn is_tx_empty(&mut self) -> bool {
        // SAFETY: ライン状態レジスタのビット5は送信保持レジスタ空を示す
        unsafe { self.line_status.read() & 0x20 != 0 }
    }

    /// 1バイト書き込み
    ///
    /// # Errors
    ///
    /// 送信バッファが空かないまま待ち時間を超えた場合 `SerialError::Timeout`
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        for _ in 0..TX_TIMEOUT {
            if self.is_tx_empty() {
                // SAFETY: 送信バッファが空であることを確認済み
                unsafe { self.data.write(byte) };
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(SerialError::Timeout.into())
    }

    /// バイト列を書き込み、書き込めたバイト数を返す
    pub fn write_bytes(&mut self, buf: &[u8]) -> usize {
        buf.iter()
            .take_while(|&&byte| self.write_byte(byte).is_ok())
            .count()
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

/// グローバル Serial ポート (const 初期化可能)
pub static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::com1());
