// src/kernel/mod.rs
//! カーネル側コンポーネント
//!
//! ドライバ・ロガー・プラットフォーム操作テーブルと、その上に載る
//! Akaros 準仮想化レイヤーおよび vmexit ベンチマーク。

pub mod bench;
pub mod driver;
pub mod logger;
pub mod paravirt;
pub mod platform;
