// src/errors/mod.rs

//! Unified error handling module

pub mod unified;

pub use unified::{
    BenchError, ConfigError, ErrorContext, InitError, ParavirtError, PlatformError, Result,
    SerialError,
};
