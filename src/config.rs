// src/config.rs

//! Guest configuration parsed from the kernel command line
//!
//! Recognized parameters:
//!
//! | Token | Effect |
//! |---|---|
//! | `nopv` | keep bare-metal platform operations even on Akaros |
//! | `hz=<n>` | scheduler tick rate used for the LAPIC timer period (1..=1 MHz) |
//! | `vmexit_speed.nr_loops=<n>` | iterations per vmexit benchmark loop |
//! | `loglevel=<0..5>` | maximum log level (0 = off, 5 = trace) |
//!
//! Unknown tokens belong to other subsystems and are ignored.

use log::LevelFilter;

use crate::constants::{DEFAULT_BENCH_ITERATIONS, DEFAULT_HZ, LAPIC_TIMER_FREQUENCY_HZ};
use crate::errors::{ConfigError, Result};

/// Runtime configuration of the paravirt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestConfig {
    /// Allow the Akaros backend to be selected
    pub paravirt: bool,
    /// Scheduler tick rate
    pub hz: u32,
    /// Iterations per vmexit benchmark loop
    pub bench_iterations: u64,
    /// Maximum log level
    pub log_level: LevelFilter,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            paravirt: true,
            hz: DEFAULT_HZ,
            bench_iterations: DEFAULT_BENCH_ITERATIONS,
            log_level: LevelFilter::Info,
        }
    }
}

impl GuestConfig {
    /// Parse a kernel command line
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a recognized parameter carries a malformed
    /// or out-of-range value.
    pub fn parse(cmdline: &str) -> Result<Self> {
        let mut config = Self::default();

        for token in cmdline.split_whitespace() {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (token, None),
            };

            match (key, value) {
                ("nopv", None) => config.paravirt = false,
                ("hz", Some(v)) => {
                    let hz = parse_number::<u32>("hz", v)?;
                    // a period must be at least one LAPIC tick
                    if hz == 0 || hz > LAPIC_TIMER_FREQUENCY_HZ {
                        return Err(ConfigError::OutOfRange("hz").into());
                    }
                    config.hz = hz;
                }
                ("vmexit_speed.nr_loops", Some(v)) => {
                    config.bench_iterations = parse_number("vmexit_speed.nr_loops", v)?;
                }
                ("loglevel", Some(v)) => {
                    config.log_level = level_filter(parse_number("loglevel", v)?)?;
                }
                _ => {}
            }
        }

        Ok(config)
    }
}

fn parse_number<T: core::str::FromStr>(key: &'static str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(key).into())
}

fn level_filter(level: u8) -> Result<LevelFilter> {
    let filter = match level {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        _ => return Err(ConfigError::OutOfRange("loglevel").into()),
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParavirtError;

    #[test]
    fn test_empty_cmdline_uses_defaults() {
        assert_eq!(GuestConfig::parse("").unwrap(), GuestConfig::default());
    }

    #[test]
    fn test_known_parameters() {
        let config =
            GuestConfig::parse("console=ttyS0 nopv hz=250 vmexit_speed.nr_loops=42 loglevel=4")
                .unwrap();

        assert!(!config.paravirt);
        assert_eq!(config.hz, 250);
        assert_eq!(config.bench_iterations, 42);
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn test_malformed_number() {
        let err = GuestConfig::parse("hz=fast").unwrap_err();
        assert_eq!(err, ParavirtError::Config(ConfigError::InvalidNumber("hz")));
    }

    #[test]
    fn test_zero_hz_rejected() {
        let err = GuestConfig::parse("hz=0").unwrap_err();
        assert_eq!(err, ParavirtError::Config(ConfigError::OutOfRange("hz")));
    }

    #[test]
    fn test_hz_above_lapic_frequency_rejected() {
        let err = GuestConfig::parse("hz=2000000").unwrap_err();
        assert_eq!(err, ParavirtError::Config(ConfigError::OutOfRange("hz")));

        let config = GuestConfig::parse("hz=1000000").unwrap();
        assert_eq!(config.hz, LAPIC_TIMER_FREQUENCY_HZ);
    }

    #[test]
    fn test_loglevel_range() {
        let err = GuestConfig::parse("loglevel=9").unwrap_err();
        assert_eq!(err, ParavirtError::Config(ConfigError::OutOfRange("loglevel")));
    }

    #[test]
    fn test_nopv_with_value_is_ignored() {
        let config = GuestConfig::parse("nopv=1").unwrap();
        assert!(config.paravirt);
    }
}
