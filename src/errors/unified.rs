// src/errors/unified.rs

//! Unified error types for the paravirt layer
//!
//! Detection mismatches are not errors (the guest silently stays on bare
//! metal) and hypercalls have no failure return, so the taxonomy is small:
//! initialization ordering, the benchmark precondition, platform slot
//! installation and command line parsing.

use core::fmt;

/// Top-level paravirt error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParavirtError {
    /// Initialization error
    Init(InitError),
    /// Benchmark harness error
    Bench(BenchError),
    /// Platform-operation error
    Platform(PlatformError),
    /// Configuration error
    Config(ConfigError),
    /// Serial subsystem error
    Serial(SerialError),
}

impl fmt::Display for ParavirtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(e) => write!(f, "Init error: {e}"),
            Self::Bench(e) => write!(f, "Bench error: {e}"),
            Self::Platform(e) => write!(f, "Platform error: {e}"),
            Self::Config(e) => write!(f, "Config error: {e}"),
            Self::Serial(e) => write!(f, "Serial error: {e}"),
        }
    }
}

/// Initialization errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Already initialized
    AlreadyInitialized,
    /// Prerequisites not met
    PrerequisitesNotMet,
    /// State machine rejected a transition
    InvalidTransition,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "already initialized"),
            Self::PrerequisitesNotMet => write!(f, "prerequisites not met"),
            Self::InvalidTransition => write!(f, "invalid state transition"),
        }
    }
}

impl From<InitError> for ParavirtError {
    fn from(err: InitError) -> Self {
        Self::Init(err)
    }
}

/// Benchmark harness errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchError {
    /// Not running as a guest of Akaros
    NotAkaros,
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAkaros => write!(f, "can only run as a VM on Akaros"),
        }
    }
}

impl From<BenchError> for ParavirtError {
    fn from(err: BenchError) -> Self {
        Self::Bench(err)
    }
}

/// Platform-operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    /// Slot already holds a backend
    SlotOccupied,
    /// Akaros backend requested without a detected hypervisor
    HypervisorAbsent,
    /// Operation belongs to a collaborator outside this layer
    NotProvided,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotOccupied => write!(f, "slot already installed"),
            Self::HypervisorAbsent => write!(f, "hypervisor absent"),
            Self::NotProvided => write!(f, "not provided by this layer"),
        }
    }
}

impl From<PlatformError> for ParavirtError {
    fn from(err: PlatformError) -> Self {
        Self::Platform(err)
    }
}

/// Command line configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Value of the named parameter is not a number
    InvalidNumber(&'static str),
    /// Value of the named parameter is out of range
    OutOfRange(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber(key) => write!(f, "{key}: not a number"),
            Self::OutOfRange(key) => write!(f, "{key}: out of range"),
        }
    }
}

impl From<ConfigError> for ParavirtError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Serial subsystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// Timeout during operation
    Timeout,
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "operation timeout"),
        }
    }
}

impl From<SerialError> for ParavirtError {
    fn from(err: SerialError) -> Self {
        Self::Serial(err)
    }
}

/// Result type alias for paravirt operations
pub type Result<T> = core::result::Result<T, ParavirtError>;

/// Helper trait for error context
pub trait ErrorContext {
    /// Get a detailed description of the error
    fn context(&self) -> &'static str;
}

impl ErrorContext for ParavirtError {
    fn context(&self) -> &'static str {
        match self {
            Self::Init(_) => "Error occurred during paravirt initialization",
            Self::Bench(_) => "Error occurred in the vmexit benchmark",
            Self::Platform(_) => "Error occurred in a platform operation",
            Self::Config(_) => "Error occurred while parsing the command line",
            Self::Serial(_) => "Error occurred in serial port subsystem",
        }
    }
}

impl ErrorContext for InitError {
    fn context(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized => "Platform bindings are installed at most once per boot",
            Self::PrerequisitesNotMet => "A required subsystem has not been initialized yet",
            Self::InvalidTransition => "Paravirt state machine only moves forward",
        }
    }
}

impl ErrorContext for BenchError {
    fn context(&self) -> &'static str {
        match self {
            Self::NotAkaros => "The vmexit benchmark needs the Akaros hypercall interface",
        }
    }
}

impl ErrorContext for PlatformError {
    fn context(&self) -> &'static str {
        match self {
            Self::SlotOccupied => "Platform slots are single-assignment",
            Self::HypervisorAbsent => "Hypercall backends require a detected Akaros host",
            Self::NotProvided => "The bare-metal implementation lives in another driver",
        }
    }
}

impl ErrorContext for ConfigError {
    fn context(&self) -> &'static str {
        match self {
            Self::InvalidNumber(_) => "Command line parameter expects a decimal number",
            Self::OutOfRange(_) => "Command line parameter outside its accepted range",
        }
    }
}

impl ErrorContext for SerialError {
    fn context(&self) -> &'static str {
        match self {
            Self::Timeout => "Serial operation timed out waiting for hardware",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: ParavirtError = BenchError::NotAkaros.into();
        assert!(matches!(err, ParavirtError::Bench(BenchError::NotAkaros)));

        let err: ParavirtError = ConfigError::InvalidNumber("hz").into();
        assert_eq!(err, ParavirtError::Config(ConfigError::InvalidNumber("hz")));
    }

    #[test]
    fn test_error_display() {
        let err = ParavirtError::Init(InitError::AlreadyInitialized);
        assert_eq!(format!("{err}"), "Init error: already initialized");

        let err = ParavirtError::Config(ConfigError::OutOfRange("loglevel"));
        assert_eq!(format!("{err}"), "Config error: loglevel: out of range");
    }

    #[test]
    fn test_error_context() {
        let err = BenchError::NotAkaros;
        assert_eq!(err.context(), "The vmexit benchmark needs the Akaros hypercall interface");

        let p_err = ParavirtError::Bench(err);
        assert_eq!(p_err.context(), "Error occurred in the vmexit benchmark");
    }
}
