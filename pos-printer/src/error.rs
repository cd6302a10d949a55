//! Error types for the printer library

use thiserror::Error;

/// Printer error types
///
/// Transport and encoding problems are recovered inside the fallback
/// chains; a `PrintError` only reaches the caller once every fallback
/// for the operation has been exhausted.
#[derive(Debug, Error)]
pub enum PrintError {
    /// No transport could be reached
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Characters were replaced with a placeholder while encoding
    #[error("{count} character(s) not representable in the selected code page")]
    EncodingFallback { count: usize },

    /// Spooler submission failed
    #[error("Spool failed: {0}")]
    SpoolFailure(String),

    /// Some, but not all, spool chunks were delivered
    #[error("{failed} of {total} chunk(s) failed to spool")]
    PartialChunkFailure { failed: usize, total: usize },

    /// Operation attempted before a successful connect
    #[error("Printer not connected")]
    NotConnected,

    /// The printer or transport cannot perform the requested operation
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout waiting for printer or helper process
    #[error("Timeout: {0}")]
    Timeout(String),

    /// CUPS queue registration or removal failed
    #[error("CUPS registration failed: {0}")]
    Registration(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// USB device error
    #[error("USB error: {0}")]
    Usb(String),

    /// Serial device error
    #[error("Serial error: {0}")]
    Serial(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
