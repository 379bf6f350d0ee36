//! Error types for the allocation server
//!
//! Provides structured error types for all server components including
//! the protocol layer, node registry, allocation engine, and transport
//! adapters.

use thiserror::Error;

/// Unified error type for the server
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    #[error("Node address {address} outside allocatable range")]
    AddressOutOfRange { address: u8 },

    #[error("Unique ID must be {expected} bytes, got {actual}")]
    InvalidUniqueIdLength { expected: usize, actual: usize },

    #[error("Unknown log severity code: {code}")]
    UnknownSeverity { code: u8 },

    // =========================================================================
    // Allocation Errors
    // =========================================================================
    #[error("Address space exhausted: no free address in ({low}, {high})")]
    AddressSpaceExhausted { low: u8, high: u8 },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Event channel closed")]
    ChannelClosed,

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is transient (worth retrying at the caller)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::AddressSpaceExhausted { .. } | Error::Io(_)
        )
    }
}

/// Result type alias for the server
pub type Result<T> = std::result::Result<T, Error>;
