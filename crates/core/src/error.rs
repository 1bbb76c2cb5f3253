//! Error types for the erpeto domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all erpeto operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Source resolution errors ---
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    // --- Event reassembly errors ---
    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    // --- Browser collaborator errors ---
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    // --- Wire decoding errors ---
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Filesystem ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures while resolving a data source against a prefix of actions.
///
/// An absent value is *not* an error; sources report it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Action #{index} not found (prefix holds {len} actions)")]
    ActionNotFound { index: usize, len: usize },

    #[error("Invalid extraction pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Protocol violations detected by the reassembly state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassemblyError {
    #[error("Second request detail event for pending request {request_id}")]
    DuplicateRequestExtra { request_id: String },

    #[error("Response received for {request_id} while another response is pending")]
    ResponseAlreadyPending { request_id: String },

    #[error("Second response detail event for {request_id} before its response")]
    DuplicateResponseExtra { request_id: String },

    #[error("Body loaded for {request_id} without any response")]
    OrphanBody { request_id: String },
}

impl ReassemblyError {
    /// The request id of the exchange that violated the protocol.
    pub fn request_id(&self) -> &str {
        match self {
            Self::DuplicateRequestExtra { request_id }
            | Self::ResponseAlreadyPending { request_id }
            | Self::DuplicateResponseExtra { request_id }
            | Self::OrphanBody { request_id } => request_id,
        }
    }
}

/// Failures of the browser collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrowserError {
    #[error("No resource with given identifier: {0}")]
    NoResource(String),
}

/// A raw browser event that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Event has no method field")]
    MissingMethod,

    #[error("Malformed {method} event: {reason}")]
    Malformed { method: String, reason: String },
}
