//! Unified error types for uca

use thiserror::Error;

/// Unified error type for uca infrastructure failures
///
/// Per-agent update failures are not errors: they are reported through
/// [`crate::AgentResult`] and never abort a run.
#[derive(Error, Debug)]
pub enum UcaError {
    // Process errors
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Empty command line")]
    EmptyCommand,

    // Probe errors
    #[error("Unparsable probe output from {command}: {message}")]
    ProbeOutput { command: String, message: String },

    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    // Presentation errors
    #[error("Dashboard error: {0}")]
    Dashboard(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using UcaError
pub type Result<T> = std::result::Result<T, UcaError>;
