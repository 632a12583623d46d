//! Shared primitives used across Graft crates.

pub mod config;
pub mod origin;

use core::fmt;

pub use config::EmbedConfig;
pub use config::IsolationMode;
pub use origin::RemoteOrigin;

/// Result alias used across the workspace.
pub type EmbedResult<T> = Result<T, EmbedError>;

/// Top-level error type carrying a stable dotted code and a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedError {
    pub code: &'static str,
    pub message: String,
}

impl EmbedError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for EmbedError {}
