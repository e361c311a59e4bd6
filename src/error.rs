//! Error handling for framechain
//!
//! This module defines the crate-level error type and a Result alias used by
//! configuration and description I/O. Pipeline operations keep their own
//! narrower errors in [`crate::pipeline::error`].

use crate::pipeline::error::{ChainError, UnitError};
use thiserror::Error;

/// Main error type for framechain operations
#[derive(Error, Debug)]
pub enum FrameChainError {
    /// Errors raised by chain mutations or status changes
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Errors raised by a single unit
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML encode errors
    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FrameChainError>,
    },
}

impl FrameChainError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FrameChainError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for framechain operations
pub type Result<T> = std::result::Result<T, FrameChainError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ChainError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FrameChainError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FrameChainError::from(e).with_context(f()))
    }
}
