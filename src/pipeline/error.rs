//! Pipeline-specific error types.

use crate::pipeline::id::UnitId;
use crate::pipeline::unit::UnitStatus;
use thiserror::Error;

/// Errors raised when building a [`UnitFormat`](crate::pipeline::UnitFormat).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Format dimensions must be non-zero (got {width}x{height})")]
    ZeroDimension { width: u32, height: u32 },

    #[error("Row stride {stride} x height {height} exceeds maximum payload size {max_data_size}")]
    PayloadTooSmall {
        stride: u32,
        height: u32,
        max_data_size: usize,
    },

    #[error("Frame layout for {width}x{height} does not fit in memory")]
    LayoutOverflow { width: u32, height: u32 },
}

/// Errors raised while declaring or setting controls.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("Unknown control '{0}'")]
    Unknown(String),

    #[error("Control '{0}' is already declared")]
    Duplicate(String),

    #[error("Control '{0}' is disabled")]
    Disabled(String),

    #[error("Control '{id}' expects a {expected} value")]
    TypeMismatch { id: String, expected: &'static str },

    #[error("Value {value} is outside the range of control '{id}'")]
    OutOfRange { id: String, value: String },

    #[error("Control '{id}' has no enabled entry {value}")]
    InvalidEntry { id: String, value: i64 },

    #[error("Invalid bounds for control '{0}'")]
    InvalidBounds(String),

    #[error("Unit rejected value for control '{id}': {reason}")]
    Rejected { id: String, reason: String },
}

/// Errors raised by unit state transitions and construction.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("{unit}: cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        unit: UnitId,
        from: UnitStatus,
        to: UnitStatus,
    },

    #[error("{0}: upstream unit is not producing a format")]
    UpstreamNotReady(UnitId),

    #[error("{0}: no output formats advertised")]
    NoFormats(UnitId),

    #[error("{unit}: format '{format}' is not advertised")]
    FormatNotAdvertised { unit: UnitId, format: String },

    #[error("{unit}: {message}")]
    Resource { unit: UnitId, message: String },

    #[error("Unknown unit kind '{0}'")]
    UnknownKind(String),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UnitError {
    /// Resource failure reported by a stage.
    pub fn resource(unit: UnitId, message: impl Into<String>) -> Self {
        UnitError::Resource {
            unit,
            message: message.into(),
        }
    }
}

/// Errors raised by chain mutations and status propagation.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("{0} is not a member of this chain")]
    NotMember(UnitId),

    #[error("{0} already belongs to a chain")]
    AlreadyMember(UnitId),

    #[error("Index {index} is out of range for a chain of {len} units")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Faulty unit {unit}: {source}")]
    FaultyUnit {
        unit: UnitId,
        #[source]
        source: UnitError,
    },

    #[error(transparent)]
    Unit(#[from] UnitError),
}

pub type UnitResult<T> = std::result::Result<T, UnitError>;
pub type ChainResult<T> = std::result::Result<T, ChainError>;
