//! # framechain: unit/chain dataflow engine for image frames
//!
//! Frames are produced by a source unit and relayed through an ordered
//! chain of processing units. Each unit advertises the formats it can
//! emit, negotiates with its upstream neighbour, and follows a small
//! streaming state machine (IDLE, READY, STREAMING).
//!
//! ## Architecture
//!
//! - **Pipeline**: units, chains, formats, controls and frame buffers
//!   ([`pipeline`])
//! - **Configuration**: engine settings loaded from TOML ([`config`])
//! - **Errors**: crate-level error type and context helpers ([`error`])
//!
//! The library has no event loop of its own. A host asks the chain what to
//! wait on ([`Chain::poll_sources`]) and hands readiness back
//! ([`Chain::dispatch`]); the `framechain` binary is a minimal such host.
//!
//! ## Example
//!
//! ```ignore
//! use framechain::pipeline::{Chain, UnitRegistry, UnitStatus};
//!
//! let registry = UnitRegistry::with_builtin_units();
//! let mut chain = Chain::new();
//! chain.add_unit(registry.create_unit("input.test_pattern")?)?;
//! chain.add_unit(registry.create_unit("filter.passthrough")?)?;
//! chain.set_desired_status(UnitStatus::Streaming)?;
//!
//! loop {
//!     let sources = chain.poll_sources();
//!     // wait on sources.descriptors / sources.next_wake ...
//!     chain.dispatch(&ready, now);
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{FrameChainError, Result, ResultExt};
pub use pipeline::{
    Chain, ChainDescription, FrameBuffer, PipelineEvent, Unit, UnitFormat, UnitRegistry,
    UnitStatus,
};
