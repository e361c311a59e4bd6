//! Built-in stages.

pub mod log_replay;
pub mod logger;
pub mod passthrough;
pub mod queue_source;
pub mod test_pattern;

pub use log_replay::LogReplaySource;
pub use logger::FrameLogger;
pub use passthrough::PassthroughFilter;
pub use queue_source::{FrameInjector, QueueSource};
pub use test_pattern::TestPatternSource;
