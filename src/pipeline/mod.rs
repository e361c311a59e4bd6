//! Unit/chain dataflow engine.
//!
//! Frames flow through an ordered chain of units: a source produces a
//! [`FrameBuffer`] tagged with its selected [`UnitFormat`], and each unit
//! hands its output directly to its successor.
//!
//! # Architecture
//!
//! ```text
//! [input.test_pattern] ──► [filter.passthrough] ──► [output.logger]
//!          ▲                                              │
//!     timer wake                                   writer thread
//! ```
//!
//! # Design
//!
//! - **Single dispatch thread**: units are `Rc<RefCell<_>>` handles; the
//!   host loop calls [`Chain::poll_sources`] and [`Chain::dispatch`].
//! - **Downstream-only negotiation**: a unit reacts to its upstream's
//!   active format and forwards exactly one notification to its successor.
//! - **Shared immutable frames**: clones of a [`FrameBuffer`] share the
//!   payload; the last release frees it or returns it to a [`FramePool`].
//! - **Bounded hand-offs**: background threads talk to the dispatch thread
//!   only through [`HandOff`] queues whose eventfd wakes the host loop.

pub mod chain;
pub mod clock;
pub mod control;
pub mod description;
pub mod error;
pub mod event;
pub mod format;
pub mod frame;
pub mod handoff;
pub mod id;
pub mod registry;
pub mod unit;
pub mod units;

pub use chain::{Chain, PollSources};
pub use clock::{Clock, SystemClock};
pub use control::{Control, ControlKind, ControlSet, ControlValue, EnumEntry, UiHints};
pub use description::{ChainDescription, ControlEntry, FormatEntry, UnitEntry};
pub use error::{ChainError, ChainResult, ControlError, FormatError, UnitError, UnitResult};
pub use event::{EventBus, PipelineEvent, DEFAULT_EVENT_CAPACITY};
pub use format::{FormatPreference, FormatSet, PixelFormat, UnitFormat};
pub use frame::{FrameBuffer, FrameBufferBuilder, FrameError, FramePool, PoolStats};
pub use handoff::{HandOff, HandOffSender, DEFAULT_HANDOFF_CAPACITY};
pub use id::{SubscriberId, UnitId};
pub use registry::{UnitDescription, UnitRegistry};
pub use unit::{EventMethod, Stage, Unit, UnitContext, UnitInfo, UnitStatus};
