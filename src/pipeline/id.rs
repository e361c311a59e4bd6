//! Identity types for the pipeline.
//!
//! Unit ids are allocated from a process-wide counter so that a unit keeps
//! the same id while it moves between positions or chains.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_UNIT_ID: AtomicU32 = AtomicU32::new(0);
static NEXT_SUBSCRIBER_ID: AtomicU32 = AtomicU32::new(0);

/// Instance identifier of a [`Unit`](crate::pipeline::Unit).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl UnitId {
    pub const INVALID: UnitId = UnitId(u32::MAX);

    /// Allocate a fresh id.
    pub fn next() -> Self {
        UnitId(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Value used as the default source tag of frames a unit creates.
    #[inline]
    pub fn as_u64(self) -> u64 {
        u64::from(self.0)
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "UnitId(INVALID)")
        } else {
            write!(f, "UnitId({})", self.0)
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handle for an event subscription, used to unsubscribe.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u32);

impl SubscriberId {
    pub fn next() -> Self {
        SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_ids_are_unique() {
        let a = UnitId::next();
        let b = UnitId::next();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(!UnitId::INVALID.is_valid());
    }

    #[test]
    fn test_unit_id_debug() {
        assert_eq!(format!("{:?}", UnitId(7)), "UnitId(7)");
        assert_eq!(format!("{}", UnitId::INVALID), "UnitId(INVALID)");
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        assert_ne!(SubscriberId::next(), SubscriberId::next());
    }
}
