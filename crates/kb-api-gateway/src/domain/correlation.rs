//! Per-call correlation id.
//!
//! Every dispatched call and every relay instance gets a UUID v7 so log lines
//! from one call (decode, resolution, backend calls, reply) can be grouped.

use std::fmt;
use uuid::Uuid;

/// Time-ordered identifier attached to a call's tracing span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
