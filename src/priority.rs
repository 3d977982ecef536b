//! Priority rule for concurrent requests.
//!
//! Requests are totally ordered by `(timestamp, node id)`. The smaller pair
//! is served first; ids are unique so two distinct nodes never compare equal.

use crate::clock::Timestamp;
use crate::node::NodeId;

/// Returns `true` if request `a` should be served before request `b`.
pub fn priority(id_a: NodeId, id_b: NodeId, timestamp_a: Timestamp, timestamp_b: Timestamp) -> bool {
    if timestamp_a < timestamp_b {
        return true;
    }
    timestamp_a == timestamp_b && id_a < id_b
}

/// A request identity with the derived `Ord` matching [`priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestKey {
    // Field order matters: timestamp first, id breaks ties.
    pub timestamp: Timestamp,
    pub node: NodeId,
}

impl RequestKey {
    pub fn new(node: NodeId, timestamp: Timestamp) -> Self {
        RequestKey { timestamp, node }
    }

    /// `true` if `self` should be served before `other`.
    pub fn outranks(&self, other: &RequestKey) -> bool {
        priority(self.node, other.node, self.timestamp, other.timestamp)
    }
}
