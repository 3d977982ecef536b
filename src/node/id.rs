//! Node ID: a lightweight, ordered, copyable node identifier.

/// Identifier of a participant, dense in `[0, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u64);

impl NodeId {
    /// Create a node ID from a raw integer.
    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Position of this node in the runtime's node table.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// All ids of an `n`-node system, ascending.
    pub fn all(n: usize) -> impl Iterator<Item = NodeId> {
        (0..n as u64).map(NodeId)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}
