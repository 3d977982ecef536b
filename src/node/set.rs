//! `NodeSet`: an ordered set of node ids.

use std::collections::BTreeSet;

use super::id::NodeId;

/// Set of peers, iterated in ascending id order.
///
/// Backs both the deferred-reply set and the waiting-for-reply set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeSet {
    members: BTreeSet<NodeId>,
}

impl NodeSet {
    pub fn new() -> Self {
        NodeSet {
            members: BTreeSet::new(),
        }
    }

    /// Add `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: NodeId) -> bool {
        self.members.insert(id)
    }

    /// Remove `id`. Returns `false` if it was absent.
    pub fn remove(&mut self, id: NodeId) -> bool {
        self.members.remove(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().copied()
    }

    /// Empty the set, returning its former members in ascending order.
    pub fn take(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.members).into_iter().collect()
    }
}

impl FromIterator<NodeId> for NodeSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        NodeSet {
            members: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for NodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, id) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", id)?;
        }
        f.write_str("}")
    }
}
