//! An [`AigEdge`] points at an [`AigNode`] and can be complemented (indicates the presence of a NOT gate).
//!
//! [`AigNode`]: crate::AigNode

use std::ops::Not;

use super::NodeId;

/// Unambiguous fanin selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaninId {
    Fanin0,
    Fanin1,
}

impl From<bool> for FaninId {
    fn from(value: bool) -> Self {
        if value {
            FaninId::Fanin1
        } else {
            FaninId::Fanin0
        }
    }
}

impl From<usize> for FaninId {
    fn from(value: usize) -> Self {
        if value == 0 {
            FaninId::Fanin0
        } else if value == 1 {
            FaninId::Fanin1
        } else {
            panic!("could not create FaninId from value={}", value)
        }
    }
}

/// A directed edge representing a fanin (or an output) in the AIG.
///
/// The edge refers to a node slot and can carry an inverter according to the value of `complement`.
/// Edges are plain values: they stay meaningful only as long as the slot they point at
/// is not freed by the [`Aig`](crate::Aig).
///
/// The derived ordering (slot first, then complement) is the canonical fanin order
/// used by structural hashing.
///
/// ```rust
/// use certaig::{Aig, AigEdge};
/// let aig = Aig::new();
/// let fanin_false = AigEdge::new(0, false);
/// let fanin_true = AigEdge::new(0, true);
/// assert_eq!(fanin_false, !fanin_true);
/// assert!(fanin_true.is_cst_true());
/// assert_eq!(aig.const_false(), fanin_false);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AigEdge {
    /// The slot of the node the edge is refering to.
    pub(crate) node: NodeId,
    /// Set to true if signal should be inverted.
    pub(crate) complement: bool,
}

impl Not for AigEdge {
    type Output = Self;

    fn not(mut self) -> Self::Output {
        self.complement = !self.complement;
        self
    }
}

impl From<&AigEdge> for (NodeId, bool) {
    fn from(edge: &AigEdge) -> (NodeId, bool) {
        (edge.get_node_id(), edge.get_complement())
    }
}

impl AigEdge {
    pub fn new(node: NodeId, complement: bool) -> Self {
        AigEdge { node, complement }
    }

    pub fn get_node_id(&self) -> NodeId {
        self.node
    }

    pub fn get_complement(&self) -> bool {
        self.complement
    }

    /// Same edge, inverted iff `cond`.
    pub fn not_cond(self, cond: bool) -> Self {
        AigEdge {
            node: self.node,
            complement: self.complement ^ cond,
        }
    }

    /// The uncomplemented edge pointing at the same node.
    pub fn regular(self) -> Self {
        AigEdge {
            node: self.node,
            complement: false,
        }
    }

    pub fn is_cst(&self) -> bool {
        self.node == 0
    }

    pub fn is_cst_false(&self) -> bool {
        self.node == 0 && !self.complement
    }

    pub fn is_cst_true(&self) -> bool {
        self.node == 0 && self.complement
    }

    pub fn is_complement_of(&self, other: &AigEdge) -> bool {
        self.node == other.node && self.complement ^ other.complement
    }
}
