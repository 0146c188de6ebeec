use crate::certificate::StableId;

use super::{AigEdge, AigError, FaninId, Result};

/// A node id: the index of the slot holding the node in the [`Aig`](super::Aig) arena.
///
/// The constant node has id 0 by convention. Slots are recycled: once a node is freed,
/// its id can be handed out again to a brand new node. Use [`StableId`] when a node must be
/// identified across its whole lifetime.
pub type NodeId = u64;

/// Logic depth of a node (constant and inputs are at level 0).
pub type Level = u32;

/// Creation index of a node. Strictly increasing over the lifetime of an [`Aig`](super::Aig),
/// never reused, even when the slot of the node is.
pub type Birth = u64;

/// What a node computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The constant low/false signal.
    False,
    /// A primary input.
    Input,
    /// An AND gate with two fanins.
    And { fanin0: AigEdge, fanin1: AigEdge },
}

/// An AIG node, together with the bookkeeping the manager maintains for it.
///
/// Internal note: `refs` counts and-gate fanouts plus outputs (plus temporary holds during a
/// replacement). Make sure to update this correctly.
#[derive(Debug, Clone)]
pub struct AigNode {
    pub(super) id: NodeId,
    pub(super) kind: NodeKind,
    pub(super) certif_id: StableId,
    pub(super) birth: Birth,
    pub(super) level: Level,
    /// Value of the node when every input is 0.
    pub(super) phase: bool,
    pub(super) refs: u32,
}

impl PartialEq for AigNode {
    /// Nodes are equal when they sit in the same slot and compute the same thing from the same fanins.
    /// Bookkeeping (levels, reference counts, creation index) is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind && self.certif_id == other.certif_id
    }
}

impl Eq for AigNode {}

impl AigNode {
    pub fn is_false(&self) -> bool {
        matches!(self.kind, NodeKind::False)
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, NodeKind::Input)
    }

    pub fn is_and(&self) -> bool {
        matches!(self.kind, NodeKind::And { .. })
    }

    pub fn get_id(&self) -> NodeId {
        self.id
    }

    pub fn get_kind(&self) -> NodeKind {
        self.kind
    }

    pub fn get_certif_id(&self) -> StableId {
        self.certif_id
    }

    pub fn get_birth(&self) -> Birth {
        self.birth
    }

    pub fn get_level(&self) -> Level {
        self.level
    }

    pub fn get_phase(&self) -> bool {
        self.phase
    }

    pub fn get_refs(&self) -> u32 {
        self.refs
    }

    pub fn get_fanins(&self) -> Vec<AigEdge> {
        match self.kind {
            NodeKind::And { fanin0, fanin1 } => vec![fanin0, fanin1],
            _ => vec![],
        }
    }

    pub fn get_fanin(&self, fanin_id: FaninId) -> Result<AigEdge> {
        match (self.kind, fanin_id) {
            (NodeKind::And { fanin0, .. }, FaninId::Fanin0) => Ok(fanin0),
            (NodeKind::And { fanin1, .. }, FaninId::Fanin1) => Ok(fanin1),
            _ => Err(AigError::NoFanin),
        }
    }

    /// Replaces every fanin pointing at `old` by `new` (composing complements).
    /// Returns how many fanins were patched.
    ///
    /// Reference counts and fanout sets are NOT updated here, the caller owns that.
    pub(super) fn patch_fanin(&mut self, old: NodeId, new: AigEdge) -> usize {
        let mut patched = 0;
        if let NodeKind::And { fanin0, fanin1 } = &mut self.kind {
            for fanin in [fanin0, fanin1] {
                if fanin.node == old {
                    *fanin = new.not_cond(fanin.complement);
                    patched += 1;
                }
            }
        }
        patched
    }
}
