//! Enumeration of cuts with at most [`MAX_LEAVES`] leaves, and their truth tables.
//!
//! Truth tables always span 4 variables (16 bits): a function of fewer leaves is replicated
//! over the unused variables, so that `0xAAAA` is "the first leaf" whatever the cut size.

use std::collections::HashMap;

use crate::aig::{Aig, AigNode, Birth, NodeId, NodeKind, Result};

/// Largest number of leaves of a cut.
pub const MAX_LEAVES: usize = 4;

/// Truth tables of the 4 elementary variables.
pub const VAR_MASKS: [u16; MAX_LEAVES] = [0xAAAA, 0xCCCC, 0xF0F0, 0xFF00];

/// A cut leaf. The creation index tells whether the slot still holds the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Leaf {
    pub node: NodeId,
    pub birth: Birth,
}

impl Leaf {
    pub fn of(node: &AigNode) -> Self {
        Leaf {
            node: node.get_id(),
            birth: node.get_birth(),
        }
    }

    /// Whether the slot still holds the node this leaf was taken from.
    pub fn is_alive(&self, aig: &Aig) -> bool {
        aig.get_node(self.node)
            .is_some_and(|n| n.get_birth() == self.birth)
    }
}

/// A set of leaves (sorted by slot) separating a node from the inputs, together with the
/// function of the node over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cut {
    leaves: Vec<Leaf>,
    truth: u16,
}

/// Whether `truth` depends on its `var`-th variable.
pub fn depends_on(truth: u16, var: usize) -> bool {
    let shifted = truth << (1 << var);
    ((shifted ^ truth) & VAR_MASKS[var]) != 0
}

/// Re-expresses a truth table over `from` as a truth table over `to`.
///
/// Leaves of `from` missing from `to` are assumed irrelevant to the function.
fn recode(truth: u16, from: &[Leaf], to: &[Leaf]) -> u16 {
    let positions: Vec<Option<usize>> = from
        .iter()
        .map(|l| to.iter().position(|t| t.node == l.node))
        .collect();
    let mut recoded = 0;
    for minterm_to in 0..16u16 {
        let mut minterm_from = 0;
        for (i, position) in positions.iter().enumerate() {
            if let Some(j) = position {
                if minterm_to >> j & 1 == 1 {
                    minterm_from |= 1 << i;
                }
            }
        }
        if truth >> minterm_from & 1 == 1 {
            recoded |= 1 << minterm_to;
        }
    }
    recoded
}

impl Cut {
    /// Builds a cut. Leaves are sorted by slot; `truth` must be expressed in that order.
    pub fn new(mut leaves: Vec<Leaf>, truth: u16) -> Self {
        leaves.sort_by_key(|l| l.node);
        Cut { leaves, truth }
    }

    /// The cut made of the node alone.
    pub fn unit(node: &AigNode) -> Self {
        Cut {
            leaves: vec![Leaf::of(node)],
            truth: VAR_MASKS[0],
        }
    }

    /// The cut of the constant node: no leaf, constant false.
    pub fn constant() -> Self {
        Cut {
            leaves: vec![],
            truth: 0,
        }
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn truth(&self) -> u16 {
        self.truth
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn is_alive(&self, aig: &Aig) -> bool {
        self.leaves.iter().all(|l| l.is_alive(aig))
    }

    /// Every leaf of `self` is a leaf of `other`.
    pub fn dominates(&self, other: &Cut) -> bool {
        self.len() <= other.len()
            && self
                .leaves
                .iter()
                .all(|l| other.leaves.iter().any(|o| o.node == l.node))
    }

    /// Drops the leaves the function does not depend on.
    fn reduce_support(mut self) -> Self {
        let support: Vec<Leaf> = self
            .leaves
            .iter()
            .enumerate()
            .filter(|&(var, _)| depends_on(self.truth, var))
            .map(|(_, &l)| l)
            .collect();
        if support.len() < self.leaves.len() {
            self.truth = recode(self.truth, &self.leaves, &support);
            self.leaves = support;
        }
        self
    }

    /// The cut of `c0 & c1` (each possibly inverted), if it has at most [`MAX_LEAVES`] leaves.
    pub fn merge(c0: &Cut, compl0: bool, c1: &Cut, compl1: bool) -> Option<Cut> {
        let mut leaves: Vec<Leaf> = c0.leaves.iter().chain(&c1.leaves).copied().collect();
        leaves.sort_by_key(|l| l.node);
        leaves.dedup_by_key(|l| l.node);
        if leaves.len() > MAX_LEAVES {
            return None;
        }
        let invert = |compl: bool| if compl { 0xFFFF } else { 0 };
        let t0 = recode(c0.truth, &c0.leaves, &leaves) ^ invert(compl0);
        let t1 = recode(c1.truth, &c1.leaves, &leaves) ^ invert(compl1);
        Some(
            Cut {
                leaves,
                truth: t0 & t1,
            }
            .reduce_support(),
        )
    }
}

/// Number of cuts currently stored for live and gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CutCount {
    pub total: usize,
    pub four_leaves: usize,
}

/// Cut sets of the nodes, computed on demand and cached by creation index.
///
/// A cached set whose leaves are not all alive anymore is recomputed. The first cut of every
/// set is the unit cut of the node.
#[derive(Debug, Clone)]
pub struct CutManager {
    max_cuts: usize,
    cuts: HashMap<Birth, Vec<Cut>>,
}

impl CutManager {
    pub fn new(max_cuts: usize) -> Self {
        CutManager {
            max_cuts: max_cuts.max(1),
            cuts: HashMap::new(),
        }
    }

    fn is_cached(&self, aig: &Aig, node: &AigNode) -> bool {
        self.cuts
            .get(&node.get_birth())
            .is_some_and(|cuts| cuts.iter().all(|c| c.is_alive(aig)))
    }

    fn fanin_cuts(&self, aig: &Aig, fanin: NodeId) -> Result<&[Cut]> {
        let birth = aig.node(fanin)?.get_birth();
        Ok(self.cuts.get(&birth).map(|c| c.as_slice()).unwrap_or(&[]))
    }

    fn merge_fanins(&self, aig: &Aig, node: &AigNode) -> Result<Vec<Cut>> {
        let NodeKind::And { fanin0, fanin1 } = node.get_kind() else {
            return Ok(vec![Cut::unit(node)]);
        };
        let mut merged: Vec<Cut> = Vec::new();
        for c0 in self.fanin_cuts(aig, fanin0.get_node_id())? {
            for c1 in self.fanin_cuts(aig, fanin1.get_node_id())? {
                let Some(cut) = Cut::merge(c0, fanin0.get_complement(), c1, fanin1.get_complement())
                else {
                    continue;
                };
                if merged.iter().any(|m| m.dominates(&cut)) {
                    continue;
                }
                merged.retain(|m| !cut.dominates(m));
                merged.push(cut);
            }
        }
        merged.sort_by_key(|c| c.len());
        merged.truncate(self.max_cuts - 1);

        let mut cuts = Vec::with_capacity(merged.len() + 1);
        cuts.push(Cut::unit(node));
        cuts.extend(merged);
        Ok(cuts)
    }

    /// Makes sure the cut set of `root` (and of its transitive fanin, as needed) is cached.
    fn ensure(&mut self, aig: &Aig, root: NodeId) -> Result<()> {
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let node = aig.node(id)?;
            if self.is_cached(aig, node) {
                continue;
            }
            let cuts = match node.get_kind() {
                NodeKind::False => vec![Cut::constant()],
                NodeKind::Input => vec![Cut::unit(node)],
                NodeKind::And { fanin0, fanin1 } if !expanded => {
                    stack.push((id, true));
                    for fanin in [fanin0, fanin1] {
                        if !self.is_cached(aig, aig.node(fanin.get_node_id())?) {
                            stack.push((fanin.get_node_id(), false));
                        }
                    }
                    continue;
                }
                NodeKind::And { .. } => self.merge_fanins(aig, node)?,
            };
            self.cuts.insert(node.get_birth(), cuts);
        }
        Ok(())
    }

    /// Recomputes the cut set of `node` from the (cached) cuts of its fanins.
    pub fn compute(&mut self, aig: &Aig, node: NodeId) -> Result<&[Cut]> {
        self.forget(aig, node);
        self.ensure(aig, node)?;
        let birth = aig.node(node)?.get_birth();
        Ok(self.cuts.get(&birth).map(|c| c.as_slice()).unwrap_or(&[]))
    }

    /// Drops the cut set of `node`, if any.
    pub fn forget(&mut self, aig: &Aig, node: NodeId) {
        if let Some(n) = aig.get_node(node) {
            self.cuts.remove(&n.get_birth());
        }
    }

    /// Number of cuts stored, stale ones included.
    pub fn storage_len(&self) -> usize {
        self.cuts.values().map(|c| c.len()).sum()
    }

    pub fn clear(&mut self) {
        self.cuts.clear();
    }

    /// Counts the cuts stored for the live and gates of `aig`.
    pub fn count_cuts(&self, aig: &Aig) -> CutCount {
        let mut count = CutCount::default();
        let mut cursor = None;
        while let Some((birth, id)) = aig.next_in_order(cursor) {
            cursor = Some(birth);
            if !aig.get_node(id).is_some_and(|n| n.is_and()) {
                continue;
            }
            for cut in self.cuts.get(&birth).into_iter().flatten() {
                count.total += 1;
                if cut.len() == MAX_LEAVES {
                    count.four_leaves += 1;
                }
            }
        }
        count
    }
}
