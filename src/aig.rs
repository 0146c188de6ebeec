//! Module defining the [`Aig`] struct, as well as [`AigNode`], [`AigEdge`] and some others relevant structs.
//!
//! The [`Aig`] is the graph manager the rewriting driver works on: it owns every node,
//! deduplicates and gates through structural hashing, keeps reference counts, levels and
//! simulation phases up to date, and performs in-place replacements.
//!
//! To start rewriting, check [`crate::rewrite`].

pub mod dfs;
pub mod edge;
pub mod error;
mod integrity;
pub mod node;
mod parser;
pub mod simulate;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Bound,
};

use log::trace;

pub use edge::{AigEdge, FaninId};
pub use error::{AigError, ParserError, Result};
pub use node::{AigNode, Birth, Level, NodeId, NodeKind};

use crate::certificate::StableId;

/// Reverse levels, valid for one rewriting session.
///
/// `levels[n]` bounds the length of the longest path from `n` to an output (counted in and
/// gates). Edits only raise them, along the fanin cone of the node that gained fanouts: a value
/// may therefore overestimate the exact reverse level, never underestimate it.
#[derive(Debug, Clone)]
struct ReverseLevels {
    max_level: Level,
    levels: HashMap<NodeId, Level>,
}

/// A whole (combinational) AIG.
///
/// Nodes live in an arena of slots indexed by [`NodeId`]. When a node is deleted, its slot is
/// freed and will be handed out to the next node created: the slot index alone is therefore
/// NOT a lifetime identifier. Every node also carries:
/// - a creation index ([`Birth`]), strictly increasing, used to visit nodes in creation order;
/// - a [`StableId`], the logical identity used in certificates, never reused.
///
/// And gates are structurally hashed: there is at most one gate for a given pair of
/// (canonically ordered) fanins, and trivial gates (`a & a`, `a & !a`, `a & 0`, `a & 1`)
/// are never created. Use [`.and(a, b)`] to build logic.
///
/// [`.and(a, b)`]: Aig::and
///
/// ```rust
/// use certaig::Aig;
/// let mut aig = Aig::new();
/// let a = aig.add_input();
/// let b = aig.add_input();
/// let ab = aig.and(a, b).unwrap();
/// assert_eq!(aig.and(b, a).unwrap(), ab); // structural hashing
/// assert_eq!(aig.and(a, !a).unwrap(), aig.const_false());
/// aig.add_output(ab).unwrap();
/// assert_eq!(aig.node_num(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Aig {
    nodes: Vec<Option<AigNode>>,
    free_slots: Vec<NodeId>,
    strash: HashMap<(AigEdge, AigEdge), NodeId>,
    inputs: Vec<NodeId>,
    outputs: Vec<AigEdge>,
    /// Live nodes, keyed by creation index.
    order: BTreeMap<Birth, NodeId>,
    next_birth: Birth,
    next_certif_id: u32,
    n_ands: usize,
    /// Present only while a fanout session is running (see [`Aig::start_fanout`]).
    fanouts: Option<HashMap<NodeId, BTreeSet<NodeId>>>,
    reverse_levels: Option<ReverseLevels>,
}

impl Default for Aig {
    fn default() -> Self {
        Aig::new()
    }
}

/// Result of the constant propagation rules of an and gate.
fn simplify_and(a: AigEdge, b: AigEdge) -> Option<AigEdge> {
    if a == b {
        Some(a)
    } else if a.is_complement_of(&b) || a.is_cst_false() || b.is_cst_false() {
        Some(AigEdge::new(0, false))
    } else if a.is_cst_true() {
        Some(b)
    } else if b.is_cst_true() {
        Some(a)
    } else {
        None
    }
}

fn canonical(a: AigEdge, b: AigEdge) -> (AigEdge, AigEdge) {
    if a <= b { (a, b) } else { (b, a) }
}

impl Aig {
    /// Create a brand new AIG (constant node included, in slot 0 with [`StableId::CONST0`]).
    pub fn new() -> Self {
        let node_false = AigNode {
            id: 0,
            kind: NodeKind::False,
            certif_id: StableId::CONST0,
            birth: 0,
            level: 0,
            phase: false,
            refs: 0,
        };
        Aig {
            nodes: vec![Some(node_false)],
            free_slots: Vec::new(),
            strash: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            order: BTreeMap::from([(0, 0)]),
            next_birth: 1,
            next_certif_id: 1,
            n_ands: 0,
            fanouts: None,
            reverse_levels: None,
        }
    }

    /// The constant false signal.
    pub fn const_false(&self) -> AigEdge {
        AigEdge::new(0, false)
    }

    /// The constant true signal.
    pub fn const_true(&self) -> AigEdge {
        AigEdge::new(0, true)
    }

    /// Retrieves a live node from its slot.
    pub fn get_node(&self, id: NodeId) -> Option<&AigNode> {
        self.nodes.get(id as usize)?.as_ref()
    }

    /// Same as [`Aig::get_node`] but errors when the node does not exist.
    pub fn node(&self, id: NodeId) -> Result<&AigNode> {
        self.get_node(id).ok_or(AigError::NodeDoesNotExist(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut AigNode> {
        self.nodes
            .get_mut(id as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(AigError::NodeDoesNotExist(id))
    }

    /// Retrieves inputs slots, in creation order.
    pub fn get_inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Retrieves outputs.
    pub fn get_outputs(&self) -> &[AigEdge] {
        &self.outputs
    }

    /// Number of and gates.
    pub fn node_num(&self) -> usize {
        self.n_ands
    }

    /// Number of slots ever allocated (live or free).
    pub fn obj_num_max(&self) -> usize {
        self.nodes.len()
    }

    /// Largest level of an output.
    pub fn level(&self) -> Level {
        self.outputs
            .iter()
            .filter_map(|o| self.get_node(o.node))
            .map(|n| n.level)
            .max()
            .unwrap_or(0)
    }

    /// The largest [`StableId`] carried (or ever carried) by a node of this AIG.
    pub fn stable_id_bound(&self) -> StableId {
        StableId::new(self.next_certif_id - 1)
    }

    /// Stable id and complement of the node an edge points at.
    pub fn edge_certif(&self, edge: AigEdge) -> Result<(StableId, bool)> {
        Ok((self.node(edge.node)?.certif_id, edge.complement))
    }

    /// One past the creation index of the most recently created node.
    pub fn creation_bound(&self) -> Birth {
        self.next_birth
    }

    /// The first live node created strictly after `after` (or the very first node if `None`).
    pub fn next_in_order(&self, after: Option<Birth>) -> Option<(Birth, NodeId)> {
        let lower = match after {
            Some(birth) => Bound::Excluded(birth),
            None => Bound::Unbounded,
        };
        self.order
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(&birth, &id)| (birth, id))
    }

    fn assign_certif_id(&mut self, requested: StableId) -> StableId {
        if requested == StableId::UNTRACKED {
            let id = StableId::new(self.next_certif_id);
            self.next_certif_id += 1;
            id
        } else {
            self.next_certif_id = self.next_certif_id.max(requested.get() + 1);
            requested
        }
    }

    fn allocate(&mut self, kind: NodeKind, certif_id: StableId, level: Level, phase: bool) -> NodeId {
        let certif_id = self.assign_certif_id(certif_id);
        let birth = self.next_birth;
        self.next_birth += 1;
        let id = match self.free_slots.pop() {
            Some(id) => id,
            None => {
                self.nodes.push(None);
                (self.nodes.len() - 1) as NodeId
            }
        };
        self.nodes[id as usize] = Some(AigNode {
            id,
            kind,
            certif_id,
            birth,
            level,
            phase,
            refs: 0,
        });
        self.order.insert(birth, id);
        id
    }

    /// Adds a primary input, with a fresh stable id.
    pub fn add_input(&mut self) -> AigEdge {
        self.add_input_with_certif(StableId::UNTRACKED)
    }

    /// Adds a primary input carrying the given stable id
    /// ([`StableId::UNTRACKED`] lets the AIG pick one).
    pub fn add_input_with_certif(&mut self, certif_id: StableId) -> AigEdge {
        let id = self.allocate(NodeKind::Input, certif_id, 0, false);
        self.inputs.push(id);
        AigEdge::new(id, false)
    }

    /// Marks an existing signal as an output.
    pub fn add_output(&mut self, edge: AigEdge) -> Result<()> {
        self.node_mut(edge.node)?.refs += 1;
        self.outputs.push(edge);
        Ok(())
    }

    /// Looks an and gate up without creating it: applies constant propagation,
    /// then queries the structural hash table. Returns `None` if the gate would have to be created.
    pub fn lookup_and(&self, a: AigEdge, b: AigEdge) -> Option<AigEdge> {
        if let Some(edge) = simplify_and(a, b) {
            return Some(edge);
        }
        self.strash
            .get(&canonical(a, b))
            .map(|&id| AigEdge::new(id, false))
    }

    /// Returns the and of two signals, creating the gate if needed.
    pub fn and(&mut self, a: AigEdge, b: AigEdge) -> Result<AigEdge> {
        match self.lookup_and(a, b) {
            Some(edge) => Ok(edge),
            None => Ok(AigEdge::new(self.create_and(a, b, StableId::UNTRACKED)?, false)),
        }
    }

    /// Creates a new and gate carrying the given stable id.
    ///
    /// This fails if the gate is trivial or already exists: call [`Aig::lookup_and`] first.
    pub fn create_and(&mut self, a: AigEdge, b: AigEdge, certif_id: StableId) -> Result<NodeId> {
        if simplify_and(a, b).is_some() {
            return Err(AigError::InvalidState(format!(
                "refusing to create trivial and gate ({:?}, {:?})",
                a, b
            )));
        }
        let (fanin0, fanin1) = canonical(a, b);
        if let Some(&existing) = self.strash.get(&(fanin0, fanin1)) {
            return Err(AigError::DuplicateAnd(existing));
        }
        let n0 = self.node(fanin0.node)?;
        let n1 = self.node(fanin1.node)?;
        let level = 1 + n0.level.max(n1.level);
        let phase = (n0.phase ^ fanin0.complement) & (n1.phase ^ fanin1.complement);

        let id = self.allocate(NodeKind::And { fanin0, fanin1 }, certif_id, level, phase);
        self.n_ands += 1;
        for fanin in [fanin0, fanin1] {
            self.node_mut(fanin.node)?.refs += 1;
            if let Some(fanouts) = self.fanouts.as_mut() {
                fanouts.entry(fanin.node).or_default().insert(id);
            }
            self.raise_reverse_level(fanin.node, 1);
        }
        self.strash.insert((fanin0, fanin1), id);
        Ok(id)
    }

    /// Starts tracking fanouts explicitly. Without it, fanouts are found by scanning the AIG.
    pub fn start_fanout(&mut self) {
        let mut fanouts: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        for node in self.nodes.iter().flatten() {
            if let NodeKind::And { fanin0, fanin1 } = node.kind {
                fanouts.entry(fanin0.node).or_default().insert(node.id);
                fanouts.entry(fanin1.node).or_default().insert(node.id);
            }
        }
        self.fanouts = Some(fanouts);
    }

    pub fn stop_fanout(&mut self) {
        self.fanouts = None;
    }

    pub fn is_fanout_tracking(&self) -> bool {
        self.fanouts.is_some()
    }

    /// And gates using `id` as a fanin, in slot order.
    pub fn fanouts(&self, id: NodeId) -> Vec<NodeId> {
        match &self.fanouts {
            Some(fanouts) => fanouts
                .get(&id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            None => self
                .nodes
                .iter()
                .flatten()
                .filter(|n| n.get_fanins().iter().any(|f| f.node == id))
                .map(|n| n.id)
                .collect(),
        }
    }

    /// Starts maintaining reverse levels, so that [`Aig::required_level`] becomes meaningful.
    /// The maximum level allowed is the current level of the AIG.
    pub fn start_reverse_levels(&mut self) -> Result<()> {
        let sort = self.get_topological_sort()?;
        let mut levels: HashMap<NodeId, Level> = HashMap::new();
        // Fanouts come after their fanins in the sort, walk it backwards.
        for &id in sort.iter().rev() {
            let level = *levels.entry(id).or_insert(0);
            for fanin in self.node(id)?.get_fanins() {
                let entry = levels.entry(fanin.node).or_insert(0);
                *entry = (*entry).max(level + 1);
            }
        }
        self.reverse_levels = Some(ReverseLevels {
            max_level: self.level(),
            levels,
        });
        Ok(())
    }

    pub fn stop_reverse_levels(&mut self) {
        self.reverse_levels = None;
    }

    fn reverse_level(&self, id: NodeId) -> Level {
        self.reverse_levels
            .as_ref()
            .and_then(|rl| rl.levels.get(&id).copied())
            .unwrap_or(0)
    }

    /// Makes sure the reverse level of `id` is at least `level`, propagating to its fanin cone.
    fn raise_reverse_level(&mut self, id: NodeId, level: Level) {
        let Some(rl) = self.reverse_levels.as_mut() else {
            return;
        };
        let mut stack = vec![(id, level)];
        while let Some((id, level)) = stack.pop() {
            let entry = rl.levels.entry(id).or_insert(0);
            if *entry >= level {
                continue;
            }
            *entry = level;
            if let Some(node) = self.nodes.get(id as usize).and_then(|n| n.as_ref()) {
                for fanin in node.get_fanins() {
                    stack.push((fanin.node, level + 1));
                }
            }
        }
    }

    /// The largest level a replacement of `id` may have without increasing the depth of the AIG.
    /// [`Level::MAX`] when reverse levels are not maintained.
    pub fn required_level(&self, id: NodeId) -> Result<Level> {
        match &self.reverse_levels {
            None => Ok(Level::MAX),
            Some(rl) => {
                self.node(id)?;
                let reverse = rl.levels.get(&id).copied().unwrap_or(0);
                Ok(rl.max_level.saturating_sub(reverse))
            }
        }
    }

    /// Number of and gates in the transitive fanin of `id` (itself included).
    pub fn dag_size(&self, id: NodeId) -> usize {
        let mut dfs = dfs::Dfs::from_node(id);
        let mut size = 0;
        while let Some(node) = dfs.next(self) {
            if node.is_and() {
                size += 1;
            }
        }
        size
    }

    fn hold(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.refs += 1;
        Ok(())
    }

    fn release(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_mut(id)?;
        node.refs = node.refs.checked_sub(1).ok_or(AigError::InvalidState(format!(
            "reference count of node {} underflows",
            id
        )))?;
        if node.refs == 0 && node.is_and() {
            self.delete_dangling(id)?;
        }
        Ok(())
    }

    fn unhash(&mut self, id: NodeId) -> Result<()> {
        if let NodeKind::And { fanin0, fanin1 } = self.node(id)?.kind {
            if self.strash.get(&(fanin0, fanin1)) == Some(&id) {
                self.strash.remove(&(fanin0, fanin1));
            }
        }
        Ok(())
    }

    /// Deletes `id` and every node that becomes dangling because of it.
    /// Inputs and the constant node are never deleted.
    fn delete_dangling(&mut self, id: NodeId) -> Result<()> {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            self.unhash(id)?;
            let node = self.nodes[id as usize]
                .take()
                .ok_or(AigError::NodeDoesNotExist(id))?;
            if node.refs != 0 {
                return Err(AigError::InvalidState(format!(
                    "deleting node {} which still has {} references",
                    id, node.refs
                )));
            }
            trace!("freeing slot {} (stable id {})", id, node.certif_id);
            self.order.remove(&node.birth);
            self.free_slots.push(id);
            self.n_ands -= 1;
            if let Some(fanouts) = self.fanouts.as_mut() {
                fanouts.remove(&id);
            }
            if let Some(rl) = self.reverse_levels.as_mut() {
                rl.levels.remove(&id);
            }
            for fanin in node.get_fanins() {
                if let Some(fanouts) = self.fanouts.as_mut() {
                    if let Some(set) = fanouts.get_mut(&fanin.node) {
                        set.remove(&id);
                    }
                }
                let child = self.node_mut(fanin.node)?;
                child.refs -= 1;
                if child.refs == 0 && child.is_and() {
                    stack.push(fanin.node);
                }
            }
        }
        Ok(())
    }

    /// Removes every dangling and gate. Returns how many nodes were deleted.
    pub fn cleanup(&mut self) -> Result<usize> {
        let before = self.n_ands;
        let dangling: Vec<NodeId> = self
            .nodes
            .iter()
            .flatten()
            .filter(|n| n.is_and() && n.refs == 0)
            .map(|n| n.id)
            .collect();
        for id in dangling {
            // An earlier deletion may already have taken it.
            if self.get_node(id).is_some_and(|n| n.refs == 0) {
                self.delete_dangling(id)?;
            }
        }
        Ok(before - self.n_ands)
    }

    /// Points fanin(s) of `fanout` currently on `old` at `new`, keeping reference counts
    /// and fanout sets in sync.
    fn patch_fanout(&mut self, fanout: NodeId, old: NodeId, new: AigEdge) -> Result<()> {
        let patched = self.node_mut(fanout)?.patch_fanin(old, new);
        if patched == 0 {
            return Err(AigError::InvalidState(format!(
                "node {} does not have fanin {}",
                fanout, old
            )));
        }
        self.node_mut(old)?.refs -= patched as u32;
        self.node_mut(new.node)?.refs += patched as u32;
        let above = self.reverse_level(fanout);
        self.raise_reverse_level(new.node, above + 1);
        if let Some(fanouts) = self.fanouts.as_mut() {
            if let Some(set) = fanouts.get_mut(&old) {
                set.remove(&fanout);
            }
            fanouts.entry(new.node).or_default().insert(fanout);
        }
        Ok(())
    }

    /// Re-inserts `id` in the structural hash table after its fanins changed.
    /// Returns the signal `id` must be merged into if it became trivial or redundant.
    fn rehash(&mut self, id: NodeId) -> Result<Option<AigEdge>> {
        let NodeKind::And { fanin0, fanin1 } = self.node(id)?.kind else {
            return Err(AigError::NotAnAnd(id));
        };
        if let Some(edge) = simplify_and(fanin0, fanin1) {
            return Ok(Some(edge));
        }
        let (fanin0, fanin1) = canonical(fanin0, fanin1);
        if let Some(&existing) = self.strash.get(&(fanin0, fanin1)) {
            return Ok(Some(AigEdge::new(existing, false)));
        }
        self.node_mut(id)?.kind = NodeKind::And { fanin0, fanin1 };
        self.strash.insert((fanin0, fanin1), id);
        Ok(None)
    }

    /// Recomputes the level of `id` and propagates changes to its transitive fanout.
    fn update_level(&mut self, id: NodeId) -> Result<()> {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get_node(id) else {
                continue;
            };
            let level = node
                .get_fanins()
                .iter()
                .map(|f| self.get_node(f.node).map(|n| n.level + 1).unwrap_or(1))
                .max()
                .unwrap_or(0);
            if level != node.level {
                self.node_mut(id)?.level = level;
                stack.extend(self.fanouts(id));
            }
        }
        Ok(())
    }

    /// Replaces the and gate `old` by the signal `new` everywhere in the AIG.
    ///
    /// Every fanout and every output of `old` is redirected to `new`. Redirected fanouts are
    /// simplified and re-hashed: a fanout that becomes trivial, or structurally identical to
    /// another gate, is itself replaced (cascading). Levels are updated, then `old` and the
    /// nodes that become dangling are deleted and their slots freed.
    ///
    /// `new` must not be in the transitive fanout of `old`.
    pub fn replace(&mut self, old: NodeId, new: AigEdge) -> Result<()> {
        if !self.node(old)?.is_and() {
            return Err(AigError::NotAnAnd(old));
        }
        if new.node == old {
            return Err(AigError::InvalidState(format!(
                "replacing node {} by itself",
                old
            )));
        }
        // Every pending replacement holds a reference on its target.
        self.hold(new.node)?;
        let mut work = vec![(old, new)];
        while let Some((old, new)) = work.pop() {
            if self.get_node(old).is_none() {
                self.release(new.node)?;
                continue;
            }
            trace!("redirecting slot {} to {:?}", old, new);
            // A redirected fanout may end up with the fanins of `old`
            self.unhash(old)?;

            for fanout in self.fanouts(old) {
                self.unhash(fanout)?;
                self.patch_fanout(fanout, old, new)?;
                match self.rehash(fanout)? {
                    Some(equivalent) => {
                        self.hold(equivalent.node)?;
                        work.push((fanout, equivalent));
                    }
                    None => self.update_level(fanout)?,
                }
            }

            let mut moved = 0;
            for output in self.outputs.iter_mut() {
                if output.node == old {
                    *output = new.not_cond(output.complement);
                    moved += 1;
                }
            }
            self.node_mut(old)?.refs -= moved;
            self.node_mut(new.node)?.refs += moved;

            let refs = self.node(old)?.refs;
            if refs != 0 {
                return Err(AigError::InvalidState(format!(
                    "node {} still has {} references after being replaced",
                    old, refs
                )));
            }
            self.delete_dangling(old)?;
            self.release(new.node)?;
        }
        Ok(())
    }

    /// Overwrites the stored phase of a node, breaking [`Aig::check_phase`] on purpose.
    #[cfg(test)]
    pub(crate) fn force_phase(&mut self, id: NodeId, phase: bool) -> Result<()> {
        self.node_mut(id)?.phase = phase;
        Ok(())
    }

    /// Returns a topological sort (fanins first) of the nodes reachable from the outputs.
    /// Will error if a cycle is detected.
    pub fn get_topological_sort(&self) -> Result<Vec<NodeId>> {
        self.topological_sort_from(self.outputs.iter().map(|o| o.node))
    }

    /// Returns a topological sort (fanins first) of every live node, dangling ones included.
    pub fn get_full_topological_sort(&self) -> Result<Vec<NodeId>> {
        self.topological_sort_from(self.order.values().copied())
    }

    fn topological_sort_from(&self, starts: impl Iterator<Item = NodeId>) -> Result<Vec<NodeId>> {
        let mut sort = Vec::new();
        let mut seen = BTreeSet::new();
        let mut done = BTreeSet::new();

        for start in starts {
            let mut stack: Vec<(NodeId, bool)> = vec![(start, false)];
            while let Some((id, last_time)) = stack.pop() {
                // Post order check
                if last_time {
                    done.insert(id);
                    sort.push(id);
                    continue;
                }
                if done.contains(&id) {
                    continue;
                } else if seen.contains(&id) {
                    return Err(AigError::InvalidState("found a cycle".to_string()));
                }
                seen.insert(id);
                stack.push((id, true));
                for fanin in self.node(id)?.get_fanins() {
                    if !done.contains(&fanin.node) {
                        stack.push((fanin.node, false));
                    }
                }
            }
        }
        Ok(sort)
    }
}
