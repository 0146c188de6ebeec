//! Cut enumeration and library matching: where rewriting candidates come from.
//!
//! The rewriting driver ([`crate::rewrite`]) only talks to a [`CutOracle`]. [`DarOracle`]
//! is the one shipped with the crate: it enumerates 4-input cuts ([`cut`]), looks their
//! function up in a fixed library of small structures ([`library`]), and estimates the gain
//! of each candidate from the maximum fanout-free cone of the node.

pub mod cut;
pub mod library;

use std::collections::{HashMap, HashSet};

use log::trace;
use thiserror::Error;

use crate::{
    Aig, AigEdge, AigError, Birth, Level, NodeId,
    aig::simulate::switching,
    certificate::{CertifSession, CertificateError},
};

pub use cut::{Cut, CutCount, CutManager, Leaf};
pub use library::{Library, Placement, Structure};

/// Number of nodes a rewrite removes from the AIG. Can be negative.
pub type Gain = i32;

/// The result of an oracle operation.
pub type Result<T> = std::result::Result<T, OracleError>;

/// Error returned when an oracle operation failed.
#[derive(Debug, Error)]
pub enum OracleError {
    /// `build_best` was called while no candidate has been retained for the current node.
    #[error("no rewriting candidate to build")]
    NoCandidate,

    #[error("{0}")]
    Aig(#[from] AigError),

    #[error("{0}")]
    Certificate(#[from] CertificateError),
}

/// What the rewriting driver needs from cut enumeration and library matching.
///
/// Between [`compute_cuts`](CutOracle::compute_cuts) and
/// [`build_best`](CutOracle::build_best), the oracle keeps the best candidate seen by
/// [`evaluate`](CutOracle::evaluate) for the current node.
pub trait CutOracle {
    /// Cut set of `node`. Resets the best candidate.
    fn compute_cuts(&mut self, aig: &Aig, node: NodeId) -> Result<Vec<Cut>>;

    /// Evaluates every library candidate for `cut`, keeping the best one for `node`.
    /// Candidates whose root would sit above `required` are rejected.
    /// Returns the best gain of this cut, if any candidate was admissible.
    fn evaluate(&mut self, aig: &Aig, node: NodeId, cut: &Cut, required: Level) -> Result<Option<Gain>>;

    fn best_gain(&self) -> Option<Gain>;

    /// Library class (structure index) of the best candidate.
    fn best_class(&self) -> Option<usize>;

    /// Size of the maximum fanout-free cone of the current node, bounded by the first
    /// evaluated cut. Only used for reporting.
    fn mffc_size(&self) -> Option<usize>;

    /// Builds the best candidate and returns its (uncomplemented) root.
    ///
    /// Every and gate actually created is announced to `session` with a `Create` record,
    /// before anything references it.
    fn build_best(&mut self, aig: &mut Aig, session: &mut CertifSession) -> Result<NodeId>;

    /// Drops the cuts of `node`.
    fn forget_cuts(&mut self, aig: &Aig, node: NodeId);

    /// Drops every cut, then recomputes those of `node`.
    fn restart_cuts(&mut self, aig: &Aig, node: NodeId) -> Result<()>;

    /// Number of cuts currently stored.
    fn cut_storage_len(&self) -> usize;

    fn free_cuts(&mut self);

    /// Prepares power-aware tie-breaking. Does nothing by default.
    fn prepare_power(&mut self, _aig: &Aig) -> Result<()> {
        Ok(())
    }
}

/// A signal of a candidate: either an existing edge, or the `k`-th gate to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Lit {
    Old(AigEdge),
    New(usize, bool),
}

impl Lit {
    fn not_cond(self, cond: bool) -> Self {
        match self {
            Lit::Old(edge) => Lit::Old(edge.not_cond(cond)),
            Lit::New(k, compl) => Lit::New(k, compl ^ cond),
        }
    }

    fn is_complement_of(self, other: Lit) -> bool {
        match (self, other) {
            (Lit::Old(a), Lit::Old(b)) => a.is_complement_of(&b),
            (Lit::New(a, ca), Lit::New(b, cb)) => a == b && ca != cb,
            _ => false,
        }
    }

    fn constant(self) -> Option<bool> {
        match self {
            Lit::Old(edge) if edge.is_cst() => Some(edge.get_complement()),
            _ => None,
        }
    }
}

/// Gates to create, in topological order, and the signal realizing the node.
#[derive(Debug, Clone)]
struct Plan {
    gates: Vec<(Lit, Lit)>,
    root: Lit,
}

/// Resolves `a & b`: constant propagation, then the structural hash table of `aig` for existing
/// signals, or the candidate's own table for gates to create.
fn and_lits(aig: &Aig, a: Lit, b: Lit, gates: &mut Vec<(Lit, Lit)>, strash: &mut HashMap<(Lit, Lit), usize>) -> Lit {
    if let (Lit::Old(x), Lit::Old(y)) = (a, b) {
        if let Some(edge) = aig.lookup_and(x, y) {
            return Lit::Old(edge);
        }
    } else if a == b {
        return a;
    } else if a.is_complement_of(b) || a.constant() == Some(false) || b.constant() == Some(false) {
        return Lit::Old(aig.const_false());
    } else if a.constant() == Some(true) {
        return b;
    } else if b.constant() == Some(true) {
        return a;
    }
    let key = if a <= b { (a, b) } else { (b, a) };
    let k = *strash.entry(key).or_insert_with(|| {
        gates.push(key);
        gates.len() - 1
    });
    Lit::New(k, false)
}

impl Plan {
    /// Instantiates `structure` on the leaves of `cut`. Returns `None` if the candidate would
    /// reuse `node` itself.
    fn resolve(aig: &Aig, node: NodeId, cut: &Cut, structure: &Structure, placement: &Placement) -> Option<Plan> {
        let mut gates = Vec::new();
        let mut strash = HashMap::new();
        let mut states = Vec::with_capacity(1 + structure.n_inputs() + structure.size());
        states.push(Lit::Old(aig.const_false()));
        for i in 0..structure.n_inputs() {
            let leaf = cut.leaves()[placement.positions[i] as usize];
            states.push(Lit::Old(AigEdge::new(leaf.node, placement.input_inverted(i))));
        }
        let lit = |states: &[Lit], l: i8| states[l.unsigned_abs() as usize].not_cond(l < 0);
        for &(a, b) in structure.gates() {
            let (a, b) = (lit(&states, a), lit(&states, b));
            let out = and_lits(aig, a, b, &mut gates, &mut strash);
            states.push(out);
        }
        let root = states.last()?.not_cond(placement.output_inverted);

        // Keep only the gates the root reads
        let mut used = vec![false; gates.len()];
        if let Lit::New(k, _) = root {
            used[k] = true;
        }
        for k in (0..gates.len()).rev() {
            if !used[k] {
                continue;
            }
            for lit in [gates[k].0, gates[k].1] {
                if let Lit::New(j, _) = lit {
                    used[j] = true;
                }
            }
        }
        let mut renumber = vec![0; gates.len()];
        let mut kept = Vec::new();
        for (k, &(a, b)) in gates.iter().enumerate() {
            if used[k] {
                renumber[k] = kept.len();
                kept.push((a, b));
            }
        }
        let remap = |lit: Lit| match lit {
            Lit::New(k, compl) => Lit::New(renumber[k], compl),
            old => old,
        };
        let plan = Plan {
            gates: kept.into_iter().map(|(a, b)| (remap(a), remap(b))).collect(),
            root: remap(root),
        };
        if plan.old_nodes().any(|id| id == node) {
            return None;
        }
        Some(plan)
    }

    /// Existing nodes read by the plan (through the root or the gates to create).
    fn old_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.root)
            .chain(self.gates.iter().flat_map(|&(a, b)| [a, b]))
            .filter_map(|lit| match lit {
                Lit::Old(edge) => Some(edge.get_node_id()),
                Lit::New(..) => None,
            })
    }

    fn root_level(&self, aig: &Aig) -> Result<Level> {
        let mut levels: Vec<Level> = Vec::with_capacity(self.gates.len());
        let level = |levels: &[Level], lit: Lit| -> Result<Level> {
            match lit {
                Lit::Old(edge) => Ok(aig.node(edge.get_node_id())?.get_level()),
                Lit::New(k, _) => Ok(levels[k]),
            }
        };
        for &(a, b) in &self.gates {
            let l = 1 + level(&levels, a)?.max(level(&levels, b)?);
            levels.push(l);
        }
        level(&levels, self.root)
    }

    /// Sum of the switching activities of the gates to create.
    fn switching(&self, aig: &Aig, probabilities: &HashMap<Birth, f32>) -> f32 {
        let mut ones: Vec<f32> = Vec::with_capacity(self.gates.len());
        let one = |ones: &[f32], lit: Lit| {
            let (p, compl) = match lit {
                Lit::Old(edge) => (
                    aig.get_node(edge.get_node_id())
                        .and_then(|n| probabilities.get(&n.get_birth()))
                        .copied()
                        .unwrap_or(0.5),
                    edge.get_complement(),
                ),
                Lit::New(k, compl) => (ones[k], compl),
            };
            if compl { 1.0 - p } else { p }
        };
        for &(a, b) in &self.gates {
            let p = one(&ones, a) * one(&ones, b);
            ones.push(p);
        }
        ones.iter().map(|&p| switching(p)).sum()
    }
}

/// Maximum fanout-free cone of `node`, bounded by the leaves of `cut`.
fn mffc(aig: &Aig, node: NodeId, cut: &Cut) -> Result<HashSet<NodeId>> {
    let mut refs: HashMap<NodeId, u32> = HashMap::new();
    let mut cone = HashSet::from([node]);
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
        for fanin in aig.node(id)?.get_fanins() {
            let child = fanin.get_node_id();
            if cut.leaves().iter().any(|l| l.node == child) {
                continue;
            }
            let child_node = aig.node(child)?;
            if !child_node.is_and() {
                continue;
            }
            let r = refs.entry(child).or_insert(child_node.get_refs());
            *r = r.saturating_sub(1);
            if *r == 0 && cone.insert(child) {
                stack.push(child);
            }
        }
    }
    Ok(cone)
}

/// Nodes of `cone` that stay alive because the plan reads them (directly or through other
/// nodes of the cone).
fn kept_in_cone(aig: &Aig, plan: &Plan, cone: &HashSet<NodeId>) -> Result<usize> {
    let mut kept: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = plan.old_nodes().filter(|id| cone.contains(id)).collect();
    while let Some(id) = stack.pop() {
        if !kept.insert(id) {
            continue;
        }
        for fanin in aig.node(id)?.get_fanins() {
            if cone.contains(&fanin.get_node_id()) {
                stack.push(fanin.get_node_id());
            }
        }
    }
    Ok(kept.len())
}

/// Best candidate retained for the current node.
#[derive(Debug, Clone)]
struct Choice {
    plan: Plan,
    gain: Gain,
    level: Level,
    class: usize,
    switching: f32,
}

/// The oracle shipped with the crate: 4-input cuts matched against [`Library`].
#[derive(Debug, Clone)]
pub struct DarOracle {
    cuts: CutManager,
    library: Library,
    power_aware: bool,
    probabilities: HashMap<Birth, f32>,
    best: Option<Choice>,
    mffc_size: Option<usize>,
}

/// Words of random patterns used to estimate signal probabilities.
const PROBABILITY_WORDS: usize = 64;
const PROBABILITY_SEED: u64 = 0x5eed;

impl DarOracle {
    pub fn new(max_cuts: usize, max_subgraph_size: usize, power_aware: bool) -> Self {
        DarOracle {
            cuts: CutManager::new(max_cuts),
            library: Library::new(max_subgraph_size),
            power_aware,
            probabilities: HashMap::new(),
            best: None,
            mffc_size: None,
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Counts the cuts currently stored for the and gates of `aig`.
    pub fn count_cuts(&self, aig: &Aig) -> CutCount {
        self.cuts.count_cuts(aig)
    }

    fn is_better(&self, candidate: &Choice) -> bool {
        let Some(best) = &self.best else {
            return true;
        };
        if candidate.gain != best.gain {
            return candidate.gain > best.gain;
        }
        if self.power_aware {
            candidate.switching < best.switching
        } else {
            candidate.level < best.level
        }
    }
}

impl CutOracle for DarOracle {
    fn compute_cuts(&mut self, aig: &Aig, node: NodeId) -> Result<Vec<Cut>> {
        self.best = None;
        self.mffc_size = None;
        Ok(self.cuts.compute(aig, node)?.to_vec())
    }

    fn evaluate(&mut self, aig: &Aig, node: NodeId, cut: &Cut, required: Level) -> Result<Option<Gain>> {
        if cut.len() < 2 {
            return Ok(None);
        }
        let cone = mffc(aig, node, cut)?;
        self.mffc_size.get_or_insert(cone.len());

        let mut best_of_cut = None;
        for placement in self.library.candidates(cut.truth()) {
            let Some(structure) = self.library.structure(placement.structure) else {
                continue;
            };
            if !placement.fits(structure.n_inputs(), cut.len()) {
                continue;
            }
            let Some(plan) = Plan::resolve(aig, node, cut, structure, placement) else {
                continue;
            };
            let level = plan.root_level(aig)?;
            if level > required {
                continue;
            }
            let kept = kept_in_cone(aig, &plan, &cone)?;
            let gain = cone.len() as Gain - kept as Gain - plan.gates.len() as Gain;
            if gain < 0 {
                continue;
            }
            best_of_cut = best_of_cut.max(Some(gain));
            let switching = if self.power_aware {
                plan.switching(aig, &self.probabilities)
            } else {
                0.0
            };
            let candidate = Choice {
                plan,
                gain,
                level,
                class: placement.structure,
                switching,
            };
            if self.is_better(&candidate) {
                self.best = Some(candidate);
            }
        }
        Ok(best_of_cut)
    }

    fn best_gain(&self) -> Option<Gain> {
        self.best.as_ref().map(|c| c.gain)
    }

    fn best_class(&self) -> Option<usize> {
        self.best.as_ref().map(|c| c.class)
    }

    fn mffc_size(&self) -> Option<usize> {
        self.mffc_size
    }

    fn build_best(&mut self, aig: &mut Aig, session: &mut CertifSession) -> Result<NodeId> {
        let plan = self
            .best
            .as_ref()
            .map(|c| c.plan.clone())
            .ok_or(OracleError::NoCandidate)?;
        let mut created: Vec<AigEdge> = Vec::with_capacity(plan.gates.len());
        let edge = |created: &[AigEdge], lit: Lit| match lit {
            Lit::Old(edge) => edge,
            Lit::New(k, compl) => created[k].not_cond(compl),
        };
        for &(a, b) in &plan.gates {
            let (a, b) = (edge(&created, a), edge(&created, b));
            let out = match aig.lookup_and(a, b) {
                Some(out) => out,
                None => {
                    let id = aig.create_and(a, b, session.fresh_id()?)?;
                    let certif_id = aig.node(id)?.get_certif_id();
                    session.record_create(certif_id, aig.edge_certif(a)?, aig.edge_certif(b)?)?;
                    trace!("created slot {} (stable id {})", id, certif_id);
                    if self.power_aware {
                        let p = |e: AigEdge| {
                            let p = aig
                                .get_node(e.get_node_id())
                                .and_then(|n| self.probabilities.get(&n.get_birth()))
                                .copied()
                                .unwrap_or(0.5);
                            if e.get_complement() { 1.0 - p } else { p }
                        };
                        let probability = p(a) * p(b);
                        self.probabilities
                            .insert(aig.node(id)?.get_birth(), probability);
                    }
                    AigEdge::new(id, false)
                }
            };
            created.push(out);
        }
        Ok(edge(&created, plan.root).get_node_id())
    }

    fn forget_cuts(&mut self, aig: &Aig, node: NodeId) {
        self.cuts.forget(aig, node);
    }

    fn restart_cuts(&mut self, aig: &Aig, node: NodeId) -> Result<()> {
        self.cuts.clear();
        self.cuts.compute(aig, node)?;
        Ok(())
    }

    fn cut_storage_len(&self) -> usize {
        self.cuts.storage_len()
    }

    fn free_cuts(&mut self) {
        self.cuts.clear();
        self.best = None;
        self.probabilities.clear();
    }

    fn prepare_power(&mut self, aig: &Aig) -> Result<()> {
        let probabilities = aig.one_probabilities(PROBABILITY_WORDS, PROBABILITY_SEED)?;
        self.probabilities = probabilities
            .into_iter()
            .filter_map(|(id, p)| aig.get_node(id).map(|n| (n.get_birth(), p)))
            .collect();
        Ok(())
    }
}
