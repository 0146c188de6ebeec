//! The rewriting pass: every and gate is visited once, in creation order, and replaced by a
//! smaller equivalent structure when the oracle finds one.
//!
//! In certified mode ([`Rewriter::rewrite_certified`]), every edit of the pass is recorded and
//! the resulting [`Certificate`](crate::certificate::Certificate) is appended to the caller's
//! [`CertificateTrail`].
//!
//! ```rust
//! use certaig::{Aig, certificate::CertificateTrail, rewrite::{RewriteParams, rewrite_certified}};
//! let mut aig = Aig::new();
//! let a = aig.add_input();
//! let b = aig.add_input();
//! let c = aig.add_input();
//! let ab = aig.and(a, b).unwrap();
//! let ac = aig.and(a, c).unwrap();
//! let out = aig.and(ab, ac).unwrap();
//! aig.add_output(out).unwrap();
//!
//! let mut trail = CertificateTrail::new();
//! let stats = rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();
//! assert_eq!(aig.node_num(), 2);
//! assert_eq!(stats.rewrites, 1);
//! assert_eq!(trail.len(), 1);
//! ```

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::{
    Aig, AigEdge, AigError, Level, NodeId,
    certificate::{CertifSession, CertificateError, CertificateTrail, StableId, StableLit},
    oracle::{Cut, CutOracle, DarOracle, Gain, OracleError},
};

/// The deadline is checked every that many visited objects.
const DEADLINE_PERIOD: usize = 256;
/// Cut storage may be recycled every that many candidate nodes.
const RECYCLE_PERIOD: usize = 50_000;

/// Parameters of a rewriting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteParams {
    /// Largest number of cuts kept per node.
    pub max_cuts_per_node: usize,
    /// Largest number of gates of a library structure.
    pub max_subgraph_size: usize,
    /// Smallest gain for a rewrite to be applied.
    pub min_gain_to_accept: Gain,
    pub use_fanout_tracking: bool,
    /// Reject rewrites that would increase the depth of the AIG.
    pub update_levels: bool,
    /// Apply rewrites of gain 0 (the minimum gain is then forced to 0).
    pub accept_zero_gain_rewrites: bool,
    /// Break ties between candidates of equal gain by switching activity.
    pub power_aware: bool,
    pub recycle_cut_storage: bool,
    /// Log the summary of the pass at `info` level.
    pub verbose: bool,
}

impl Default for RewriteParams {
    fn default() -> Self {
        RewriteParams {
            max_cuts_per_node: 8,
            max_subgraph_size: 5,
            min_gain_to_accept: 1,
            use_fanout_tracking: true,
            update_levels: false,
            accept_zero_gain_rewrites: false,
            power_aware: false,
            recycle_cut_storage: true,
            verbose: false,
        }
    }
}

/// What a pass did. Reporting only.
#[derive(Debug, Clone, Default)]
pub struct RewriteStats {
    pub nodes_initial: usize,
    pub nodes_final: usize,
    pub nodes_tried: usize,
    /// Library rewrites applied.
    pub rewrites: usize,
    /// Nodes replaced by a constant or by one of their leaves.
    pub trivial_replacements: usize,
    /// Nodes saved by library rewrites, by library class.
    pub class_gains: BTreeMap<usize, i64>,
    pub total_gain: i64,
    /// The deadline stopped the pass before every node was visited.
    pub timed_out: bool,
    pub time_cuts: Duration,
    pub time_eval: Duration,
    pub time_other: Duration,
    pub time_total: Duration,
}

/// The result of a rewriting pass.
pub type Result<T> = std::result::Result<T, RewriteError>;

/// Error returned when a rewriting pass failed.
///
/// Every variant but [`RewriteError::NetworkCheck`] aborts the pass: no certificate is
/// appended to the trail.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("{0}")]
    Aig(#[from] AigError),

    #[error("{0}")]
    Certificate(#[from] CertificateError),

    #[error("{0}")]
    Oracle(#[from] OracleError),

    /// The replacement built by the oracle is deeper than allowed.
    #[error("replacement of node {node} has level {level}, above the required level {required}")]
    LevelViolation {
        node: NodeId,
        level: Level,
        required: Level,
    },

    /// The rewrite saved fewer nodes than the oracle estimated.
    #[error("rewriting node {node} was estimated to save {estimated} nodes, it saved {realized}")]
    GainMismatch {
        node: NodeId,
        estimated: Gain,
        realized: Gain,
    },

    /// A cut with less than 2 leaves whose truth table is not a constant or a literal.
    #[error("trivial cut of node {node} has truth table {truth:#06x}")]
    InvalidTrivialCut { node: NodeId, truth: u16 },

    /// The AIG failed its consistency checks at the end of the pass.
    /// The certificate of the pass has been appended to the trail nonetheless.
    #[error("network check failed after rewriting: {0}")]
    NetworkCheck(AigError),
}

/// Tells a pass when to stop early.
pub trait Deadline {
    fn expired(&mut self) -> bool;
}

impl Deadline for Instant {
    fn expired(&mut self) -> bool {
        Instant::now() >= *self
    }
}

/// Runs rewriting passes with a given oracle.
pub struct Rewriter<O: CutOracle> {
    params: RewriteParams,
    oracle: O,
    deadline: Option<Box<dyn Deadline>>,
}

impl Rewriter<DarOracle> {
    /// A rewriter using the library shipped with the crate.
    pub fn with_params(params: RewriteParams) -> Self {
        let oracle = DarOracle::new(
            params.max_cuts_per_node,
            params.max_subgraph_size,
            params.power_aware,
        );
        Rewriter::new(params, oracle)
    }
}

/// Stable literal naming `edge` in a certificate. Constants are named by [`StableId::CONST0`]
/// and [`StableId::CONST1`], never complemented.
fn certif_target(aig: &Aig, edge: AigEdge) -> Result<StableLit> {
    if edge.is_cst() {
        let id = if edge.get_complement() {
            StableId::CONST1
        } else {
            StableId::CONST0
        };
        return Ok((id, false));
    }
    Ok(aig.edge_certif(edge)?)
}

/// A cut proving that the node is a constant or a (possibly inverted) leaf.
fn is_trivial(aig: &Aig, node: NodeId, cut: &Cut) -> bool {
    match cut.leaves() {
        [] => true,
        [leaf] => leaf.node != node && leaf.is_alive(aig),
        _ => false,
    }
}

impl<O: CutOracle> Rewriter<O> {
    pub fn new(params: RewriteParams, oracle: O) -> Self {
        Rewriter {
            params,
            oracle,
            deadline: None,
        }
    }

    /// Stops the passes once `deadline` has expired.
    pub fn with_deadline(mut self, deadline: impl Deadline + 'static) -> Self {
        self.deadline = Some(Box::new(deadline));
        self
    }

    pub fn params(&self) -> &RewriteParams {
        &self.params
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// One rewriting pass, without certificate.
    pub fn rewrite(&mut self, aig: &mut Aig) -> Result<RewriteStats> {
        self.run(aig, None)
    }

    /// One certified rewriting pass: its certificate is appended to `trail`, even when no
    /// node was rewritten.
    pub fn rewrite_certified(&mut self, aig: &mut Aig, trail: &mut CertificateTrail) -> Result<RewriteStats> {
        self.run(aig, Some(trail))
    }

    fn run(&mut self, aig: &mut Aig, trail: Option<&mut CertificateTrail>) -> Result<RewriteStats> {
        let start = Instant::now();
        let mut stats = RewriteStats::default();
        let min_gain = if self.params.accept_zero_gain_rewrites {
            0
        } else {
            self.params.min_gain_to_accept
        };

        aig.cleanup()?;
        if self.params.use_fanout_tracking {
            aig.start_fanout();
        }
        if self.params.update_levels {
            aig.start_reverse_levels()?;
        }
        if self.params.power_aware {
            self.oracle.prepare_power(aig)?;
        }
        stats.nodes_initial = aig.node_num();
        let mut session = match trail {
            Some(_) => CertifSession::tracked(aig.stable_id_bound().get())?,
            None => CertifSession::untracked(),
        };

        let outcome = self.visit_all(aig, &mut session, min_gain, &mut stats);

        self.oracle.free_cuts();
        aig.stop_fanout();
        aig.stop_reverse_levels();
        // A failed pass drops its session, and the certificate with it.
        outcome?;
        if let Some(trail) = trail {
            session.finalize(trail)?;
        }

        stats.nodes_final = aig.node_num();
        stats.time_total = start.elapsed();
        stats.time_other = stats
            .time_total
            .saturating_sub(stats.time_cuts + stats.time_eval);
        self.report(&stats);

        if let Err(e) = aig.check_phase().and_then(|_| aig.check_integrity()) {
            warn!("rewriting: the network check has failed: {}", e);
            return Err(RewriteError::NetworkCheck(e));
        }
        Ok(stats)
    }

    fn report(&self, stats: &RewriteStats) {
        let summary = format!(
            "rewriting: {} -> {} nodes ({} tried, {} rewrites, {} trivial), cuts {:?}, eval {:?}, other {:?}, total {:?}",
            stats.nodes_initial,
            stats.nodes_final,
            stats.nodes_tried,
            stats.rewrites,
            stats.trivial_replacements,
            stats.time_cuts,
            stats.time_eval,
            stats.time_other,
            stats.time_total
        );
        if self.params.verbose {
            info!("{}", summary);
        } else {
            debug!("{}", summary);
        }
    }

    fn deadline_expired(&mut self) -> bool {
        self.deadline.as_mut().is_some_and(|d| d.expired())
    }

    /// Visits the nodes that existed when the pass started, in creation order.
    fn visit_all(&mut self, aig: &mut Aig, session: &mut CertifSession, min_gain: Gain, stats: &mut RewriteStats) -> Result<()> {
        let bound = aig.creation_bound();
        let mut cursor = None;
        let mut visited = 0;
        let mut candidates = 0;
        while let Some((birth, id)) = aig.next_in_order(cursor) {
            cursor = Some(birth);
            if visited % DEADLINE_PERIOD == 0 && self.deadline_expired() {
                info!("rewriting: deadline reached after {} objects", visited);
                stats.timed_out = true;
                break;
            }
            visited += 1;
            if !aig.node(id)?.is_and() {
                continue;
            }
            if birth >= bound {
                break;
            }
            candidates += 1;
            if self.params.recycle_cut_storage
                && candidates % RECYCLE_PERIOD == 0
                && aig.dag_size(id) < self.oracle.cut_storage_len() / 100
            {
                debug!("rewriting: recycling cut storage at node {}", id);
                self.oracle.restart_cuts(aig, id)?;
            }
            self.visit(aig, session, id, min_gain, stats)?;
        }
        Ok(())
    }

    fn visit(&mut self, aig: &mut Aig, session: &mut CertifSession, id: NodeId, min_gain: Gain, stats: &mut RewriteStats) -> Result<()> {
        stats.nodes_tried += 1;
        let clock = Instant::now();
        let cuts = self.oracle.compute_cuts(aig, id)?;
        stats.time_cuts += clock.elapsed();

        if let Some(cut) = cuts.iter().find(|c| is_trivial(aig, id, c)) {
            let new = match (cut.leaves(), cut.truth()) {
                ([], 0x0000) => aig.const_false(),
                ([], 0xFFFF) => aig.const_true(),
                ([leaf], 0xAAAA) => AigEdge::new(leaf.node, false),
                ([leaf], 0x5555) => AigEdge::new(leaf.node, true),
                (_, truth) => return Err(RewriteError::InvalidTrivialCut { node: id, truth }),
            };
            let old_id = aig.node(id)?.get_certif_id();
            let (new_id, complement) = certif_target(aig, new)?;
            session.record_replace(old_id, new_id, complement)?;
            debug!(
                "replacing {}({}) with {}({}) - compl: {}",
                old_id,
                id,
                new_id,
                new.get_node_id(),
                complement
            );
            self.oracle.forget_cuts(aig, id);
            aig.replace(id, new)?;
            stats.trivial_replacements += 1;
            return Ok(());
        }

        let required = aig.required_level(id)?;
        let clock = Instant::now();
        for cut in &cuts {
            self.oracle.evaluate(aig, id, cut, required)?;
        }
        stats.time_eval += clock.elapsed();
        let Some(gain) = self.oracle.best_gain().filter(|&g| g >= min_gain) else {
            trace!(
                "skipping node {} (best gain {:?}, mffc {:?})",
                id,
                self.oracle.best_gain(),
                self.oracle.mffc_size()
            );
            return Ok(());
        };
        let class = self.oracle.best_class();
        self.oracle.forget_cuts(aig, id);

        let before = aig.node_num();
        let root = self.oracle.build_best(aig, session)?;
        let root_node = aig.node(root)?;
        let complement = root_node.get_phase() ^ aig.node(id)?.get_phase();
        let level = root_node.get_level();
        if level > required {
            return Err(RewriteError::LevelViolation {
                node: id,
                level,
                required,
            });
        }

        let old_id = aig.node(id)?.get_certif_id();
        let (new_id, complement_id) = certif_target(aig, AigEdge::new(root, complement))?;
        session.record_replace(old_id, new_id, complement_id)?;
        session.record_hint(old_id, new_id, complement_id)?;
        debug!("replacing {}({}) with {}({})", old_id, id, new_id, root);
        aig.replace(id, AigEdge::new(root, complement))?;

        let realized = before as Gain - aig.node_num() as Gain;
        if realized < gain {
            return Err(RewriteError::GainMismatch {
                node: id,
                estimated: gain,
                realized,
            });
        }
        if let Some(class) = class {
            *stats.class_gains.entry(class).or_insert(0) += realized as i64;
        }
        stats.total_gain += realized as i64;
        stats.rewrites += 1;
        Ok(())
    }
}

/// One rewriting pass with the library shipped with the crate.
pub fn rewrite(aig: &mut Aig, params: RewriteParams) -> Result<RewriteStats> {
    Rewriter::with_params(params).rewrite(aig)
}

/// One certified rewriting pass with the library shipped with the crate.
pub fn rewrite_certified(aig: &mut Aig, params: RewriteParams, trail: &mut CertificateTrail) -> Result<RewriteStats> {
    Rewriter::with_params(params).rewrite_certified(aig, trail)
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, rc::Rc};

    use proptest::prelude::*;

    use super::*;
    use crate::{
        aig::simulate::equivalent,
        certificate::{Hint, Mutation, Replay},
        oracle,
    };

    /// out = (a & b) & (a & c)
    fn redundant() -> Aig {
        let mut aig = Aig::new();
        let a = aig.add_input();
        let b = aig.add_input();
        let c = aig.add_input();
        let ab = aig.and(a, b).unwrap();
        let ac = aig.and(a, c).unwrap();
        let out = aig.and(ab, ac).unwrap();
        aig.add_output(out).unwrap();
        aig
    }

    fn replays(before: &Aig, trail: &CertificateTrail, after: &Aig) -> bool {
        let mut replay = Replay::from_aig(before).unwrap();
        replay.apply_trail(trail).unwrap();
        replay.equivalent_to(after, 4, 0).unwrap()
    }

    fn replaces(mutations: &[Mutation]) -> Vec<(StableId, StableId, bool)> {
        mutations
            .iter()
            .filter_map(|m| match *m {
                Mutation::Replace {
                    old_id,
                    new_id,
                    complement,
                } => Some((old_id, new_id, complement)),
                Mutation::Create { .. } => None,
            })
            .collect()
    }

    #[test_log::test]
    fn certified_pass_on_redundant_circuit() {
        let mut aig = redundant();
        let before = aig.clone();
        let bound = aig.stable_id_bound();
        let mut trail = CertificateTrail::new();
        let stats = rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();

        assert_eq!(stats.nodes_initial, 3);
        assert_eq!(stats.nodes_final, 2);
        assert_eq!(stats.rewrites, 1);
        assert_eq!(stats.total_gain, 1);
        assert_eq!(stats.class_gains.values().sum::<i64>(), 1);
        assert_eq!(trail.len(), 1);

        let certificate = trail.last().unwrap();
        // One hint per library rewrite, identical to its replacement
        let hints: Vec<_> = certificate
            .hints()
            .iter()
            .map(|h| (h.id, h.id_eq, h.compl_eq))
            .collect();
        assert_eq!(hints, replaces(certificate.mutations()));
        // New ids are above every id of the graph before the pass, and increasing
        let created: Vec<StableId> = certificate
            .mutations()
            .iter()
            .filter_map(|m| match *m {
                Mutation::Create { id, .. } => Some(id),
                Mutation::Replace { .. } => None,
            })
            .collect();
        assert!(!created.is_empty());
        assert!(created.iter().all(|&id| id > bound));
        assert!(created.windows(2).all(|w| w[0] < w[1]));

        assert!(equivalent(&aig, &before, 1, 0).unwrap());
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn trail_grows_by_one_per_certified_pass() {
        let mut aig = redundant();
        let mut trail = CertificateTrail::new();
        let mut rewriter = Rewriter::with_params(RewriteParams::default());
        rewriter.rewrite_certified(&mut aig, &mut trail).unwrap();
        rewriter.rewrite_certified(&mut aig, &mut trail).unwrap();
        rewriter.rewrite(&mut aig).unwrap();
        rewriter.rewrite_certified(&mut aig, &mut trail).unwrap();
        assert_eq!(trail.len(), 3);
        // Nothing left to do after the first pass
        assert!(!trail.get(0).unwrap().is_empty());
        assert!(trail.get(1).unwrap().is_empty());
        assert!(trail.get(2).unwrap().is_empty());
    }

    #[test_log::test]
    fn ids_survive_slot_reuse_across_passes() {
        // Two redundant cones: slots freed by the first rewrite get reused by the second one
        let mut aig = Aig::new();
        let inputs: Vec<AigEdge> = (0..6).map(|_| aig.add_input()).collect();
        for k in [0, 3] {
            let (a, b, c) = (inputs[k], inputs[k + 1], inputs[k + 2]);
            let ab = aig.and(a, b).unwrap();
            let ac = aig.and(a, c).unwrap();
            let out = aig.and(ab, ac).unwrap();
            aig.add_output(out).unwrap();
        }
        let before = aig.clone();
        let mut trail = CertificateTrail::new();
        rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();
        rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();

        let mut seen = std::collections::HashSet::new();
        for certificate in &trail {
            for mutation in certificate.mutations() {
                if let Mutation::Create { id, .. } = *mutation {
                    assert!(seen.insert(id), "stable id {} created twice", id);
                    assert!(id > before.stable_id_bound());
                }
            }
        }
        assert!(aig.obj_num_max() < before.obj_num_max() + seen.len());
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn zero_gain_boundary() {
        // (a & b) & c can only be rebuilt with as many gates
        let build = || {
            let mut aig = Aig::new();
            let a = aig.add_input();
            let b = aig.add_input();
            let c = aig.add_input();
            let ab = aig.and(a, b).unwrap();
            let out = aig.and(ab, c).unwrap();
            aig.add_output(out).unwrap();
            aig
        };

        let mut aig = build();
        let mut trail = CertificateTrail::new();
        let stats = rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();
        assert_eq!(stats.rewrites, 0);
        assert!(trail.last().unwrap().is_empty());

        let mut aig = build();
        let before = aig.clone();
        let params = RewriteParams {
            accept_zero_gain_rewrites: true,
            ..Default::default()
        };
        let mut trail = CertificateTrail::new();
        let stats = rewrite_certified(&mut aig, params, &mut trail).unwrap();
        assert_eq!(stats.rewrites, 1);
        assert_eq!(stats.total_gain, 0);
        assert_eq!(aig.node_num(), 2);
        let certificate = trail.last().unwrap();
        assert_eq!(certificate.hints().len(), 1);
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn trivial_inverted_buffer() {
        // !(a & b) & !(a & !b) is !a
        let mut aig = Aig::new();
        let a = aig.add_input();
        let b = aig.add_input();
        let x = aig.and(a, b).unwrap();
        let y = aig.and(a, !b).unwrap();
        let out = aig.and(!x, !y).unwrap();
        aig.add_output(out).unwrap();
        let before = aig.clone();
        let out_id = aig.edge_certif(out).unwrap().0;
        let a_id = aig.edge_certif(a).unwrap().0;

        let mut trail = CertificateTrail::new();
        let stats = rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();
        assert_eq!(stats.trivial_replacements, 1);
        assert_eq!(aig.node_num(), 0);
        assert_eq!(aig.get_outputs(), &[!a]);

        let certificate = trail.last().unwrap();
        assert_eq!(
            certificate.mutations(),
            &[Mutation::Replace {
                old_id: out_id,
                new_id: a_id,
                complement: true
            }]
        );
        assert!(certificate.hints().is_empty());
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn chain_of_repeated_fanins_collapses() {
        // n3 = a & !b, n4 = n3 & !b, n6 = n4 & !b are all the same function
        let mut aig = Aig::new();
        let a = aig.add_input();
        let b = aig.add_input();
        let n3 = aig.and(a, !b).unwrap();
        let n4 = aig.and(n3, !b).unwrap();
        let n6 = aig.and(n4, !b).unwrap();
        aig.add_output(n6).unwrap();
        let before = aig.clone();

        let mut trail = CertificateTrail::new();
        let stats = rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();
        assert_eq!(stats.rewrites, 2);
        assert_eq!(aig.node_num(), 1);
        assert_eq!(aig.get_outputs(), &[n3]);

        let n3_id = aig_id(&before, n3);
        let certificate = trail.last().unwrap();
        assert_eq!(
            replaces(certificate.mutations()),
            vec![
                (aig_id(&before, n4), n3_id, false),
                (aig_id(&before, n6), n3_id, false)
            ]
        );
        assert_eq!(certificate.hints().len(), 2);
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn trivial_constant_uses_reserved_ids() {
        // (a & b) & (!a & c) is constant false
        let mut aig = Aig::new();
        let a = aig.add_input();
        let b = aig.add_input();
        let c = aig.add_input();
        let ab = aig.and(a, b).unwrap();
        let nac = aig.and(!a, c).unwrap();
        let out = aig.and(ab, nac).unwrap();
        aig.add_output(!out).unwrap();
        let before = aig.clone();

        let mut trail = CertificateTrail::new();
        rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();
        assert_eq!(aig.get_outputs(), &[aig.const_true()]);
        let certificate = trail.last().unwrap();
        assert_eq!(
            replaces(certificate.mutations()),
            vec![(aig_id(&before, out), StableId::CONST0, false)]
        );
        assert!(replays(&before, &trail, &aig));
    }

    fn aig_id(aig: &Aig, edge: AigEdge) -> StableId {
        aig.edge_certif(edge).unwrap().0
    }

    /// Creates `x & y`, announcing it to the session.
    fn create(aig: &mut Aig, session: &mut CertifSession, x: AigEdge, y: AigEdge) -> oracle::Result<AigEdge> {
        let id = aig.create_and(x, y, session.fresh_id()?)?;
        let certif_id = aig.node(id)?.get_certif_id();
        session.record_create(certif_id, aig.edge_certif(x)?, aig.edge_certif(y)?)?;
        Ok(AigEdge::new(id, false))
    }

    type Builder = fn(&mut Aig, &mut CertifSession) -> oracle::Result<NodeId>;

    /// Proposes a fixed rewrite for the last node of the AIG, and nothing else.
    struct ScriptedOracle {
        target: NodeId,
        gain: Gain,
        cut: Option<Cut>,
        build: Builder,
        best: Option<Gain>,
        built: usize,
    }

    impl ScriptedOracle {
        fn new(target: NodeId, gain: Gain, build: Builder) -> Self {
            ScriptedOracle {
                target,
                gain,
                cut: None,
                build,
                best: None,
                built: 0,
            }
        }
    }

    impl CutOracle for ScriptedOracle {
        fn compute_cuts(&mut self, aig: &Aig, node: NodeId) -> oracle::Result<Vec<Cut>> {
            self.best = None;
            let mut cuts = vec![Cut::unit(aig.node(node)?)];
            if node == self.target {
                cuts.extend(self.cut.clone());
            }
            Ok(cuts)
        }

        fn evaluate(&mut self, _aig: &Aig, node: NodeId, _cut: &Cut, _required: Level) -> oracle::Result<Option<Gain>> {
            if node == self.target {
                self.best = Some(self.gain);
            }
            Ok(self.best)
        }

        fn best_gain(&self) -> Option<Gain> {
            self.best
        }

        fn best_class(&self) -> Option<usize> {
            self.best.map(|_| 0)
        }

        fn mffc_size(&self) -> Option<usize> {
            None
        }

        fn build_best(&mut self, aig: &mut Aig, session: &mut CertifSession) -> oracle::Result<NodeId> {
            self.built += 1;
            (self.build)(aig, session)
        }

        fn forget_cuts(&mut self, _aig: &Aig, _node: NodeId) {}

        fn restart_cuts(&mut self, _aig: &Aig, _node: NodeId) -> oracle::Result<()> {
            Ok(())
        }

        fn cut_storage_len(&self) -> usize {
            0
        }

        fn free_cuts(&mut self) {}
    }

    fn inputs(aig: &Aig) -> (AigEdge, AigEdge, AigEdge) {
        let i = aig.get_inputs();
        (
            AigEdge::new(i[0], false),
            AigEdge::new(i[1], false),
            AigEdge::new(i[2], false),
        )
    }

    fn target(aig: &Aig) -> NodeId {
        aig.get_outputs()[0].get_node_id()
    }

    #[test_log::test]
    fn two_creates_then_replace_and_hint() {
        let mut aig = redundant();
        let before = aig.clone();
        let old_id = aig_id(&aig, aig.get_outputs()[0]);
        let oracle = ScriptedOracle::new(target(&aig), 1, |aig, session| {
            let (a, b, c) = inputs(aig);
            let bc = create(aig, session, b, c)?;
            let abc = create(aig, session, bc, a)?;
            Ok(abc.get_node_id())
        });
        let mut trail = CertificateTrail::new();
        let mut rewriter = Rewriter::new(RewriteParams::default(), oracle);
        rewriter.rewrite_certified(&mut aig, &mut trail).unwrap();
        assert_eq!(rewriter.oracle().built, 1);

        let bound = before.stable_id_bound().get();
        let (n1, n2) = (StableId::new(bound + 1), StableId::new(bound + 2));
        let (a, b, c) = inputs(&before);
        let (a, b, c) = (aig_id(&before, a), aig_id(&before, b), aig_id(&before, c));
        let certificate = trail.last().unwrap();
        assert_eq!(
            certificate.mutations(),
            &[
                Mutation::Create {
                    id: n1,
                    fanin0: (b, false),
                    fanin1: (c, false)
                },
                Mutation::Create {
                    id: n2,
                    fanin0: (n1, false),
                    fanin1: (a, false)
                },
                Mutation::Replace {
                    old_id,
                    new_id: n2,
                    complement: false
                },
            ]
        );
        assert_eq!(
            certificate.hints(),
            &[Hint {
                id: old_id,
                id_eq: n2,
                compl_eq: false
            }]
        );
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn below_min_gain_is_skipped() {
        let mut aig = redundant();
        let oracle = ScriptedOracle::new(target(&aig), 1, |_, _| panic!("must not be built"));
        let params = RewriteParams {
            min_gain_to_accept: 2,
            ..Default::default()
        };
        let mut trail = CertificateTrail::new();
        Rewriter::new(params, oracle)
            .rewrite_certified(&mut aig, &mut trail)
            .unwrap();
        assert!(trail.last().unwrap().is_empty());
        assert_eq!(aig.node_num(), 3);
    }

    #[test_log::test]
    fn overestimated_gain_is_fatal() {
        let mut aig = redundant();
        let oracle = ScriptedOracle::new(target(&aig), 3, |aig, session| {
            let (a, b, c) = inputs(aig);
            let bc = create(aig, session, b, c)?;
            Ok(create(aig, session, bc, a)?.get_node_id())
        });
        let mut trail = CertificateTrail::new();
        let result = Rewriter::new(RewriteParams::default(), oracle).rewrite_certified(&mut aig, &mut trail);
        assert!(matches!(
            result,
            Err(RewriteError::GainMismatch {
                estimated: 3,
                realized: 1,
                ..
            })
        ));
        assert!(trail.is_empty());
    }

    #[test_log::test]
    fn deep_replacement_is_fatal() {
        let mut aig = redundant();
        let oracle = ScriptedOracle::new(target(&aig), 0, |aig, session| {
            let (a, b, c) = inputs(aig);
            let bc = create(aig, session, b, c)?;
            let abc = create(aig, session, bc, a)?;
            Ok(create(aig, session, abc, c)?.get_node_id())
        });
        let params = RewriteParams {
            update_levels: true,
            accept_zero_gain_rewrites: true,
            ..Default::default()
        };
        let mut trail = CertificateTrail::new();
        let result = Rewriter::new(params, oracle).rewrite_certified(&mut aig, &mut trail);
        assert!(matches!(
            result,
            Err(RewriteError::LevelViolation {
                level: 3,
                required: 2,
                ..
            })
        ));
        assert!(trail.is_empty());
    }

    #[test_log::test]
    fn failed_network_check_keeps_the_certificate() {
        let mut aig = redundant();
        let before = aig.clone();
        let oracle = ScriptedOracle::new(target(&aig), 1, |aig, session| {
            let (a, b, c) = inputs(aig);
            let bc = create(aig, session, b, c)?;
            let abc = create(aig, session, bc, a)?;
            aig.force_phase(bc.get_node_id(), true)?;
            Ok(abc.get_node_id())
        });
        let mut trail = CertificateTrail::new();
        let result = Rewriter::new(RewriteParams::default(), oracle).rewrite_certified(&mut aig, &mut trail);
        assert!(matches!(
            result,
            Err(RewriteError::NetworkCheck(AigError::PhaseMismatch(_)))
        ));

        // The pass went through: its certificate is on the trail
        assert_eq!(trail.len(), 1);
        let certificate = trail.last().unwrap();
        assert_eq!(certificate.mutations().len(), 3);
        assert_eq!(certificate.hints().len(), 1);
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn id_overflow_is_fatal() {
        let mut aig = redundant();
        // Unused input carrying the last id below constant true
        aig.add_input_with_certif(StableId::new(StableId::CONST1.get() - 1));
        let mut trail = CertificateTrail::new();
        let result = rewrite_certified(&mut aig, RewriteParams::default(), &mut trail);
        assert!(matches!(
            result,
            Err(RewriteError::Oracle(OracleError::Certificate(
                CertificateError::IdOverflow
            )))
        ));
        assert!(trail.is_empty());
    }

    #[test_log::test]
    fn invalid_trivial_cut_is_fatal() {
        let mut aig = redundant();
        let mut oracle = ScriptedOracle::new(target(&aig), 1, |_, _| panic!("must not be built"));
        oracle.cut = Some(Cut::new(vec![], 0x1234));
        let mut trail = CertificateTrail::new();
        let result = Rewriter::new(RewriteParams::default(), oracle).rewrite_certified(&mut aig, &mut trail);
        assert!(matches!(
            result,
            Err(RewriteError::InvalidTrivialCut { truth: 0x1234, .. })
        ));
        assert!(trail.is_empty());
    }

    /// Counts its checks, expires at the `expire_at`-th one.
    struct Countdown {
        checks: Rc<Cell<usize>>,
        expire_at: usize,
    }

    impl Deadline for Countdown {
        fn expired(&mut self) -> bool {
            self.checks.set(self.checks.get() + 1);
            self.checks.get() >= self.expire_at
        }
    }

    /// 200 independent 2-input and gates: 601 objects, nothing to rewrite.
    fn wide() -> Aig {
        let mut aig = Aig::new();
        for _ in 0..200 {
            let a = aig.add_input();
            let b = aig.add_input();
            let ab = aig.and(a, b).unwrap();
            aig.add_output(ab).unwrap();
        }
        aig
    }

    #[test_log::test]
    fn deadline_is_checked_every_256_objects() {
        let mut aig = wide();
        let checks = Rc::new(Cell::new(0));
        let deadline = Countdown {
            checks: checks.clone(),
            expire_at: usize::MAX,
        };
        let stats = Rewriter::with_params(RewriteParams::default())
            .with_deadline(deadline)
            .rewrite(&mut aig)
            .unwrap();
        assert!(!stats.timed_out);
        assert_eq!(stats.nodes_tried, 200);
        // Objects 0, 256 and 512
        assert_eq!(checks.get(), 3);
    }

    #[test_log::test]
    fn deadline_stops_the_pass_cleanly() {
        let mut aig = redundant();
        let before = aig.clone();
        let mut trail = CertificateTrail::new();
        let stats = Rewriter::with_params(RewriteParams::default())
            .with_deadline(Instant::now())
            .rewrite_certified(&mut aig, &mut trail)
            .unwrap();
        assert!(stats.timed_out);
        assert_eq!(stats.nodes_tried, 0);
        assert_eq!(aig.node_num(), before.node_num());
        // The certificate of the interrupted pass is still pushed
        assert_eq!(trail.len(), 1);
        assert!(trail.last().unwrap().is_empty());

        let mut aig = wide();
        let checks = Rc::new(Cell::new(0));
        let stats = Rewriter::with_params(RewriteParams::default())
            .with_deadline(Countdown {
                checks,
                expire_at: 2,
            })
            .rewrite(&mut aig)
            .unwrap();
        assert!(stats.timed_out);
        assert!(stats.nodes_tried > 0 && stats.nodes_tried < 200);
    }

    #[test_log::test]
    fn deadline_leaves_the_tail_untouched() {
        // 150 independent redundant cones of 6 objects each, after the constant node
        let mut aig = Aig::new();
        let mut outs = Vec::new();
        for _ in 0..150 {
            let a = aig.add_input();
            let b = aig.add_input();
            let c = aig.add_input();
            let ab = aig.and(a, b).unwrap();
            let ac = aig.and(a, c).unwrap();
            let out = aig.and(ab, ac).unwrap();
            aig.add_output(out).unwrap();
            outs.push(aig_id(&aig, out));
        }
        let before = aig.clone();
        let mut trail = CertificateTrail::new();
        let stats = Rewriter::with_params(RewriteParams::default())
            .with_deadline(Countdown {
                checks: Rc::new(Cell::new(0)),
                expire_at: 2,
            })
            .rewrite_certified(&mut aig, &mut trail)
            .unwrap();
        assert!(stats.timed_out);

        // Objects 0 to 255 were visited: the outputs of the first 42 cones
        let replaced: Vec<StableId> = replaces(trail.last().unwrap().mutations())
            .into_iter()
            .map(|(old, _, _)| old)
            .collect();
        assert_eq!(replaced, outs[..42]);
        assert_eq!(stats.rewrites, 42);
        for (k, &id) in outs.iter().enumerate().skip(42) {
            assert_eq!(aig_id(&aig, aig.get_outputs()[k]), id);
        }
        assert_eq!(aig.node_num(), 42 * 2 + 108 * 3);
        assert!(replays(&before, &trail, &aig));
    }

    #[test_log::test]
    fn untracked_pass_matches_certified_pass() {
        let mut untracked = redundant();
        let mut certified = redundant();
        let mut trail = CertificateTrail::new();
        rewrite(&mut untracked, RewriteParams::default()).unwrap();
        rewrite_certified(&mut certified, RewriteParams::default(), &mut trail).unwrap();
        assert_eq!(untracked.node_num(), certified.node_num());
        assert!(equivalent(&untracked, &certified, 1, 0).unwrap());
    }

    /// Random AIG: each gate reads two earlier signals, the last gates are outputs.
    fn random_aig(n_inputs: usize, gates: &[(usize, bool, usize, bool)], n_outputs: usize) -> Aig {
        let mut aig = Aig::new();
        let mut signals: Vec<AigEdge> = (0..n_inputs).map(|_| aig.add_input()).collect();
        for &(i, ci, j, cj) in gates {
            let x = signals[i % signals.len()].not_cond(ci);
            let y = signals[j % signals.len()].not_cond(cj);
            let s = aig.and(x, y).unwrap();
            signals.push(s);
        }
        for s in signals.iter().rev().take(n_outputs) {
            aig.add_output(*s).unwrap();
        }
        aig
    }

    fn gates_strategy() -> impl Strategy<Value = Vec<(usize, bool, usize, bool)>> {
        prop::collection::vec((any::<usize>(), any::<bool>(), any::<usize>(), any::<bool>()), 1..40)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn certified_passes_replay(n_inputs in 2usize..7, gates in gates_strategy(), n_outputs in 1usize..4, passes in 1usize..3) {
            let mut aig = random_aig(n_inputs, &gates, n_outputs);
            let before = aig.clone();
            let mut trail = CertificateTrail::new();
            for _ in 0..passes {
                rewrite_certified(&mut aig, RewriteParams::default(), &mut trail).unwrap();
            }
            prop_assert_eq!(trail.len(), passes);
            prop_assert!(aig.node_num() <= before.node_num());
            prop_assert!(equivalent(&aig, &before, 4, 1).unwrap());
            prop_assert!(replays(&before, &trail, &aig));

            // The trail survives serialization
            let bytes = trail.to_bytes().unwrap();
            prop_assert_eq!(CertificateTrail::from_bytes(&bytes).unwrap(), trail);
        }

        #[test]
        fn level_aware_pass_keeps_depth(n_inputs in 2usize..7, gates in gates_strategy(), n_outputs in 1usize..4) {
            let mut aig = random_aig(n_inputs, &gates, n_outputs);
            let before = aig.clone();
            let params = RewriteParams {
                update_levels: true,
                ..Default::default()
            };
            rewrite(&mut aig, params).unwrap();
            prop_assert!(aig.level() <= before.level());
            prop_assert!(equivalent(&aig, &before, 4, 1).unwrap());
        }

        #[test]
        fn zero_gain_and_power_passes_are_sound(n_inputs in 2usize..7, gates in gates_strategy(), n_outputs in 1usize..4) {
            let mut aig = random_aig(n_inputs, &gates, n_outputs);
            let before = aig.clone();
            let params = RewriteParams {
                accept_zero_gain_rewrites: true,
                power_aware: true,
                use_fanout_tracking: false,
                ..Default::default()
            };
            let mut trail = CertificateTrail::new();
            rewrite_certified(&mut aig, params, &mut trail).unwrap();
            prop_assert!(aig.node_num() <= before.node_num());
            prop_assert!(replays(&before, &trail, &aig));
        }
    }
}
