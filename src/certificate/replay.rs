//! Verifier-side replay of certificates.
//!
//! A [`Replay`] is a snapshot of an AIG where every node is named by its [`StableId`].
//! Applying a certificate interprets `Create` as "define a new and gate under this id" and
//! `Replace` as "alias this id to that literal". The replayed network can then be compared,
//! by simulation, with the graph the pass actually produced.

use std::collections::HashMap;

use log::debug;

use super::{Certificate, CertificateError, CertificateTrail, Mutation, Result, StableId, StableLit};
use crate::{
    Aig, NodeKind,
    aig::simulate::{SimWord, exhaustive_patterns, random_patterns},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Definition {
    Const0,
    /// Index of the input, in the order of [`Aig::get_inputs`].
    Input(usize),
    And(StableLit, StableLit),
    Alias(StableLit),
}

/// An AIG named by stable ids, on which certificates can be replayed.
#[derive(Debug, Clone)]
pub struct Replay {
    defs: HashMap<StableId, Definition>,
    outputs: Vec<StableLit>,
    n_inputs: usize,
}

impl Replay {
    /// Snapshots every live node of `aig` (dangling ones included).
    pub fn from_aig(aig: &Aig) -> Result<Self> {
        let input_index: HashMap<_, _> = aig
            .get_inputs()
            .iter()
            .enumerate()
            .map(|(k, &id)| (id, k))
            .collect();
        let mut defs = HashMap::from([
            (StableId::CONST0, Definition::Const0),
            (StableId::CONST1, Definition::Alias((StableId::CONST0, true))),
        ]);

        let mut cursor = None;
        while let Some((birth, id)) = aig.next_in_order(cursor) {
            cursor = Some(birth);
            let node = aig.node(id)?;
            let def = match node.get_kind() {
                NodeKind::False => continue,
                NodeKind::Input => Definition::Input(input_index[&id]),
                NodeKind::And { fanin0, fanin1 } => {
                    Definition::And(aig.edge_certif(fanin0)?, aig.edge_certif(fanin1)?)
                }
            };
            defs.insert(node.get_certif_id(), def);
        }

        let outputs = aig
            .get_outputs()
            .iter()
            .map(|&o| aig.edge_certif(o))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Replay {
            defs,
            outputs,
            n_inputs: aig.get_inputs().len(),
        })
    }

    pub fn is_defined(&self, id: StableId) -> bool {
        self.defs.contains_key(&id)
    }

    fn check_defined(&self, id: StableId) -> Result<()> {
        if self.is_defined(id) {
            Ok(())
        } else {
            Err(CertificateError::UnknownId(id))
        }
    }

    /// Applies one certificate, checking causal order and hint pairing.
    pub fn apply(&mut self, certificate: &Certificate) -> Result<()> {
        let mut replaces = Vec::new();
        for mutation in certificate.mutations() {
            match *mutation {
                Mutation::Create { id, fanin0, fanin1 } => {
                    self.check_defined(fanin0.0)?;
                    self.check_defined(fanin1.0)?;
                    if self.is_defined(id) {
                        return Err(CertificateError::DuplicateId(id));
                    }
                    self.defs.insert(id, Definition::And(fanin0, fanin1));
                }
                Mutation::Replace {
                    old_id,
                    new_id,
                    complement,
                } => {
                    self.check_defined(old_id)?;
                    self.check_defined(new_id)?;
                    if old_id == new_id || old_id.is_const() {
                        return Err(CertificateError::Cycle(old_id));
                    }
                    self.defs
                        .insert(old_id, Definition::Alias((new_id, complement)));
                    replaces.push((old_id, new_id, complement, false));
                }
            }
        }
        // Each hint pairs with its own replacement
        for (k, hint) in certificate.hints().iter().enumerate() {
            let paired = replaces.iter_mut().find(|(old, new, compl, used)| {
                !*used && *old == hint.id && *new == hint.id_eq && *compl == hint.compl_eq
            });
            match paired {
                Some(entry) => entry.3 = true,
                None => return Err(CertificateError::HintMismatch(k)),
            }
        }
        debug!(
            "replayed {} mutations and {} hints",
            certificate.mutations().len(),
            certificate.hints().len()
        );
        Ok(())
    }

    pub fn apply_trail(&mut self, trail: &CertificateTrail) -> Result<()> {
        for certificate in trail {
            self.apply(certificate)?;
        }
        Ok(())
    }

    /// Value of `id` over the patterns, memoized in `values`. Errors on cycles.
    fn evaluate(
        &self,
        id: StableId,
        patterns: &[SimWord],
        words: usize,
        values: &mut HashMap<StableId, SimWord>,
    ) -> Result<()> {
        let mut in_progress = std::collections::HashSet::new();
        let mut stack = vec![(id, false)];
        while let Some((id, expanded)) = stack.pop() {
            if values.contains_key(&id) {
                continue;
            }
            let def = *self.defs.get(&id).ok_or(CertificateError::UnknownId(id))?;
            let deps: Vec<StableLit> = match def {
                Definition::Const0 | Definition::Input(_) => vec![],
                Definition::And(f0, f1) => vec![f0, f1],
                Definition::Alias(lit) => vec![lit],
            };
            if !expanded {
                if !in_progress.insert(id) {
                    return Err(CertificateError::Cycle(id));
                }
                stack.push((id, true));
                for (dep, _) in deps {
                    if !values.contains_key(&dep) {
                        if in_progress.contains(&dep) {
                            return Err(CertificateError::Cycle(dep));
                        }
                        stack.push((dep, false));
                    }
                }
                continue;
            }
            let lit = |(dep, compl): StableLit, w: usize| {
                let v = values[&dep][w];
                if compl { !v } else { v }
            };
            let word: SimWord = match def {
                Definition::Const0 => vec![0; words],
                Definition::Input(k) => patterns
                    .get(k)
                    .cloned()
                    .unwrap_or_else(|| vec![0; words]),
                Definition::And(f0, f1) => (0..words).map(|w| lit(f0, w) & lit(f1, w)).collect(),
                Definition::Alias(l) => (0..words).map(|w| lit(l, w)).collect(),
            };
            in_progress.remove(&id);
            values.insert(id, word);
        }
        Ok(())
    }

    /// Simulates the outputs of the replayed network. `patterns[i]` drives the `i`-th input.
    pub fn simulate(&self, patterns: &[SimWord]) -> Result<Vec<SimWord>> {
        let words = patterns.first().map(|p| p.len()).unwrap_or(1);
        let mut values = HashMap::new();
        let mut outputs: Vec<SimWord> = Vec::with_capacity(self.outputs.len());
        for &(id, compl) in &self.outputs {
            self.evaluate(id, patterns, words, &mut values)?;
            outputs.push(values[&id].iter().map(|&v| if compl { !v } else { v }).collect());
        }
        Ok(outputs)
    }

    /// Checks by simulation that the replayed network computes the same outputs as `aig`.
    /// Exhaustive up to 12 inputs, `words` random words beyond.
    pub fn equivalent_to(&self, aig: &Aig, words: usize, seed: u64) -> Result<bool> {
        if aig.get_inputs().len() != self.n_inputs || aig.get_outputs().len() != self.outputs.len() {
            return Ok(false);
        }
        let patterns = if self.n_inputs <= 12 {
            exhaustive_patterns(self.n_inputs)
        } else {
            random_patterns(self.n_inputs, words.max(1), seed)
        };
        Ok(self.simulate(&patterns)? == aig.simulate(&patterns)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::certificate::Hint;

    fn sample() -> (Aig, [StableId; 4]) {
        // out = (a & b) & a
        let mut aig = Aig::new();
        let a = aig.add_input();
        let b = aig.add_input();
        let ab = aig.and(a, b).unwrap();
        let out = aig.and(ab, a).unwrap();
        aig.add_output(out).unwrap();
        let ids = [a, b, ab, out].map(|e| aig.edge_certif(e).unwrap().0);
        (aig, ids)
    }

    #[test]
    fn snapshot_is_equivalent() {
        let (aig, _) = sample();
        let replay = Replay::from_aig(&aig).unwrap();
        assert!(replay.equivalent_to(&aig, 1, 0).unwrap());
    }

    #[test]
    fn replace_then_compare() {
        let (mut aig, [_, _, ab, out]) = sample();
        let mut replay = Replay::from_aig(&aig).unwrap();
        let certificate = Certificate::new(
            vec![Mutation::Replace {
                old_id: out,
                new_id: ab,
                complement: false,
            }],
            vec![Hint {
                id: out,
                id_eq: ab,
                compl_eq: false,
            }],
        );
        replay.apply(&certificate).unwrap();

        let out_node = aig.get_outputs()[0].get_node_id();
        // Fanins are sorted by slot, a & b comes after a
        let ab_edge = aig.node(out_node).unwrap().get_fanins()[1];
        aig.replace(out_node, ab_edge).unwrap();
        assert!(replay.equivalent_to(&aig, 1, 0).unwrap());
    }

    #[test]
    fn wrong_replacement_is_caught() {
        let (aig, [a, _, _, out]) = sample();
        let mut replay = Replay::from_aig(&aig).unwrap();
        replay
            .apply(&Certificate::new(
                vec![Mutation::Replace {
                    old_id: out,
                    new_id: a,
                    complement: false,
                }],
                vec![],
            ))
            .unwrap();
        assert!(!replay.equivalent_to(&aig, 1, 0).unwrap());
    }

    #[test]
    fn causal_order_is_checked() {
        let (aig, [a, b, _, out]) = sample();
        let fresh = aig.stable_id_bound();
        let fresh = StableId::new(fresh.get() + 1);

        // Replace towards an id that is created later
        let mut replay = Replay::from_aig(&aig).unwrap();
        let late = Certificate::new(
            vec![
                Mutation::Replace {
                    old_id: out,
                    new_id: fresh,
                    complement: false,
                },
                Mutation::Create {
                    id: fresh,
                    fanin0: (a, false),
                    fanin1: (b, false),
                },
            ],
            vec![],
        );
        assert!(matches!(
            replay.apply(&late),
            Err(CertificateError::UnknownId(_))
        ));

        // Create redefining an existing id
        let mut replay = Replay::from_aig(&aig).unwrap();
        let twice = Certificate::new(
            vec![Mutation::Create {
                id: a,
                fanin0: (a, false),
                fanin1: (b, false),
            }],
            vec![],
        );
        assert!(matches!(
            replay.apply(&twice),
            Err(CertificateError::DuplicateId(_))
        ));
    }

    #[test]
    fn hints_must_pair() {
        let (aig, [_, _, ab, out]) = sample();
        let mut replay = Replay::from_aig(&aig).unwrap();
        let certificate = Certificate::new(
            vec![Mutation::Replace {
                old_id: out,
                new_id: ab,
                complement: false,
            }],
            vec![Hint {
                id: out,
                id_eq: ab,
                compl_eq: true,
            }],
        );
        assert!(matches!(
            replay.apply(&certificate),
            Err(CertificateError::HintMismatch(0))
        ));
    }

    #[test]
    fn cycles_are_detected() {
        let (aig, [_, _, ab, out]) = sample();
        let mut replay = Replay::from_aig(&aig).unwrap();
        // ab := out while out still reads ab
        replay
            .apply(&Certificate::new(
                vec![Mutation::Replace {
                    old_id: ab,
                    new_id: out,
                    complement: false,
                }],
                vec![],
            ))
            .unwrap();
        assert!(matches!(
            replay.simulate(&exhaustive_patterns(2)),
            Err(CertificateError::Cycle(_))
        ));
    }
}
