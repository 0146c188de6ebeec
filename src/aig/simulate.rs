//! Bit-parallel simulation of an [`Aig`].
//!
//! Each signal is simulated on `64 * words` patterns at once. Patterns are either exhaustive
//! (small number of inputs) or drawn from a deterministic xorshift generator, so that every run
//! of the same program sees the same patterns.

use std::collections::HashMap;

use super::{Aig, AigEdge, NodeId, NodeKind, Result};

/// Values of one signal over all simulated patterns.
pub type SimWord = Vec<u64>;

/// Deterministic xorshift64* generator.
#[derive(Debug, Clone)]
pub struct XorShift64(u64);

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // The all-zero state is a fixed point.
        XorShift64(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }
}

/// Random patterns: one [`SimWord`] of `words` words per input.
pub fn random_patterns(n_inputs: usize, words: usize, seed: u64) -> Vec<SimWord> {
    let mut rng = XorShift64::new(seed);
    (0..n_inputs)
        .map(|_| (0..words).map(|_| rng.next_u64()).collect())
        .collect()
}

/// Every assignment of `n_inputs` inputs (padded to at least one word).
pub fn exhaustive_patterns(n_inputs: usize) -> Vec<SimWord> {
    const VAR_MASKS: [u64; 6] = [
        0xAAAA_AAAA_AAAA_AAAA,
        0xCCCC_CCCC_CCCC_CCCC,
        0xF0F0_F0F0_F0F0_F0F0,
        0xFF00_FF00_FF00_FF00,
        0xFFFF_0000_FFFF_0000,
        0xFFFF_FFFF_0000_0000,
    ];
    let words = 1usize << n_inputs.saturating_sub(6);
    (0..n_inputs)
        .map(|var| {
            (0..words)
                .map(|w| {
                    if var < 6 {
                        VAR_MASKS[var]
                    } else if (w >> (var - 6)) & 1 == 1 {
                        u64::MAX
                    } else {
                        0
                    }
                })
                .collect()
        })
        .collect()
}

fn edge_value(values: &HashMap<NodeId, SimWord>, edge: AigEdge, w: usize) -> u64 {
    let v = values.get(&edge.node).map(|word| word[w]).unwrap_or(0);
    if edge.complement { !v } else { v }
}

impl Aig {
    /// Simulates every live node. `patterns[i]` drives the `i`-th input.
    pub fn simulate_nodes(&self, patterns: &[SimWord]) -> Result<HashMap<NodeId, SimWord>> {
        let words = patterns.first().map(|p| p.len()).unwrap_or(1);
        let mut values: HashMap<NodeId, SimWord> = HashMap::new();
        for (k, &input) in self.get_inputs().iter().enumerate() {
            let word = patterns.get(k).cloned().unwrap_or_else(|| vec![0; words]);
            values.insert(input, word);
        }
        for id in self.get_full_topological_sort()? {
            let node = self.node(id)?;
            match node.get_kind() {
                NodeKind::False => {
                    values.insert(id, vec![0; words]);
                }
                NodeKind::Input => {}
                NodeKind::And { fanin0, fanin1 } => {
                    let word = (0..words)
                        .map(|w| edge_value(&values, fanin0, w) & edge_value(&values, fanin1, w))
                        .collect();
                    values.insert(id, word);
                }
            }
        }
        Ok(values)
    }

    /// Simulates the outputs. `patterns[i]` drives the `i`-th input.
    pub fn simulate(&self, patterns: &[SimWord]) -> Result<Vec<SimWord>> {
        let values = self.simulate_nodes(patterns)?;
        let words = patterns.first().map(|p| p.len()).unwrap_or(1);
        Ok(self
            .get_outputs()
            .iter()
            .map(|&o| (0..words).map(|w| edge_value(&values, o, w)).collect())
            .collect())
    }

    /// Probability for every live node to be 1, estimated on random patterns.
    pub fn one_probabilities(&self, words: usize, seed: u64) -> Result<HashMap<NodeId, f32>> {
        let patterns = random_patterns(self.get_inputs().len(), words.max(1), seed);
        let values = self.simulate_nodes(&patterns)?;
        let total = (64 * words.max(1)) as f32;
        Ok(values
            .into_iter()
            .map(|(id, word)| {
                let ones: u32 = word.iter().map(|w| w.count_ones()).sum();
                (id, ones as f32 / total)
            })
            .collect())
    }
}

/// Switching activity of a signal that is 1 with probability `p`.
pub fn switching(p: f32) -> f32 {
    2.0 * p * (1.0 - p)
}

/// Checks that two AIGs with the same interface compute the same functions.
///
/// Exhaustive up to 12 inputs, random (`words` words) beyond.
pub fn equivalent(a: &Aig, b: &Aig, words: usize, seed: u64) -> Result<bool> {
    let n_inputs = a.get_inputs().len();
    if n_inputs != b.get_inputs().len() || a.get_outputs().len() != b.get_outputs().len() {
        return Ok(false);
    }
    let patterns = if n_inputs <= 12 {
        exhaustive_patterns(n_inputs)
    } else {
        random_patterns(n_inputs, words.max(1), seed)
    };
    Ok(a.simulate(&patterns)? == b.simulate(&patterns)?)
}
