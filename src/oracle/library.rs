//! A fixed library of small AIG structures, indexed by the 4-input functions they realize.

use std::collections::HashMap;

use super::cut::{MAX_LEAVES, VAR_MASKS};

/// A small AIG over `n_inputs` inputs.
///
/// Literals are numbered the following way: `0` is constant false, `1..=n_inputs` are the
/// inputs, and the `k`-th gate is `n_inputs + 1 + k`. A negative literal is inverted.
/// The last gate is the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Structure {
    n_inputs: usize,
    gates: &'static [(i8, i8)],
}

const STRUCTURES: &[Structure] = &[
    Structure {
        n_inputs: 2,
        gates: &[(1, 2)],
    },
    Structure {
        n_inputs: 2,
        gates: &[(1, -2), (-1, 2), (-3, -4)],
    },
    Structure {
        n_inputs: 3,
        gates: &[(1, 2), (3, 4)],
    },
    Structure {
        n_inputs: 3,
        gates: &[(1, 2), (3, -4)],
    },
    Structure {
        n_inputs: 3,
        gates: &[(1, 2), (-1, 3), (-4, -5)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(-1, -2), (1, 2), (6, 3), (-5, -7), (-8, 4)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, -2), (3, 2), (-6, 4), (-5, 7)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (-5, 3), (-6, 4)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (-5, 3), (4, 2), (-6, -7)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (-5, 3), (6, 4)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (3, 4), (-5, -6)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (3, 4), (-5, 6), (-1, -2), (-7, -8)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (3, 4), (-5, 6)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (3, 4), (5, 6)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (5, 3), (-6, 4)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (5, 3), (4, -2), (-6, -7)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (5, 3), (6, 4)],
    },
    Structure {
        n_inputs: 4,
        gates: &[(1, 2), (-5, 3), (5, 4), (-6, -7)],
    },
];

impl Structure {
    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn gates(&self) -> &'static [(i8, i8)] {
        self.gates
    }

    /// Number of and gates.
    pub fn size(&self) -> usize {
        self.gates.len()
    }

    /// Function realized under `placement`, over the 4 cut variables.
    pub fn function(&self, placement: &Placement) -> u16 {
        let mut states = Vec::with_capacity(1 + self.n_inputs + self.gates.len());
        states.push(0u16);
        for i in 0..self.n_inputs {
            let var = VAR_MASKS[placement.positions[i] as usize];
            states.push(if placement.input_inverted(i) { !var } else { var });
        }
        let lit = |states: &[u16], lit: i8| {
            let value = states[lit.unsigned_abs() as usize];
            if lit < 0 { !value } else { value }
        };
        for &(a, b) in self.gates {
            let value = lit(&states, a) & lit(&states, b);
            states.push(value);
        }
        let out = states.last().copied().unwrap_or(0);
        if placement.output_inverted { !out } else { out }
    }
}

/// How a structure is plugged on a cut: input `i` of the structure is driven by cut leaf
/// `positions[i]` (inverted if bit `i` of `input_inversions` is set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub structure: usize,
    pub positions: [u8; MAX_LEAVES],
    pub input_inversions: u8,
    pub output_inverted: bool,
}

impl Placement {
    pub fn input_inverted(&self, input: usize) -> bool {
        self.input_inversions >> input & 1 == 1
    }

    /// Whether every leaf the placement reads exists on a cut of `n_leaves` leaves.
    pub fn fits(&self, n_inputs: usize, n_leaves: usize) -> bool {
        self.positions[..n_inputs]
            .iter()
            .all(|&p| (p as usize) < n_leaves)
    }
}

/// Injective maps from `n` structure inputs to the cut positions.
fn injections(n: usize) -> Vec<[u8; MAX_LEAVES]> {
    let mut result = Vec::new();
    let total = MAX_LEAVES.pow(n as u32);
    for code in 0..total {
        let mut positions = [0u8; MAX_LEAVES];
        let mut rest = code;
        for position in positions.iter_mut().take(n) {
            *position = (rest % MAX_LEAVES) as u8;
            rest /= MAX_LEAVES;
        }
        let used = &positions[..n];
        if (0..n).all(|i| !used[i + 1..].contains(&used[i])) {
            result.push(positions);
        }
    }
    result
}

/// The structures with at most `max_size` gates, and every placement of them by function.
#[derive(Debug, Clone)]
pub struct Library {
    structures: Vec<Structure>,
    index: HashMap<u16, Vec<Placement>>,
}

impl Library {
    pub fn new(max_size: usize) -> Self {
        let structures: Vec<Structure> = STRUCTURES.to_vec();
        let mut index: HashMap<u16, Vec<Placement>> = HashMap::new();
        for (k, structure) in structures.iter().enumerate() {
            if structure.size() > max_size {
                continue;
            }
            for positions in injections(structure.n_inputs) {
                for input_inversions in 0..(1u8 << structure.n_inputs) {
                    for output_inverted in [false, true] {
                        let placement = Placement {
                            structure: k,
                            positions,
                            input_inversions,
                            output_inverted,
                        };
                        index
                            .entry(structure.function(&placement))
                            .or_default()
                            .push(placement);
                    }
                }
            }
        }
        Library { structures, index }
    }

    /// Placements realizing `truth`.
    pub fn candidates(&self, truth: u16) -> &[Placement] {
        self.index.get(&truth).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn structure(&self, k: usize) -> Option<&Structure> {
        self.structures.get(k)
    }

    /// Number of structures (the classes gains are accounted by).
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Number of distinct functions indexed.
    pub fn function_count(&self) -> usize {
        self.index.len()
    }
}
